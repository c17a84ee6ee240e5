use sqlx::{self, postgres::PgRow, FromRow, PgPool};

use crate::database::manager::DatabaseError;

/// Soft-delete aware access to a table keyed by a BIGSERIAL `id`.
pub struct Repository<T> {
    table: &'static str,
    model: &'static str,
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Repository<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    /// `table` is a trusted identifier; `model` names the row in "not found" errors.
    pub fn new(table: &'static str, model: &'static str, pool: PgPool) -> Self {
        Self {
            table,
            model,
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    fn not_found(&self) -> DatabaseError {
        DatabaseError::NotFound(self.model.to_string())
    }

    /// Live row by id
    pub async fn select_404(&self, id: i64) -> Result<T, DatabaseError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1 AND deleted_at IS NULL", self.table);
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| self.not_found())
    }

    /// Row by id including soft-deleted ones
    pub async fn select_with_trashed_404(&self, id: i64) -> Result<T, DatabaseError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", self.table);
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| self.not_found())
    }

    pub async fn soft_delete(&self, id: i64) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE {} SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            self.table
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found());
        }
        Ok(())
    }

    /// Clear `deleted_at`; succeeds for live rows too.
    pub async fn restore(&self, id: i64) -> Result<T, DatabaseError> {
        let sql = format!(
            "UPDATE {} SET deleted_at = NULL, updated_at = NOW() WHERE id = $1 RETURNING *",
            self.table
        );
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| self.not_found())
    }

    pub async fn force_delete(&self, id: i64) -> Result<(), DatabaseError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found());
        }
        Ok(())
    }

    /// Soft delete every live row in `ids`; returns how many changed.
    pub async fn bulk_soft_delete(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {} SET deleted_at = NOW(), updated_at = NOW() WHERE id = ANY($1) AND deleted_at IS NULL",
            self.table
        );
        let result = sqlx::query(&sql).bind(ids).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Restore every trashed row in `ids` and return them.
    pub async fn bulk_restore(&self, ids: &[i64]) -> Result<Vec<T>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "UPDATE {} SET deleted_at = NULL, updated_at = NOW() WHERE id = ANY($1) AND deleted_at IS NOT NULL RETURNING *",
            self.table
        );
        let rows = sqlx::query_as::<_, T>(&sql).bind(ids).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Count of live rows
    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE deleted_at IS NULL", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

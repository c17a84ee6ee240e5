use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::database::models::Upload;
use crate::database::{DatabaseError, Listing, Repository};
use crate::services::user_service::ImportOutcome;

pub const UPLOAD_LISTING: Listing = Listing {
    table: "uploads",
    search_columns: &[
        "uploads.filename",
        "uploads.original_filename",
        "(SELECT u.name FROM users u WHERE u.id = uploads.user_id)",
    ],
    sortable: &[
        "id",
        "filename",
        "original_filename",
        "mime_type",
        "size",
        "provider",
        "created_at",
        "updated_at",
    ],
    soft_deletes: true,
};

pub const UPLOAD_EXPORT_COLUMNS: &[&str] = &[
    "id",
    "filename",
    "original_filename",
    "mime_type",
    "size",
    "path",
    "disk",
    "provider",
    "url",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub disk: String,
    pub provider: String,
    pub meta: Option<Value>,
}

pub struct UploadService {
    pool: PgPool,
}

impl UploadService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn repository(&self) -> Repository<Upload> {
        Repository::new("uploads", "Upload", self.pool.clone())
    }

    pub async fn find(&self, id: i64) -> Result<Upload, DatabaseError> {
        self.repository().select_404(id).await
    }

    pub async fn create(&self, upload: NewUpload) -> Result<Upload, DatabaseError> {
        let row = sqlx::query_as::<_, Upload>(
            r#"
            INSERT INTO uploads (user_id, filename, original_filename, mime_type, size, path, disk, provider, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(upload.user_id)
        .bind(&upload.filename)
        .bind(&upload.original_filename)
        .bind(&upload.mime_type)
        .bind(upload.size)
        .bind(&upload.path)
        .bind(&upload.disk)
        .bind(&upload.provider)
        .bind(&upload.meta)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(upload_id = row.id, provider = %row.provider, "upload stored");
        Ok(row)
    }

    /// Keys in `meta_changes` replace the stored `meta` keys
    pub async fn update(
        &self,
        id: i64,
        original_filename: Option<String>,
        meta_changes: serde_json::Map<String, Value>,
    ) -> Result<Upload, DatabaseError> {
        sqlx::query_as::<_, Upload>(
            r#"
            UPDATE uploads
            SET original_filename = COALESCE($2, original_filename),
                meta = COALESCE(meta, '{}'::jsonb) || $3,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(original_filename)
        .bind(Value::Object(meta_changes))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Upload".to_string()))
    }

    pub async fn export_rows(&self, range: Option<(NaiveDate, NaiveDate)>) -> Result<Vec<Upload>, DatabaseError> {
        let rows = sqlx::query_as::<_, Upload>(
            r#"
            SELECT * FROM uploads
            WHERE deleted_at IS NULL
              AND ($1::DATE IS NULL OR created_at::DATE >= $1)
              AND ($2::DATE IS NULL OR created_at::DATE <= $2)
            ORDER BY id
            "#,
        )
        .bind(range.map(|r| r.0))
        .bind(range.map(|r| r.1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_by_path(&self, user_id: i64, path: &str) -> Result<Option<Upload>, DatabaseError> {
        let row = sqlx::query_as::<_, Upload>(
            "SELECT * FROM uploads WHERE user_id = $1 AND path = $2 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Upsert rows keyed by `path` for `user_id`. Rows without a path are skipped.
    pub async fn import(
        &self,
        user_id: i64,
        rows: Vec<BTreeMap<String, String>>,
        update_existing: bool,
    ) -> Result<ImportOutcome, DatabaseError> {
        let mut outcome = ImportOutcome::default();
        for row in rows {
            let field = |k: &str| row.get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            let Some(path) = field("path") else {
                outcome.skipped += 1;
                continue;
            };

            let filename = field("filename").unwrap_or_else(|| {
                path.rsplit('/').next().unwrap_or(path.as_str()).to_string()
            });
            let original_filename = field("original_filename").unwrap_or_else(|| filename.clone());
            let mime_type = field("mime_type").unwrap_or_else(|| {
                mime_guess::from_path(&filename).first_or_octet_stream().to_string()
            });
            let size = field("size").and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
            let disk = field("disk").unwrap_or_else(|| "local".to_string());
            let provider = field("provider").unwrap_or_else(|| "local".to_string());

            match self.find_by_path(user_id, &path).await? {
                Some(existing) if update_existing => {
                    sqlx::query(
                        r#"
                        UPDATE uploads
                        SET filename = $2, original_filename = $3, mime_type = $4, size = $5,
                            disk = $6, provider = $7, updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(existing.id)
                    .bind(&filename)
                    .bind(&original_filename)
                    .bind(&mime_type)
                    .bind(size)
                    .bind(&disk)
                    .bind(&provider)
                    .execute(&self.pool)
                    .await?;
                    outcome.updated += 1;
                }
                Some(_) => outcome.skipped += 1,
                None => {
                    self.create(NewUpload {
                        user_id,
                        filename,
                        original_filename,
                        mime_type,
                        size,
                        path,
                        disk,
                        provider,
                        meta: None,
                    })
                    .await?;
                    outcome.created += 1;
                }
            }
        }
        tracing::info!(user_id, ?outcome, "upload import finished");
        Ok(outcome)
    }
}

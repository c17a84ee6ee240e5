//! Shared index behaviour: search, soft-delete visibility, ordering, date
//! range and pagination for every list endpoint.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};

use crate::api::validation::Validator;
use crate::database::manager::DatabaseError;
use crate::error::ApiError;

/// Static description of a listable table. Column names are trusted
/// identifiers or SQL expressions, never user input.
#[derive(Debug, Clone, Copy)]
pub struct Listing {
    pub table: &'static str,
    pub search_columns: &'static [&'static str],
    pub sortable: &'static [&'static str],
    pub soft_deletes: bool,
}

/// Raw index query string. Everything arrives as text so that bad values
/// produce field errors rather than extractor rejections.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IndexQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub search: Option<String>,
    pub with_trashed: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Validated listing parameters
#[derive(Debug, Clone)]
pub struct ListParams {
    pub page: i64,
    pub per_page: i64,
    pub search: Option<String>,
    pub with_trashed: bool,
    pub order_by: Option<&'static str>,
    pub direction: Direction,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl ListParams {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl IndexQuery {
    pub fn validate(&self, listing: &Listing, default_per_page: i64) -> Result<ListParams, ApiError> {
        let mut v = Validator::new();

        let page = v.integer_between("page", self.page.as_deref(), 1, i64::MAX).unwrap_or(1);
        let per_page = v
            .integer_between("per_page", self.per_page.as_deref(), 1, 100)
            .unwrap_or(default_per_page);

        let search = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        v.max_len("search", search, 255);

        let with_trashed = v.boolean("with_trashed", self.with_trashed.as_deref()).unwrap_or(false);

        let order_by = match self.order_by.as_deref().filter(|s| !s.is_empty()) {
            Some(column) => {
                let found = listing.sortable.iter().copied().find(|c| *c == column);
                v.check(found.is_some(), "order_by", "The selected order by is invalid.");
                found
            }
            None => None,
        };

        v.one_of("order_direction", self.order_direction.as_deref(), &["asc", "desc"]);
        let direction = match self.order_direction.as_deref() {
            Some("desc") => Direction::Desc,
            _ => Direction::Asc,
        };

        let start = v.date("start_date", self.start_date.as_deref());
        let end = v.date("end_date", self.end_date.as_deref());
        if let (Some(s), Some(e)) = (start, end) {
            v.check(
                e >= s,
                "end_date",
                "The end date field must be a date after or equal to start date.",
            );
        }

        v.finish()?;

        Ok(ListParams {
            page,
            per_page,
            search: search.map(str::to_string),
            with_trashed,
            order_by,
            direction,
            date_range: start.zip(end),
        })
    }
}

/// `{ current_page, last_page, per_page, total }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub current_page: i64,
    pub last_page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageMeta {
    pub fn new(current_page: i64, per_page: i64, total: i64) -> Self {
        let last_page = if per_page > 0 { ((total + per_page - 1) / per_page).max(1) } else { 1 };
        Self {
            current_page,
            last_page,
            per_page,
            total,
        }
    }
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Escape `%`, `_` and `\` for a LIKE pattern.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Listing {
    /// Append the WHERE clause. `scope` adds `column = value` equality filters.
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>, params: &ListParams, scope: &[(&'static str, i64)]) {
        qb.push(" WHERE TRUE");
        for (column, value) in scope {
            qb.push(" AND ").push(self.table).push(".").push(*column).push(" = ");
            qb.push_bind(*value);
        }
        if self.soft_deletes && !params.with_trashed {
            qb.push(" AND ").push(self.table).push(".deleted_at IS NULL");
        }
        if let Some(term) = &params.search {
            if !self.search_columns.is_empty() {
                let pattern = like_pattern(term);
                qb.push(" AND (");
                for (i, column) in self.search_columns.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    qb.push(*column).push(" ILIKE ");
                    qb.push_bind(pattern.clone());
                }
                qb.push(")");
            }
        }
        if let Some((start, end)) = params.date_range {
            // Inclusive calendar days
            qb.push(" AND ").push(self.table).push(".created_at >= ");
            qb.push_bind(start_of_day(start));
            qb.push(" AND ").push(self.table).push(".created_at < ");
            qb.push_bind(start_of_day(end.succ_opt().unwrap_or(end)));
        }
    }

    fn select_builder(&self, params: &ListParams, scope: &[(&'static str, i64)]) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {0}.* FROM {0}", self.table));
        self.push_where(&mut qb, params, scope);
        qb.push(" ORDER BY ").push(self.table).push(".");
        qb.push(params.order_by.unwrap_or("id")).push(" ").push(params.direction.sql());
        if params.order_by.is_some() {
            qb.push(", ").push(self.table).push(".id ASC");
        }
        qb.push(" LIMIT ").push_bind(params.per_page);
        qb.push(" OFFSET ").push_bind(params.offset());
        qb
    }

    fn count_builder(&self, params: &ListParams, scope: &[(&'static str, i64)]) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.table));
        self.push_where(&mut qb, params, scope);
        qb
    }

    /// Run the listing and return one page plus its metadata
    pub async fn fetch<T>(
        &self,
        pool: &PgPool,
        params: &ListParams,
        scope: &[(&'static str, i64)],
    ) -> Result<Page<T>, DatabaseError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let total: i64 = self
            .count_builder(params, scope)
            .build_query_scalar()
            .fetch_one(pool)
            .await?;
        let items = self
            .select_builder(params, scope)
            .build_query_as::<T>()
            .fetch_all(pool)
            .await?;
        Ok(Page {
            items,
            meta: PageMeta::new(params.page, params.per_page, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: Listing = Listing {
        table: "users",
        search_columns: &["users.name", "users.email"],
        sortable: &["id", "name", "created_at"],
        soft_deletes: true,
    };

    fn query(pairs: &[(&str, &str)]) -> IndexQuery {
        let mut q = IndexQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "page" => q.page = v,
                "per_page" => q.per_page = v,
                "search" => q.search = v,
                "with_trashed" => q.with_trashed = v,
                "order_by" => q.order_by = v,
                "order_direction" => q.order_direction = v,
                "start_date" => q.start_date = v,
                "end_date" => q.end_date = v,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn defaults_apply_when_query_is_empty() {
        let params = IndexQuery::default().validate(&USERS, 15).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 15);
        assert!(!params.with_trashed);
        assert_eq!(params.order_by, None);

        let sql = USERS.select_builder(&params, &[]).sql().to_owned();
        assert!(sql.contains("users.deleted_at IS NULL"));
        assert!(sql.contains("ORDER BY users.id ASC"));
        assert!(!sql.contains("ILIKE"));
    }

    #[test]
    fn unknown_order_column_is_a_field_error() {
        let err = query(&[("order_by", "password")]).validate(&USERS, 15).unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_json()["errors"]["order_by"][0], "The selected order by is invalid.");
    }

    #[test]
    fn per_page_is_bounded() {
        assert!(query(&[("per_page", "0")]).validate(&USERS, 15).is_err());
        assert!(query(&[("per_page", "101")]).validate(&USERS, 15).is_err());
        assert_eq!(query(&[("per_page", "100")]).validate(&USERS, 15).unwrap().per_page, 100);
    }

    #[test]
    fn end_date_before_start_date_fails() {
        let err = query(&[("start_date", "2024-05-02"), ("end_date", "2024-05-01")])
            .validate(&USERS, 15)
            .unwrap_err();
        assert!(err.to_json()["errors"]["end_date"].is_array());
    }

    #[test]
    fn search_trash_and_dates_shape_the_sql() {
        let params = query(&[
            ("search", "jo"),
            ("with_trashed", "true"),
            ("order_by", "name"),
            ("order_direction", "desc"),
            ("start_date", "2024-05-01"),
            ("end_date", "2024-05-01"),
        ])
        .validate(&USERS, 15)
        .unwrap();

        let sql = USERS.select_builder(&params, &[("user_id", 7)]).sql().to_owned();
        assert!(!sql.contains("deleted_at IS NULL"));
        assert!(sql.contains("users.user_id = $1"));
        assert!(sql.contains("(users.name ILIKE $2 OR users.email ILIKE $3)"));
        assert!(sql.contains("users.created_at >= $4 AND users.created_at < $5"));
        assert!(sql.contains("ORDER BY users.name DESC, users.id ASC"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn last_page_is_at_least_one() {
        assert_eq!(PageMeta::new(1, 15, 0).last_page, 1);
        assert_eq!(PageMeta::new(1, 15, 15).last_page, 1);
        assert_eq!(PageMeta::new(1, 15, 16).last_page, 2);
    }
}

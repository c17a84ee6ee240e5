// handlers/protected/utils.rs - request helpers shared by resource handlers

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::api::validation::is_email;
use crate::api::{FormInput, Validator};
use crate::config;
use crate::database::{IndexQuery, ListParams, Listing};
use crate::error::ApiError;
use crate::services::transfer;
use crate::sqid::SqidCodec;
use crate::types::FileType;

/// Validated listing parameters with the configured default page size
pub fn list_params(query: &IndexQuery, listing: &Listing) -> Result<ListParams, ApiError> {
    query.validate(listing, config::config().app.per_page)
}

/// `{ "sqids": ["...", ...] }`
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub sqids: Option<Value>,
}

impl BulkRequest {
    /// Decoded ids. The array is required and every entry must be a string;
    /// strings that are not valid sqids are dropped.
    pub fn ids(&self, sqids: &SqidCodec) -> Result<Vec<i64>, ApiError> {
        let mut v = Validator::new();
        let entries: &[Value] = match &self.sqids {
            Some(Value::Array(items)) if !items.is_empty() => items.as_slice(),
            Some(Value::Array(_)) | None | Some(Value::Null) => {
                v.add("sqids", "The sqids field is required.");
                &[]
            }
            Some(_) => {
                v.add("sqids", "The sqids field must be an array.");
                &[]
            }
        };

        let mut strings = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match entry.as_str().filter(|s| !s.trim().is_empty()) {
                Some(s) => strings.push(s),
                None => v.add(&format!("sqids.{}", i), format!("The sqids.{} field must be a string.", i)),
            }
        }
        v.finish()?;

        Ok(sqids.decode_many(&strings))
    }
}

/// Export query string; list values are comma separated
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub model: Option<String>,
    pub emails: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub file_type: Option<String>,
    pub columns: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExportParams {
    pub recipients: Vec<String>,
    pub range: Option<(NaiveDate, NaiveDate)>,
    pub file_type: FileType,
    pub columns: Vec<String>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ExportQuery {
    pub fn validate(&self, model: &str, available: &[&str]) -> Result<ExportParams, ApiError> {
        let mut v = Validator::new();

        if let Some(requested) = self.model.as_deref().filter(|m| !m.is_empty()) {
            v.check(requested == model, "model", "The selected model is invalid.");
        }

        let recipients = split_list(self.emails.as_deref());
        if recipients.is_empty() {
            v.add("emails", "The emails field is required.");
        }
        for (i, email) in recipients.iter().enumerate() {
            if !is_email(email) {
                v.add(
                    &format!("emails.{}", i),
                    format!("The emails.{} field must be a valid email address.", i),
                );
            }
        }

        let start = v.required("start_date", self.start_date.as_deref());
        let start = v.date("start_date", start);
        let end = v.required("end_date", self.end_date.as_deref());
        let end = v.date("end_date", end);
        if let (Some(s), Some(e)) = (start, end) {
            v.check(e >= s, "end_date", "The end date field must be a date after or equal to start date.");
        }

        let file_type = v.required("file_type", self.file_type.as_deref());
        v.one_of("file_type", file_type, &["csv", "xlsx"]);
        let file_type = file_type.and_then(|f| f.parse::<FileType>().ok());

        let columns = split_list(self.columns.as_deref());
        if columns.is_empty() {
            v.add("columns", "The columns field is required.");
        }
        for (i, column) in columns.iter().enumerate() {
            if !available.contains(&column.as_str()) {
                v.add(&format!("columns.{}", i), format!("The selected columns.{} is invalid.", i));
            }
        }

        v.finish()?;

        Ok(ExportParams {
            recipients,
            range: start.zip(end),
            file_type: file_type.unwrap_or(FileType::Csv),
            columns,
        })
    }
}

/// Multipart import upload: `file` (csv/txt) plus optional `update_existing`
pub struct ImportFile {
    pub rows: Vec<BTreeMap<String, String>>,
    pub update_existing: bool,
}

impl ImportFile {
    pub fn from_input(input: &FormInput, required: &[&str]) -> Result<Self, ApiError> {
        let mut v = Validator::new();
        let file = input.file("file");
        match file {
            None => v.add("file", "The file field is required."),
            Some(f) => {
                let ok = matches!(f.extension().as_deref(), Some("csv") | Some("txt"));
                v.check(ok, "file", "The file field must be a file of type: csv, txt.");
            }
        }
        let update_existing = v.boolean("update_existing", input.get("update_existing"));
        v.finish()?;

        let rows = match file {
            Some(f) => transfer::read_csv(&f.data, required)?,
            None => Vec::new(),
        };
        Ok(Self {
            rows,
            update_existing: update_existing.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqidConfig;
    use serde_json::json;

    fn codec() -> SqidCodec {
        SqidCodec::from_config(&SqidConfig::default()).unwrap()
    }

    #[test]
    fn bulk_ids_drop_undecodable_entries() {
        let sqids = codec();
        let req = BulkRequest {
            sqids: Some(json!([sqids.encode(3), "not-a-sqid", sqids.encode(9)])),
        };
        assert_eq!(req.ids(&sqids).unwrap(), vec![3, 9]);
    }

    #[test]
    fn bulk_ids_require_a_non_empty_string_array() {
        let sqids = codec();
        assert!(BulkRequest { sqids: None }.ids(&sqids).is_err());
        assert!(BulkRequest { sqids: Some(json!([])) }.ids(&sqids).is_err());
        let err = BulkRequest { sqids: Some(json!([1])) }.ids(&sqids).unwrap_err();
        assert!(err.to_json()["errors"]["sqids.0"].is_array());
    }

    #[test]
    fn export_query_validates_every_list_entry() {
        let query = ExportQuery {
            model: Some("User".into()),
            emails: Some("a@example.com, nope".into()),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-31".into()),
            file_type: Some("pdf".into()),
            columns: Some("id,password".into()),
        };
        let body = query.validate("User", &["id", "name"]).unwrap_err().to_json();
        assert!(body["errors"]["emails.1"].is_array());
        assert!(body["errors"]["file_type"].is_array());
        assert!(body["errors"]["columns.1"].is_array());
        assert!(body["errors"].get("columns.0").is_none());
    }

    #[test]
    fn export_query_accepts_a_complete_request() {
        let query = ExportQuery {
            model: None,
            emails: Some("a@example.com,b@example.com".into()),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-01".into()),
            file_type: Some("xlsx".into()),
            columns: Some("id,name".into()),
        };
        let params = query.validate("User", &["id", "name"]).unwrap();
        assert_eq!(params.recipients.len(), 2);
        assert_eq!(params.file_type, FileType::Xlsx);
        assert_eq!(params.columns, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn export_model_must_match_the_resource() {
        let query = ExportQuery {
            model: Some("Upload".into()),
            ..Default::default()
        };
        let body = query.validate("User", &["id"]).unwrap_err().to_json();
        assert_eq!(body["errors"]["model"][0], "The selected model is invalid.");
    }
}

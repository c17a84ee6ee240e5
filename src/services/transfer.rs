//! CSV/XLSX import and export.

use chrono::Utc;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::services::mail::{Attachment, MailMessage, Mailer};
use crate::types::FileType;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("The file must contain a {0} column.")]
    MissingHeading(String),

    #[error("The file could not be read as CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Heading text → snake_case key (`First Name` → `first_name`)
pub fn normalize_heading(heading: &str) -> String {
    let mut out = String::with_capacity(heading.len());
    let mut pending_sep = false;
    for c in heading.trim().trim_start_matches('\u{feff}').chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Parse a CSV with a heading row into one map per non-empty row.
/// `required` headings must be present.
pub fn read_csv(data: &[u8], required: &[&str]) -> Result<Vec<BTreeMap<String, String>>, TransferError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headings: Vec<String> = reader.headers()?.iter().map(normalize_heading).collect();
    for name in required {
        if !headings.iter().any(|h| h == name) {
            return Err(TransferError::MissingHeading((*name).to_string()));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row = headings
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Render a JSON value as a spreadsheet cell
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Project resources onto the requested columns
pub fn to_rows(resources: &[Value], columns: &[String]) -> Vec<Vec<String>> {
    resources
        .iter()
        .map(|r| columns.iter().map(|c| cell(r.get(c).unwrap_or(&Value::Null))).collect())
        .collect()
}

pub fn write_csv(columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, TransferError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| TransferError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

pub fn write_xlsx(columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, TransferError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    for (col, heading) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, heading, &bold)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string(r as u32 + 1, col as u16, value)?;
        }
    }
    Ok(workbook.save_to_buffer()?)
}

pub fn encode(file_type: FileType, columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, TransferError> {
    match file_type {
        FileType::Csv => write_csv(columns, rows),
        FileType::Xlsx => write_xlsx(columns, rows),
    }
}

/// `user_export_2024-05-01_10-30-00.csv`
pub fn export_filename(model: &str, file_type: FileType) -> String {
    format!(
        "{}_export_{}.{}",
        model.to_lowercase(),
        Utc::now().format("%Y-%m-%d_%H-%M-%S"),
        file_type.extension()
    )
}

/// Rows selected for export, not yet written
pub struct ExportJob {
    pub model: &'static str,
    pub file_type: FileType,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub recipients: Vec<String>,
}

/// An export file on disk waiting to be mailed
#[derive(Debug)]
pub struct WrittenExport {
    pub model: &'static str,
    pub file_type: FileType,
    pub columns: Vec<String>,
    pub recipients: Vec<String>,
    pub filename: String,
    pub path: PathBuf,
    bytes: Vec<u8>,
}

impl ExportJob {
    /// Encode the rows and write the file under `dir`
    pub async fn write(self, dir: &Path) -> Result<WrittenExport, TransferError> {
        let bytes = encode(self.file_type, &self.columns, &self.rows)?;
        tokio::fs::create_dir_all(dir).await?;
        let filename = export_filename(self.model, self.file_type);
        let path = dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!(model = self.model, file = %path.display(), rows = self.rows.len(), "export written");

        Ok(WrittenExport {
            model: self.model,
            file_type: self.file_type,
            columns: self.columns,
            recipients: self.recipients,
            filename,
            path,
            bytes,
        })
    }
}

impl WrittenExport {
    /// Mail the file to every recipient, then delete it. Returns how many
    /// messages were accepted by the mailer.
    pub async fn deliver(self, mailer: Arc<dyn Mailer>) -> usize {
        let mut sent = 0;
        for recipient in &self.recipients {
            let attachment = Attachment {
                filename: self.filename.clone(),
                content_type: self.file_type.mime_type().to_string(),
                data: self.bytes.clone(),
            };
            let message = MailMessage::export_ready(recipient, self.model, &self.columns, attachment);
            match mailer.send(message).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::error!(recipient = %recipient, model = self.model, "Failed to send export mail: {}", e)
                }
            }
        }

        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(file = %self.path.display(), "export file not removed: {}", e);
        }
        sent
    }

    /// Mail in the background
    pub fn spawn_delivery(self, mailer: Arc<dyn Mailer>) {
        tokio::spawn(async move {
            let model = self.model;
            let recipients = self.recipients.len();
            let sent = self.deliver(mailer).await;
            tracing::info!(model, sent, recipients, "export delivered");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn headings_are_snake_cased() {
        assert_eq!(normalize_heading(" First Name "), "first_name");
        assert_eq!(normalize_heading("E-mail"), "e_mail");
        assert_eq!(normalize_heading("\u{feff}email"), "email");
    }

    #[test]
    fn read_csv_maps_rows_by_heading() {
        let data = b"Name,Email,Phone\nJohn,john@example.com,123\n,,\nJane,jane@example.com\n";
        let rows = read_csv(data, &["email"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "John");
        assert_eq!(rows[1]["email"], "jane@example.com");
        assert!(!rows[1].contains_key("phone"));
    }

    #[test]
    fn read_csv_requires_headings() {
        let err = read_csv(b"name\nJohn\n", &["email"]).unwrap_err();
        assert_eq!(err.to_string(), "The file must contain a email column.");
    }

    #[test]
    fn csv_export_renders_nulls_as_empty() {
        let columns = vec!["name".to_string(), "phone".to_string()];
        let rows = to_rows(&[json!({ "name": "John", "phone": null })], &columns);
        let bytes = write_csv(&columns, &rows).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "name,phone\nJohn,\n");
    }

    #[test]
    fn xlsx_export_is_a_zip_container() {
        let columns = vec!["name".to_string()];
        let bytes = write_xlsx(&columns, &[vec!["John".to_string()]]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn export_filename_uses_model_and_extension() {
        let name = export_filename("User", FileType::Xlsx);
        assert!(name.starts_with("user_export_"));
        assert!(name.ends_with(".xlsx"));
    }

    struct Recording(Mutex<Vec<MailMessage>>);

    #[async_trait]
    impl Mailer for Recording {
        async fn send(&self, message: MailMessage) -> Result<(), crate::services::mail::MailError> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn job(recipients: &[&str]) -> ExportJob {
        ExportJob {
            model: "User",
            file_type: FileType::Csv,
            columns: vec!["email".to_string()],
            rows: vec![vec!["john@example.com".to_string()]],
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn export_is_written_then_mailed_and_removed() {
        let dir = std::env::temp_dir().join(format!("atlas-export-{}", uuid::Uuid::new_v4().simple()));
        let mailer = Arc::new(Recording(Mutex::new(Vec::new())));

        let written = job(&["a@example.com", "b@example.com"]).write(&dir).await.unwrap();
        assert!(written.path.exists());
        assert_eq!(std::fs::read(&written.path).unwrap(), b"email\njohn@example.com\n".to_vec());

        let path = written.path.clone();
        assert_eq!(written.deliver(mailer.clone()).await, 2);
        assert!(!path.exists());

        let sent = mailer.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "User Export Ready");
        let attachment = sent[1].attachment.as_ref().unwrap();
        assert_eq!(attachment.content_type, "text/csv");
        assert_eq!(attachment.data, b"email\njohn@example.com\n".to_vec());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unwritable_export_dir_fails_before_any_mail() {
        // A regular file where the directory should be
        let blocker = std::env::temp_dir().join(format!("atlas-export-file-{}", uuid::Uuid::new_v4().simple()));
        std::fs::write(&blocker, b"x").unwrap();

        let err = job(&["a@example.com"]).write(&blocker.join("exports")).await.unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
        let api = crate::error::ApiError::from(err);
        assert_eq!(api.status_code(), 500);

        let _ = std::fs::remove_file(blocker);
    }
}

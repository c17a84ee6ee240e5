// handlers/protected/uploads/crud.rs - upload CRUD handlers

use axum::extract::State;
use axum::Extension;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::validation::{parse_bool, parse_datetime};
use crate::api::{resources, FormInput, Path, Query, Validator};
use crate::database::models::Upload;
use crate::database::IndexQuery;
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::list_params;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::upload_service::{NewUpload, UPLOAD_LISTING};
use crate::services::UploadService;
use crate::state::AppState;
use crate::types::StorageProvider;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "pdf", "doc", "docx", "xls", "xlsx", "zip", "rar"];

/// Optional metadata fields shared by create and update. Only keys present
/// in the request end up in the returned map.
fn meta_fields(input: &FormInput, v: &mut Validator) -> Map<String, Value> {
    let mut meta = Map::new();

    let description = input.get("description");
    v.max_len("description", description, 1000);
    if let Some(d) = description {
        meta.insert("description".into(), Value::String(d.to_string()));
    }

    if let Some(tags) = input.list("tags") {
        for (i, tag) in tags.iter().enumerate() {
            if tag.chars().count() > 50 {
                v.add(&format!("tags.{}", i), "Each tag must not exceed 50 characters.");
            }
        }
        meta.insert("tags".into(), Value::from(tags.to_vec()));
    } else if input.get("tags").is_some() {
        v.add("tags", "The file tags field must be an array.");
    }

    if let Some(raw) = input.get("is_public") {
        match parse_bool(raw) {
            Some(b) => {
                meta.insert("is_public".into(), Value::Bool(b));
            }
            None => v.add("is_public", "The public access field must be true or false."),
        }
    }

    if let Some(raw) = input.get("expires_at") {
        match parse_datetime(raw) {
            Some(at) if at > Utc::now() => {
                meta.insert("expires_at".into(), Value::String(at.to_rfc3339()));
            }
            Some(_) => v.add("expires_at", "The expiration date must be a future date."),
            None => v.add("expires_at", "The expires at field must be a valid date."),
        }
    }
    meta
}

/// The directory must stay below the storage root once leading slashes are trimmed.
fn validate_dir(dir: Option<&str>, v: &mut Validator) {
    let Some(dir) = dir.map(str::trim).filter(|d| !d.is_empty()) else {
        v.add("path", "A storage path is required.");
        return;
    };
    v.max_len("path", Some(dir), 255);
    let escapes = dir.contains('\\')
        || dir.split('/').any(|segment| segment == "..")
        || dir.as_bytes().get(1) == Some(&b':');
    v.check(!escapes, "path", "The path must be a relative directory.");
}

/// `uploads/2024/05` + `pdf` → `uploads/2024/05/<uuid>.pdf`
fn storage_path(dir: &str, extension: &str) -> (String, String) {
    let filename = format!("{}.{}", Uuid::new_v4(), extension);
    let dir = dir.trim().trim_matches('/');
    let path = if dir.is_empty() { filename.clone() } else { format!("{}/{}", dir, filename) };
    (filename, path)
}

/// GET /api/v1/uploads - Paginated upload listing
pub async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> ApiResult<Vec<Value>> {
    let params = list_params(&query, &UPLOAD_LISTING)?;
    let page = UPLOAD_LISTING
        .fetch::<Upload>(&state.pool, &params, &[])
        .await
        .map_err(ApiError::from)
        .during("fetching uploads")?
        .map(|u| resources::upload(&u, &state.sqids, &state.storage));
    Ok(ApiResponse::paginated("Uploads retrieved successfully", page.items, page.meta))
}

/// POST /api/v1/uploads - Store a file (multipart/form-data)
///
/// Expected Input (multipart fields):
/// ```text
/// file=@report.pdf
/// path=uploads/2024/05
/// storage_provider=local
/// description=Quarterly report
/// tags[]=finance
/// is_public=1
/// expires_at=2030-01-01 00:00:00
/// ```
pub async fn store(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    input: FormInput,
) -> ApiResult<Value> {
    let mut v = Validator::new();

    let file = input.file("file");
    match file {
        None => v.add("file", "A file is required for upload."),
        Some(f) => {
            v.check(f.size() <= MAX_UPLOAD_BYTES, "file", "The file size must not exceed 10MB.");
            let ext_ok = f.extension().map_or(false, |e| ALLOWED_EXTENSIONS.contains(&e.as_str()));
            v.check(
                ext_ok,
                "file",
                "The file must be of type: jpeg, png, pdf, doc, docx, xls, xlsx, zip, or rar.",
            );
        }
    }

    let dir = input.get("path");
    validate_dir(dir, &mut v);

    let provider = match input.get("storage_provider").filter(|p| !p.is_empty()) {
        None => {
            v.add("storage_provider", "A storage provider must be specified.");
            None
        }
        Some(p) => {
            let parsed = p.parse::<StorageProvider>().ok();
            v.check(parsed.is_some(), "storage_provider", "The selected storage provider is invalid.");
            parsed
        }
    };

    let meta = meta_fields(&input, &mut v);
    v.finish()?;

    let (Some(file), Some(dir), Some(provider)) = (file, dir, provider) else {
        return Err(ApiError::bad_request("Invalid upload request"));
    };

    async {
        let extension = file.extension().unwrap_or_default();
        let (filename, path) = storage_path(dir, &extension);
        let stored = state.storage.store(provider, &path, file.data.clone()).await?;
        let mime_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());

        let upload = UploadService::new(state.pool.clone())
            .create(NewUpload {
                user_id: auth.id(),
                filename,
                original_filename: file.filename.clone().unwrap_or_default(),
                mime_type,
                size: file.size() as i64,
                path: stored.path,
                disk: stored.disk,
                provider: stored.provider.to_string(),
                meta: (!meta.is_empty()).then(|| Value::Object(meta)),
            })
            .await?;
        Ok::<_, ApiError>(ApiResponse::created(
            "Upload created successfully",
            resources::upload(&upload, &state.sqids, &state.storage),
        ))
    }
    .await
    .during("creating the upload")
}

/// GET /api/v1/uploads/:sqid
pub async fn show(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Upload")?;
    let upload = UploadService::new(state.pool.clone())
        .find(id)
        .await
        .map_err(ApiError::from)
        .during("fetching the upload")?;
    Ok(ApiResponse::success(
        "Upload retrieved successfully",
        resources::upload(&upload, &state.sqids, &state.storage),
    ))
}

/// PUT /api/v1/uploads/:sqid - `original_filename` and the meta fields
pub async fn update(State(state): State<AppState>, Path(sqid): Path<String>, input: FormInput) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Upload")?;

    let mut v = Validator::new();
    let original_filename = input.get("original_filename");
    v.max_len("original_filename", original_filename, 255);
    let meta = meta_fields(&input, &mut v);
    v.finish()?;

    let upload = UploadService::new(state.pool.clone())
        .update(id, original_filename.map(str::to_string), meta)
        .await
        .map_err(ApiError::from)
        .during("updating the upload")?;
    Ok(ApiResponse::success(
        "Upload updated successfully",
        resources::upload(&upload, &state.sqids, &state.storage),
    ))
}

/// DELETE /api/v1/uploads/:sqid - Soft delete; the stored file is kept
pub async fn destroy(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Upload")?;
    UploadService::new(state.pool.clone())
        .repository()
        .soft_delete(id)
        .await
        .map_err(ApiError::from)
        .during("deleting the upload")?;
    Ok(ApiResponse::message("Upload deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UploadedFile;
    use bytes::Bytes;

    #[test]
    fn storage_path_joins_directory_and_uuid_name() {
        let (filename, path) = storage_path("/uploads/2024/", "pdf");
        assert!(filename.ends_with(".pdf"));
        assert_eq!(path, format!("uploads/2024/{}", filename));
    }

    fn dir_errors(dir: Option<&str>) -> Value {
        let mut v = Validator::new();
        validate_dir(dir, &mut v);
        v.finish().unwrap_err().to_json()["errors"]["path"].clone()
    }

    #[test]
    fn directories_outside_the_root_are_rejected() {
        for dir in ["../etc", "uploads/../../secret", "..", "C:/Windows", "uploads\\..\\x"] {
            assert_eq!(dir_errors(Some(dir))[0], "The path must be a relative directory.", "{}", dir);
        }
        assert_eq!(dir_errors(None)[0], "A storage path is required.");
        assert_eq!(dir_errors(Some("  "))[0], "A storage path is required.");
    }

    #[test]
    fn nested_relative_directories_pass() {
        for dir in ["uploads", "/uploads/2024/05/", "docs/v1..2"] {
            let mut v = Validator::new();
            validate_dir(Some(dir), &mut v);
            assert!(v.finish().is_ok(), "{}", dir);
        }
    }

    #[test]
    fn meta_collects_only_supplied_fields() {
        let mut input = FormInput::default();
        input.fields.insert("description".into(), "Report".into());
        input.fields.insert("is_public".into(), "1".into());
        input.lists.insert("tags".into(), vec!["finance".into()]);

        let mut v = Validator::new();
        let meta = meta_fields(&input, &mut v);
        assert!(v.finish().is_ok());
        assert_eq!(meta["description"], "Report");
        assert_eq!(meta["is_public"], true);
        assert_eq!(meta["tags"][0], "finance");
        assert!(meta.get("expires_at").is_none());
    }

    #[test]
    fn meta_rejects_long_tags_and_past_expiry() {
        let mut input = FormInput::default();
        input.lists.insert("tags".into(), vec!["ok".into(), "x".repeat(51)]);
        input.fields.insert("expires_at".into(), "2001-01-01".into());

        let mut v = Validator::new();
        meta_fields(&input, &mut v);
        let body = v.finish().unwrap_err().to_json();
        assert_eq!(body["errors"]["tags.1"][0], "Each tag must not exceed 50 characters.");
        assert_eq!(body["errors"]["expires_at"][0], "The expiration date must be a future date.");
    }

    #[test]
    fn allowed_extensions_cover_office_and_archives() {
        let file = UploadedFile {
            filename: Some("Budget.XLSX".into()),
            content_type: None,
            data: Bytes::from_static(b"x"),
        };
        assert!(ALLOWED_EXTENSIONS.contains(&file.extension().unwrap().as_str()));
        assert!(!ALLOWED_EXTENSIONS.contains(&"exe"));
    }
}

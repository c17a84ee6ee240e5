// handlers/public/auth/register.rs - POST /api/v1/auth/register handler

use axum::{extract::State, http::HeaderMap};
use bytes::Bytes;
use serde_json::Value;

use super::session::{device_info, send_verification, token_payload};
use crate::api::{FormInput, UploadedFile, Validator};
use crate::auth::{generate_jwt, password::hash_password, Claims};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::upload_service::NewUpload;
use crate::services::user_service::{NewUser, UniqueColumn};
use crate::services::{UploadService, UserService};
use crate::state::AppState;

const PROFILE_IMAGE_MAX_BYTES: usize = 2 * 1024 * 1024;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"];

/// POST /api/v1/auth/register - Create an account (JSON or multipart)
///
/// Expected Input:
/// ```json
/// {
///   "name": "John Doe",
///   "email": "john@example.com",
///   "username": "johndoe",
///   "phone": "+1234567890",
///   "password": "password",
///   "password_confirmation": "password",
///   "profile_image": <file>,        // optional, multipart only
///   "device_token": "fMIRMc1kF0M..." // optional
/// }
/// ```
///
/// Expected Output (201):
/// ```json
/// {
///   "success": true,
///   "message": "User registered successfully. Please check your email for verification.",
///   "data": { "user": {...}, "access_token": "...", "token_type": "Bearer", "expires_in": 3600 }
/// }
/// ```
pub async fn register(State(state): State<AppState>, headers: HeaderMap, input: FormInput) -> ApiResult<Value> {
    let users = UserService::new(state.pool.clone());

    let mut v = Validator::new();
    let name = v.required("name", input.get("name"));
    v.max_len("name", name, 255);
    let email = v.required("email", input.get("email"));
    v.email("email", email);
    v.max_len("email", email, 255);
    let username = v.required("username", input.get("username"));
    v.max_len("username", username, 255);
    let phone = v.required("phone", input.get("phone"));
    v.max_len("phone", phone, 255);
    let password = v.required("password", input.get("password"));
    v.min_len("password", password, 8);
    v.confirmed("password", password, input.get("password_confirmation"));
    let profile_image = input.file("profile_image");
    if let Some(file) = profile_image {
        validate_image(&mut v, file);
    }
    let device = device_info(&mut v, &headers, input.get("device_token"), None, None);

    if let Some(email) = email {
        v.unique("email", users.is_taken(UniqueColumn::Email, email, None).await.map_err(ApiError::from).during("validating the request")?);
    }
    if let Some(username) = username {
        v.unique("username", users.is_taken(UniqueColumn::Username, username, None).await.map_err(ApiError::from).during("validating the request")?);
    }
    if let Some(phone) = phone {
        v.unique("phone", users.is_taken(UniqueColumn::Phone, phone, None).await.map_err(ApiError::from).during("validating the request")?);
    }
    v.finish()?;

    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        return Err(ApiError::bad_request("Validation failed"));
    };

    async {
        let mut user = users
            .create(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                username: username.map(str::to_string),
                phone: phone.map(str::to_string),
                password_hash: hash_password(password)?,
                ..Default::default()
            })
            .await?;

        if let Some(file) = profile_image {
            let stored = store_profile_image(&state, user.id, file).await?;
            user = users.set_profile_image(user.id, &stored).await?;
        }

        users.upsert_device_token(user.id, &device).await?;

        if let Err(e) = send_verification(&state, &user).await {
            tracing::error!(user_id = user.id, "Failed to send verification mail: {}", e);
        }

        let issued = generate_jwt(Claims::session(user.id))?;
        Ok::<_, ApiError>(ApiResponse::created(
            "User registered successfully. Please check your email for verification.",
            token_payload(&state, &user, &issued),
        ))
    }
    .await
    .during("registering user")
}

fn validate_image(v: &mut Validator, file: &UploadedFile) {
    let is_image = file
        .extension()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    v.check(is_image, "profile_image", "The profile image field must be an image.");
    v.check(
        file.size() <= PROFILE_IMAGE_MAX_BYTES,
        "profile_image",
        "The profile image field must not be greater than 2048 kilobytes.",
    );
}

/// Store under `profile_images/` on the default provider and record the upload
async fn store_profile_image(state: &AppState, user_id: i64, file: &UploadedFile) -> Result<String, ApiError> {
    let ext = file.extension().unwrap_or_else(|| "jpg".to_string());
    let filename = format!("{}.{}", uuid::Uuid::new_v4(), ext);
    let path = format!("profile_images/{}", filename);
    let provider = state.storage.default_provider();
    let stored = state.storage.store(provider, &path, Bytes::clone(&file.data)).await?;

    UploadService::new(state.pool.clone())
        .create(NewUpload {
            user_id,
            filename,
            original_filename: file.filename.clone().unwrap_or_else(|| path.clone()),
            mime_type: file
                .content_type
                .clone()
                .unwrap_or_else(|| mime_guess::from_path(&path).first_or_octet_stream().to_string()),
            size: file.size() as i64,
            path: stored.path.clone(),
            disk: stored.disk,
            provider: stored.provider.to_string(),
            meta: None,
        })
        .await?;

    Ok(stored.path)
}

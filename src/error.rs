// HTTP API Error Types
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Client-facing body of a 500 that no handler has described yet
pub const INTERNAL_MESSAGE: &str = "An unexpected error occurred.";

/// Field name to list of messages, serialized as the `errors` object of a 422 body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 422 Unprocessable Entity
    ValidationError { message: String, errors: FieldErrors },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::ValidationError { .. } => 422,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, errors } => json!({
                "success": false,
                "message": message,
                "errors": errors,
            }),
            _ => json!({
                "success": false,
                "message": self.message(),
            }),
        }
    }

    /// Get error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// `"<Model> not found"`
    pub fn model_not_found(model: &str) -> Self {
        ApiError::NotFound(format!("{} not found", model))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    /// 422 with the standard "Validation failed" message.
    pub fn validation(errors: FieldErrors) -> Self {
        ApiError::ValidationError {
            message: "Validation failed".to_string(),
            errors,
        }
    }

    /// 422 for a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    /// Log `cause` and return a 500 whose body never includes it.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(cause = %cause, "internal error");
        ApiError::InternalServerError(INTERNAL_MESSAGE.to_string())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

/// Attaches the action being performed to internal errors, producing
/// `"An error occurred while <action>."` for the client.
pub trait ErrorAction<T> {
    fn during(self, action: &str) -> Result<T, ApiError>;
}

impl<T> ErrorAction<T> for Result<T, ApiError> {
    fn during(self, action: &str) -> Result<T, ApiError> {
        self.map_err(|err| match err {
            ApiError::InternalServerError(cause) => {
                tracing::error!(action, cause = %cause, "request failed");
                ApiError::InternalServerError(format!("An error occurred while {}.", action))
            }
            other => other,
        })
    }
}

// Convert other error types to ApiError
impl From<crate::database::DatabaseError> for ApiError {
    fn from(err: crate::database::DatabaseError) -> Self {
        use crate::database::DatabaseError;
        match err {
            DatabaseError::NotFound(model) => ApiError::model_not_found(&model),
            DatabaseError::ConfigMissing(name) => {
                tracing::error!("Missing database configuration: {}", name);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Invalid database URL");
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::QueryError(msg) => ApiError::internal(format!("Database query error: {}", msg)),
            DatabaseError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
            DatabaseError::Sqlx(sqlx_err) => sqlx_err.into(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                tracing::error!("Database connection error: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                tracing::warn!("Unique constraint violation: {}", db);
                ApiError::conflict("The resource already exists.")
            }
            _ => ApiError::internal(format!("SQLx error: {}", err)),
        }
    }
}

impl From<crate::auth::JwtError> for ApiError {
    fn from(err: crate::auth::JwtError) -> Self {
        use crate::auth::JwtError;
        match err {
            JwtError::Invalid(msg) => ApiError::unauthorized(msg),
            other => ApiError::internal(format!("JWT error: {}", other)),
        }
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::internal(format!("Password hashing error: {}", err))
    }
}

impl From<crate::services::storage::StorageError> for ApiError {
    fn from(err: crate::services::storage::StorageError) -> Self {
        use crate::services::storage::StorageError;
        match err {
            StorageError::Unsupported(_) | StorageError::NotConfigured(_) => {
                ApiError::field("storage_provider", err.to_string())
            }
            other => ApiError::internal(format!("Storage error: {}", other)),
        }
    }
}

impl From<crate::services::mail::MailError> for ApiError {
    fn from(err: crate::services::mail::MailError) -> Self {
        ApiError::internal(format!("Mail error: {}", err))
    }
}

impl From<crate::services::fcm::PushError> for ApiError {
    fn from(err: crate::services::fcm::PushError) -> Self {
        ApiError::internal(format!("Push notification error: {}", err))
    }
}

impl From<crate::services::transfer::TransferError> for ApiError {
    fn from(err: crate::services::transfer::TransferError) -> Self {
        use crate::services::transfer::TransferError;
        match err {
            TransferError::MissingHeading(_) | TransferError::Csv(_) => ApiError::field("file", err.to_string()),
            other => ApiError::internal(format!("Import/export error: {}", other)),
        }
    }
}

impl From<crate::services::social::SocialError> for ApiError {
    fn from(err: crate::services::social::SocialError) -> Self {
        use crate::services::social::SocialError;
        match err {
            SocialError::MissingEmail => ApiError::field("email", err.to_string()),
            other => ApiError::internal(format!("Social login error: {}", other)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::field("body", e.body_text()),
            other => ApiError::invalid_json(other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::field("query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::debug!(code = self.error_code(), status = status.as_u16(), "{}", self.message());
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_body_lists_field_errors() {
        let mut errors = FieldErrors::new();
        errors.insert("email".into(), vec!["The email field is required.".into()]);
        let err = ApiError::validation(errors);

        assert_eq!(err.status_code(), 422);
        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["email"][0], "The email field is required.");
    }

    #[test]
    fn plain_errors_have_no_errors_key() {
        let body = ApiError::model_not_found("User").to_json();
        assert_eq!(body, json!({ "success": false, "message": "User not found" }));
    }

    #[test]
    fn during_rewrites_only_internal_errors() {
        let internal: Result<(), ApiError> = Err(ApiError::internal_server_error("pool closed"));
        let err = internal.during("fetching users").unwrap_err();
        assert_eq!(err.message(), "An error occurred while fetching users.");
        assert_eq!(err.status_code(), 500);

        let forbidden: Result<(), ApiError> = Err(ApiError::forbidden("nope"));
        let err = forbidden.during("fetching users").unwrap_err();
        assert_eq!(err.message(), "nope");
    }

    #[test]
    fn database_causes_stay_out_of_the_body() {
        let err = ApiError::from(sqlx::Error::ColumnNotFound("secret_internal_col".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), INTERNAL_MESSAGE);
        assert!(!err.to_json().to_string().contains("secret_internal_col"));

        let err = ApiError::from(crate::database::DatabaseError::QueryError("relation \"users\" does not exist".into()));
        assert_eq!(err.message(), INTERNAL_MESSAGE);

        let err = ApiError::from(crate::database::DatabaseError::Sqlx(sqlx::Error::RowNotFound));
        assert!(!err.message().contains("no rows"));
    }

    #[test]
    fn service_causes_stay_out_of_the_body() {
        use crate::services::storage::StorageError;
        let err = ApiError::from(StorageError::InvalidPath("/etc/shadow".into()));
        assert!(!err.message().contains("/etc/shadow"));
        assert_eq!(err.status_code(), 500);
    }
}

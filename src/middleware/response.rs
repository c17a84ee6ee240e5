use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::database::listing::PageMeta;

/// Wrapper for API responses that adds the `{success, message, data}` envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub message: String,
    pub data: T,
    pub meta: Option<PageMeta>,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
            meta: None,
            status_code: None, // Default to 200 OK
        }
    }

    /// Create an API response with custom status code
    pub fn with_status(message: impl Into<String>, data: T, status_code: StatusCode) -> Self {
        Self {
            message: message.into(),
            data,
            meta: None,
            status_code: Some(status_code),
        }
    }

    /// Create a 201 Created response
    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(message, data, StatusCode::CREATED)
    }

    /// Create a 200 response carrying pagination metadata
    pub fn paginated(message: impl Into<String>, data: T, meta: PageMeta) -> Self {
        Self {
            message: message.into(),
            data,
            meta: Some(meta),
            status_code: None,
        }
    }
}

impl ApiResponse<Value> {
    /// Message-only response; `data` serializes as `null`
    pub fn message(message: impl Into<String>) -> Self {
        Self::success(message, Value::Null)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        // Convert data to JSON Value for consistent envelope format
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "message": "Failed to serialize response data"
                    })),
                )
                    .into_response();
            }
        };

        let mut envelope = json!({
            "success": true,
            "message": self.message,
            "data": data_value
        });
        if let Some(meta) = self.meta {
            envelope["meta"] = json!(meta);
        }

        (status, Json(envelope)).into_response()
    }
}

// Convenience type alias
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn created_wraps_data_in_envelope() {
        let (status, body) = body_of(ApiResponse::created("User created", json!({ "id": "abc" })).into_response()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "User created");
        assert_eq!(body["data"]["id"], "abc");
        assert!(body.get("meta").is_none());
    }

    #[tokio::test]
    async fn paginated_adds_meta() {
        let meta = PageMeta::new(2, 10, 35);
        let (_, body) = body_of(ApiResponse::paginated("Users retrieved", json!([]), meta).into_response()).await;
        assert_eq!(body["meta"]["current_page"], 2);
        assert_eq!(body["meta"]["last_page"], 4);
        assert_eq!(body["meta"]["per_page"], 10);
        assert_eq!(body["meta"]["total"], 35);
    }

    #[tokio::test]
    async fn message_only_has_null_data() {
        let (_, body) = body_of(ApiResponse::message("done").into_response()).await;
        assert_eq!(body["data"], Value::Null);
    }
}

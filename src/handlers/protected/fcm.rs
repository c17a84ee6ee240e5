// handlers/protected/fcm.rs - direct push notification endpoints

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::api::{Json, Validator};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::fcm::PushMessage;
use crate::services::notification_service::BatchOutcome;
use crate::services::transfer::cell;
use crate::services::PushService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub token: Option<String>,
    pub tokens: Option<Vec<Value>>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<Value>,
    pub image: Option<String>,
}

/// Validated title, body, data and image shared by both routes
struct Content {
    title: String,
    body: String,
    data: BTreeMap<String, String>,
    image: Option<String>,
}

impl SendRequest {
    fn content(&self, v: &mut Validator) -> Content {
        let title = v.required("title", self.title.as_deref()).unwrap_or_default().to_string();
        let body = v.required("body", self.body.as_deref()).unwrap_or_default().to_string();
        let image = self.image.as_deref().filter(|i| !i.is_empty());
        v.url("image", image);

        let data = match &self.data {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map.iter().map(|(k, val)| (k.clone(), cell(val))).collect(),
            Some(_) => {
                v.add("data", "The data field must be an array.");
                BTreeMap::new()
            }
        };

        Content {
            title,
            body,
            data,
            image: image.map(str::to_string),
        }
    }
}

/// POST /api/v1/fcm/send-to-device
///
/// Expected Input:
/// ```json
/// { "token": "fcm-device-token", "title": "Hello", "body": "World", "data": { "order_id": "42" }, "image": "https://example.com/a.png" }
/// ```
pub async fn send_to_device(State(state): State<AppState>, Json(payload): Json<SendRequest>) -> ApiResult<Value> {
    let mut v = Validator::new();
    let token = v.required("token", payload.token.as_deref()).map(str::to_string);
    let content = payload.content(&mut v);
    v.finish()?;
    let token = token.unwrap_or_default();

    async {
        let push = PushService::new(state.pool.clone(), state.push.clone());
        if !push.validate(&token).await? {
            return Err(ApiError::bad_request("Invalid FCM token"));
        }
        let message = PushMessage::new(token, content.title, content.body)
            .with_data(content.data)
            .with_image(content.image);
        let response = push.send(&message).await?;
        Ok::<_, ApiError>(ApiResponse::success("Notification sent successfully", response))
    }
    .await
    .during("sending FCM notification")
}

/// POST /api/v1/fcm/send-to-devices
///
/// Expected Output (Success):
/// ```json
/// { "success": true, "message": "Notifications sent", "data": { "success_count": 2, "failure_count": 0, "tokens_with_errors": [] } }
/// ```
pub async fn send_to_devices(
    State(state): State<AppState>,
    Json(payload): Json<SendRequest>,
) -> ApiResult<BatchOutcome> {
    let mut v = Validator::new();
    let mut tokens = Vec::new();
    match payload.tokens.as_deref() {
        None | Some([]) => v.add("tokens", "The tokens field is required."),
        Some(entries) => {
            for (i, entry) in entries.iter().enumerate() {
                match entry.as_str().filter(|s| !s.trim().is_empty()) {
                    Some(token) => tokens.push(token.to_string()),
                    None => v.add(&format!("tokens.{}", i), format!("The tokens.{} field is required.", i)),
                }
            }
        }
    }
    let content = payload.content(&mut v);
    v.finish()?;

    async {
        let push = PushService::new(state.pool.clone(), state.push.clone());
        for token in &tokens {
            if !push.validate(token).await? {
                return Err(ApiError::bad_request("Invalid FCM tokens"));
            }
        }
        let outcome = push
            .send_many(&tokens, &content.title, &content.body, content.data, content.image)
            .await;
        tracing::info!(
            success = outcome.success_count,
            failure = outcome.failure_count,
            "multicast push finished"
        );
        Ok::<_, ApiError>(ApiResponse::success("Notifications sent", outcome))
    }
    .await
    .during("sending FCM notification")
}

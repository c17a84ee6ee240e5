// handlers/protected/users/block_ip.rs - per-user IP blacklist entries

use axum::extract::State;
use serde_json::Value;

use crate::api::{resources, Path, Validator};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::blocked_ip_service::BlockedIpInput;
use crate::services::{BlockedIpService, UserService};
use crate::state::AppState;

fn validate_ip(ip: &str) -> Result<(), ApiError> {
    let mut v = Validator::new();
    v.ip("ip", Some(ip));
    v.finish()
}

/// POST /api/v1/users/:sqid/block-ip/:ip
///
/// Expected Output (Success):
/// ```json
/// { "success": true, "message": "IP address: 10.0.0.5 has been blacklisted for user: John Doe", "data": { ... } }
/// ```
pub async fn block_ip(
    State(state): State<AppState>,
    Path((sqid, ip)): Path<(String, String)>,
) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    validate_ip(&ip)?;

    async {
        let user = UserService::new(state.pool.clone()).find(id).await?;
        let row = BlockedIpService::new(state.pool.clone())
            .create(BlockedIpInput {
                ip_address: ip.clone(),
                reason: None,
                blocked_until: None,
                user_id: Some(user.id),
            })
            .await?;
        tracing::info!(user_id = user.id, ip = %ip, "ip blocked for user");
        Ok::<_, ApiError>(ApiResponse::created(
            format!("IP address: {} has been blacklisted for user: {}", ip, user.name),
            resources::blocked_ip(&row, &state.sqids),
        ))
    }
    .await
    .during("blocking the IP address")
}

/// DELETE /api/v1/users/:sqid/unblock-ip/:ip
pub async fn unblock_ip(
    State(state): State<AppState>,
    Path((sqid, ip)): Path<(String, String)>,
) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    validate_ip(&ip)?;

    async {
        let user = UserService::new(state.pool.clone()).find(id).await?;
        BlockedIpService::new(state.pool.clone())
            .unblock_for_user(user.id, &ip)
            .await?;
        Ok::<_, ApiError>(ApiResponse::message(format!(
            "IP address: {} has been removed from the blacklist for user: {}",
            ip, user.name
        )))
    }
    .await
    .during("unblocking the IP address")
}

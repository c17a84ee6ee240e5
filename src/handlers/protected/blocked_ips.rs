// handlers/protected/blocked_ips.rs - /api/v1/blocked-ips

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{resources, Json, Path, Query, Validator};
use crate::database::models::BlockedIp;
use crate::database::IndexQuery;
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::list_params;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::blocked_ip_service::{BlockedIpInput, BLOCKED_IP_LISTING};
use crate::services::{BlockedIpService, UserService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BlockedIpRequest {
    pub ip_address: Option<String>,
    pub reason: Option<String>,
    pub blocked_until: Option<String>,
    /// Sqid of the user the block belongs to
    pub user_id: Option<String>,
}

impl BlockedIpRequest {
    async fn validate(&self, state: &AppState) -> Result<BlockedIpInput, ApiError> {
        let mut v = Validator::new();
        let ip = v.required("ip_address", self.ip_address.as_deref());
        v.ip("ip_address", ip);
        v.max_len("reason", self.reason.as_deref(), 255);
        let blocked_until = v.future_datetime("blocked_until", self.blocked_until.as_deref());

        let user_id = match self.user_id.as_deref().filter(|s| !s.is_empty()) {
            Some(sqid) => {
                let found = match state.sqids.decode(sqid) {
                    Some(id) => match UserService::new(state.pool.clone()).find(id).await {
                        Ok(user) => Some(user.id),
                        Err(crate::database::DatabaseError::NotFound(_)) => None,
                        Err(e) => return Err(e.into()),
                    },
                    None => None,
                };
                v.check(found.is_some(), "user_id", "The selected user id is invalid.");
                found
            }
            None => None,
        };
        v.finish()?;

        Ok(BlockedIpInput {
            ip_address: ip.unwrap_or_default().trim().to_string(),
            reason: self.reason.clone(),
            blocked_until,
            user_id,
        })
    }
}

/// GET /api/v1/blocked-ips
pub async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> ApiResult<Vec<Value>> {
    let params = list_params(&query, &BLOCKED_IP_LISTING)?;
    let page = BLOCKED_IP_LISTING
        .fetch::<BlockedIp>(&state.pool, &params, &[])
        .await
        .map_err(ApiError::from)
        .during("fetching blocked IPs")?
        .map(|row| resources::blocked_ip(&row, &state.sqids));
    Ok(ApiResponse::paginated("Blocked IPs retrieved successfully", page.items, page.meta))
}

/// POST /api/v1/blocked-ips
///
/// Expected Input:
/// ```json
/// { "ip_address": "203.0.113.7", "reason": "Credential stuffing", "blocked_until": "2030-01-01 00:00:00" }
/// ```
pub async fn store(State(state): State<AppState>, Json(payload): Json<BlockedIpRequest>) -> ApiResult<Value> {
    let input = payload.validate(&state).await.during("creating the blocked ip")?;
    let row = BlockedIpService::new(state.pool.clone())
        .create(input)
        .await
        .map_err(ApiError::from)
        .during("creating the blocked ip")?;
    Ok(ApiResponse::created(
        "IP address blocked successfully",
        resources::blocked_ip(&row, &state.sqids),
    ))
}

/// GET /api/v1/blocked-ips/:sqid
pub async fn show(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Blocked IP")?;
    let row = BlockedIpService::new(state.pool.clone())
        .repository()
        .select_404(id)
        .await
        .map_err(ApiError::from)
        .during("fetching the blocked ip")?;
    Ok(ApiResponse::success(
        "Blocked IP retrieved successfully",
        resources::blocked_ip(&row, &state.sqids),
    ))
}

/// PUT /api/v1/blocked-ips/:sqid - Same fields as create
pub async fn update(
    State(state): State<AppState>,
    Path(sqid): Path<String>,
    Json(payload): Json<BlockedIpRequest>,
) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Blocked IP")?;
    let service = BlockedIpService::new(state.pool.clone());
    service
        .repository()
        .select_404(id)
        .await
        .map_err(ApiError::from)
        .during("updating the blocked ip")?;

    let input = payload.validate(&state).await.during("updating the blocked ip")?;
    let row = service
        .update(id, input)
        .await
        .map_err(ApiError::from)
        .during("updating the blocked ip")?;
    Ok(ApiResponse::success(
        "Blocked IP updated successfully",
        resources::blocked_ip(&row, &state.sqids),
    ))
}

/// DELETE /api/v1/blocked-ips/:sqid - Soft delete
pub async fn destroy(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Blocked IP")?;
    BlockedIpService::new(state.pool.clone())
        .repository()
        .soft_delete(id)
        .await
        .map_err(ApiError::from)
        .during("deleting the blocked ip")?;
    Ok(ApiResponse::message("Blocked IP removed successfully"))
}

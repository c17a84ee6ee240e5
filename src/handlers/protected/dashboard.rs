// handlers/protected/dashboard.rs - GET /api/v1/dashboard/metrics

use axum::extract::State;

use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::dashboard_service::{self, DashboardMetrics};
use crate::state::AppState;

/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "Dashboard metrics retrieved successfully",
///   "data": {
///     "total_oauth_clients": 4,
///     "total_revoked_oauth_clients": 1,
///     "total_users": 120,
///     "total_access_tokens": 310,
///     "total_blocked_ips": 2,
///     "total_vendors": 0
///   }
/// }
/// ```
pub async fn metrics(State(state): State<AppState>) -> ApiResult<DashboardMetrics> {
    let metrics = dashboard_service::collect(&state.pool, state.vendors.as_ref())
        .await
        .map_err(ApiError::from)
        .during("fetching dashboard metrics")?;
    Ok(ApiResponse::success("Dashboard metrics retrieved successfully", metrics))
}

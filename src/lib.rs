pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod sqid;
pub mod state;
pub mod types;

#[cfg(test)]
pub mod testing;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{delete, get, patch, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::database::DatabaseManager;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full application router
pub fn app(state: AppState) -> Router {
    let cfg = config::config();

    let api = Router::new()
        .merge(auth_public_routes())
        .merge(protected_routes(state.clone()));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .nest_service("/storage", ServeDir::new(&cfg.storage.local_root))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(cfg.app.max_request_size_bytes))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    let security = &config::config().security;
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if crate::is_development!() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

fn auth_public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/issue-passport-token", post(auth::issue_token))
        .route("/auth/email/verify/:sqid/:hash", get(auth::verify_email))
        .route("/auth/:provider", get(auth::social_redirect))
        .route("/auth/:provider/callback", get(auth::social_callback))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(user_routes())
        .merge(upload_routes())
        .merge(blocked_ip_routes())
        .merge(oauth_client_routes())
        .merge(notification_routes())
        .route("/fcm/send-to-device", post(protected::fcm::send_to_device))
        .route("/fcm/send-to-devices", post(protected::fcm::send_to_devices))
        .route("/dashboard/metrics", get(protected::dashboard::metrics))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn auth_routes() -> Router<AppState> {
    use protected::auth;

    Router::new()
        .route("/auth/email/resend", post(auth::resend_verification))
        .route("/auth/unlock", post(auth::unlock))
        .route("/auth/change-password", put(auth::change_password))
        .route("/auth/profile", get(auth::profile).put(auth::update_profile))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
}

fn user_routes() -> Router<AppState> {
    use protected::users;

    Router::new()
        .route("/users", get(users::index).post(users::store))
        .route("/users/bulk-delete", post(users::bulk_delete))
        .route("/users/bulk-restore", post(users::bulk_restore))
        .route("/users/import", post(users::import))
        .route("/users/export", get(users::export))
        .route(
            "/users/:sqid",
            get(users::show).put(users::update).delete(users::destroy),
        )
        .route("/users/:sqid/restore", post(users::restore))
        .route("/users/:sqid/force", delete(users::force_delete))
        .route("/users/:sqid/block-ip/:ip", post(users::block_ip))
        .route("/users/:sqid/unblock-ip/:ip", delete(users::unblock_ip))
}

fn upload_routes() -> Router<AppState> {
    use protected::uploads;

    Router::new()
        .route("/uploads", get(uploads::index).post(uploads::store))
        .route("/uploads/bulk-delete", post(uploads::bulk_delete))
        .route("/uploads/bulk-restore", post(uploads::bulk_restore))
        .route("/uploads/import", post(uploads::import))
        .route("/uploads/export", get(uploads::export))
        .route(
            "/uploads/:sqid",
            get(uploads::show).put(uploads::update).delete(uploads::destroy),
        )
        .route("/uploads/:sqid/restore", post(uploads::restore))
        .route("/uploads/:sqid/force", delete(uploads::force_delete))
}

fn blocked_ip_routes() -> Router<AppState> {
    use protected::blocked_ips;

    Router::new()
        .route("/blocked-ips", get(blocked_ips::index).post(blocked_ips::store))
        .route(
            "/blocked-ips/:sqid",
            get(blocked_ips::show)
                .put(blocked_ips::update)
                .delete(blocked_ips::destroy),
        )
}

fn oauth_client_routes() -> Router<AppState> {
    use protected::oauth_clients;

    Router::new()
        .route("/oauth-clients", get(oauth_clients::index).post(oauth_clients::store))
        .route("/oauth-clients/tokens", get(oauth_clients::tokens))
        .route("/oauth-clients/tokens/:id", delete(oauth_clients::delete_token))
        .route("/oauth-clients/all-tokens", get(oauth_clients::all_tokens))
        .route(
            "/oauth-clients/:id",
            get(oauth_clients::show)
                .put(oauth_clients::update)
                .delete(oauth_clients::destroy),
        )
        .route("/oauth-clients/:id/revoke", post(oauth_clients::revoke))
        .route("/oauth-clients/:id/secret", post(oauth_clients::secret))
}

fn notification_routes() -> Router<AppState> {
    use protected::notifications;

    Router::new()
        .route("/notifications/all", get(notifications::index))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/mark-all-read", post(notifications::mark_all_read))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        .route("/notifications/:id", delete(notifications::destroy))
}

async fn root() -> Json<Value> {
    let cfg = config::config();

    Json(json!({
        "success": true,
        "data": {
            "name": cfg.app.name,
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "/api/v1/auth/{login,register,forgot-password,reset-password,issue-passport-token} (public)",
                "auth": "/api/v1/auth/* (protected)",
                "users": "/api/v1/users[/:sqid] (protected)",
                "uploads": "/api/v1/uploads[/:sqid] (protected)",
                "blocked_ips": "/api/v1/blocked-ips[/:sqid] (protected)",
                "oauth_clients": "/api/v1/oauth-clients[/:id] (protected)",
                "notifications": "/api/v1/notifications/* (protected)",
                "fcm": "/api/v1/fcm/* (protected)",
                "dashboard": "/api/v1/dashboard/metrics (protected)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "message": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                    }
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app(testing::test_state()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let (status, body) = send(Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["data"]["endpoints"]["users"].is_string());
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        for (method, uri) in [
            ("GET", "/api/v1/users"),
            ("GET", "/api/v1/auth/profile"),
            ("POST", "/api/v1/auth/logout"),
            ("GET", "/api/v1/dashboard/metrics"),
            ("DELETE", "/api/v1/oauth-clients/tokens/abc"),
        ] {
            let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
            let (status, body) = send(request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn garbage_bearer_token_is_unauthenticated() {
        let request = Request::get("/api/v1/users")
            .header("authorization", "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Unauthenticated.");
    }

    #[tokio::test]
    async fn login_validates_before_touching_the_database() {
        let request = Request::post("/api/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"email":"not-an-email"}"#))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["password"].is_array());
    }

    #[tokio::test]
    async fn unknown_social_provider_is_not_found() {
        let (status, _) = send(Request::get("/api/v1/auth/myspace").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_degraded_without_a_database() {
        let (status, body) = send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["data"]["status"], "degraded");
    }
}

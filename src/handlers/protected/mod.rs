// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Security Level: bearer token validated by `jwt_auth_middleware`, which also
// rejects blacklisted tokens and tokens whose user no longer exists.
// Route Prefix: /api/v1/*
// Handler Context: `Extension<AuthUser>` carries the loaded user and token id.

pub mod auth; // /api/v1/auth/* account and session endpoints
pub mod blocked_ips; // /api/v1/blocked-ips
pub mod dashboard; // /api/v1/dashboard/metrics
pub mod fcm; // /api/v1/fcm/*
pub mod notifications; // /api/v1/notifications/*
pub mod oauth_clients; // /api/v1/oauth-clients
pub mod uploads; // /api/v1/uploads
pub mod users; // /api/v1/users
pub mod utils; // listing, bulk and import/export request helpers

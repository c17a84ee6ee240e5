pub mod auth_service;
pub mod blocked_ip_service;
pub mod dashboard_service;
pub mod fcm;
pub mod mail;
pub mod notification_service;
pub mod oauth_service;
pub mod social;
pub mod storage;
pub mod transfer;
pub mod upload_service;
pub mod user_service;

pub use auth_service::AuthService;
pub use blocked_ip_service::BlockedIpService;
pub use notification_service::{NotificationService, PushService};
pub use oauth_service::{OAuthService, VendorDirectory};
pub use upload_service::UploadService;
pub use user_service::UserService;

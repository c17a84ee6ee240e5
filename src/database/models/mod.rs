pub mod blocked_ip;
pub mod notification;
pub mod oauth;
pub mod upload;
pub mod user;

pub use blocked_ip::BlockedIp;
pub use notification::{Notification, PushNotification};
pub use oauth::{OAuthAccessToken, OAuthClient};
pub use upload::Upload;
pub use user::{DeviceToken, User};

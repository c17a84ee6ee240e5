// handlers/protected/auth/mod.rs - Authenticated account endpoints under /api/v1/auth

pub mod account;
pub mod session;

pub use account::{change_password, profile, resend_verification, unlock, update_profile};
pub use session::{logout, refresh};

// handlers/public/auth/mod.rs - Public authentication handlers
//
// Token acquisition endpoints that do not require a bearer token.

pub mod login; // POST /api/v1/auth/login
pub mod passport; // POST /api/v1/auth/issue-passport-token
pub mod password; // POST /api/v1/auth/forgot-password, reset-password
pub mod register; // POST /api/v1/auth/register
pub mod session; // login completion shared by every sign-in path
pub mod social; // GET /api/v1/auth/:provider[/callback]
pub mod verify; // GET /api/v1/auth/email/verify/:sqid/:hash

pub use login::login;
pub use passport::issue_token;
pub use password::{forgot_password, reset_password};
pub use register::register;
pub use social::{callback as social_callback, redirect as social_redirect};
pub use verify::verify_email;

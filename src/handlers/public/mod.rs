// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: none. Login paths check the IP block list themselves.

pub mod auth;

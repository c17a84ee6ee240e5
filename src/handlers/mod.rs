// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (JWT auth). Routes are assembled in `lib.rs`.

pub mod protected; // Tier 2: JWT authentication required
pub mod public; // Tier 1: token acquisition, verification and social login

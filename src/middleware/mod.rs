//! Middleware for AutoLabel.
//!
//! - `token_auth` - optional shared API token for every route but `/health`

mod token_auth;

pub use token_auth::require_token;

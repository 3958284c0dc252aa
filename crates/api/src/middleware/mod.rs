//! Request extractors shared by HTTP handlers.
//!
//! - [`auth::AuthUser`] -- Extracts the caller from a JWT Bearer token.

pub mod auth;

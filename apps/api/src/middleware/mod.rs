//! Middleware components for the Chorus API
//!
//! Token verification is delegated to the identity-aware proxy in front
//! of this service; handlers receive the authenticated user through the
//! `CurrentUser` extractor.

pub mod auth;

pub use auth::{CurrentUser, USER_ID_HEADER};

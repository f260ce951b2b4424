//! HTTP route handlers for the Chorus API
//!
//! This module contains the REST surface consumed by clients that are
//! not (or not yet) holding a live socket:
//! - Device registration, listing, switching, and command endpoints
//! - Player settings and the recently-played list
//! - Health check and status endpoints

pub mod devices;
pub mod health;
pub mod users;

pub use devices::{devices_router, DevicesState};
pub use health::{health_router, HealthState};
pub use users::{users_router, UsersState};

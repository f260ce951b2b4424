//! Database repository layer for Chorus
//!
//! This module provides the data access layer over the durable record
//! store. The device store is a trait seam so the session core can be
//! exercised against an in-memory double in tests; the Postgres
//! implementations here are what production wires in.

pub mod device;
pub mod user;

pub use device::{DeviceRepository, DeviceStore, UserDevices};
pub use user::UserRepository;

//! Business logic services for Chorus
//!
//! This module contains the session core's business logic:
//! - Device registration, discovery, and liveness
//! - The single-active-device arbiter
//! - Targeted playback-command delivery

pub mod devices;

pub use devices::DeviceService;

//! WebSocket layer for real-time multi-device coordination
//!
//! This module handles:
//! - The per-connection event loop and upgrade handler
//! - The process-wide connection directory (connection <-> user/device)
//! - Global presence tracking
//! - Playback command routing and state fan-out between devices

pub mod connection;
pub mod handler;
pub mod messages;
pub mod presence;
pub mod sync;

pub use connection::ConnectionDirectory;
pub use handler::ws_handler;
pub use presence::PresenceTracker;
pub use sync::SyncHandler;

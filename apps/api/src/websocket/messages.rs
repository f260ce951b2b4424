//! WebSocket message types for real-time coordination
//!
//! This module defines the message protocol for client-server communication
//! over WebSocket connections. Messages are serialized as JSON with a
//! snake_case `type` tag and a `payload` object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::device::Device;

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Announce the logical user behind this connection
    UserConnected(String),

    /// Update the user's free-text activity status
    UpdateActivity { user_id: String, activity: String },

    /// Bind this connection to a registered device
    RegisterDevice { device_id: String, user_id: String },

    /// Send a playback command to an explicit target device
    SendPlaybackCommand {
        target_device_id: String,
        command: String,
        #[serde(default)]
        data: Value,
    },

    /// Ack from a device that applied (or failed to apply) a command
    PlaybackCommandReceived {
        command: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },

    /// Refresh a device's liveness and flag
    UpdateDeviceStatus { device_id: String, status: String },

    /// Mirror playback state to the user's sibling devices
    SyncPlaybackState(SyncPlaybackPayload),

    /// Request the live device list for a user
    DiscoverDevices { user_id: String },
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full online-set snapshot (sent to a newly connected party)
    UsersOnline(Vec<String>),

    /// Full activity snapshot (sent to a newly connected party)
    Activities(Vec<ActivityEntry>),

    /// A user came online
    UserConnected(String),

    /// A user went offline (last connection closed)
    UserDisconnected(String),

    /// A user's activity changed
    ActivityUpdated { user_id: String, activity: String },

    /// This connection was bound to a device
    DeviceRegistered {
        device_id: String,
        connection_id: String,
    },

    /// Device registration failed
    DeviceRegistrationError { message: String },

    /// A playback command for this device
    PlaybackCommand {
        command: String,
        data: Value,
        from_device: Option<String>,
        timestamp: i64,
    },

    /// Ack to the sender of a targeted command
    CommandSent {
        target_device_id: String,
        command: String,
    },

    /// Targeted command could not be delivered
    CommandError { message: String },

    /// A sibling device reported a status change
    DeviceStatusUpdated {
        device_id: String,
        status: String,
        timestamp: i64,
    },

    /// The user-level active device changed
    ActiveDeviceChanged {
        new_active_device: String,
        device_name: String,
    },

    /// Playback state mirrored from another device
    PlaybackStateSynced(PlaybackSyncedPayload),

    /// Response to a discovery request
    DevicesDiscovered {
        devices: Vec<Device>,
        active_device: Option<String>,
    },

    /// Discovery failed
    DeviceDiscoveryError { message: String },

    /// A sibling device's connection closed
    DeviceDisconnected { device_id: String, timestamp: i64 },

    /// Protocol-level error
    Error(ErrorPayload),
}

// =============================================================================
// Payload Types
// =============================================================================

/// One user's current activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub user_id: String,
    pub activity: String,
}

/// Playback state as reported by the originating device. Song and queue
/// entries are opaque to this server; the media catalog lives in another
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPlaybackPayload {
    pub user_id: String,
    pub current_song: Option<Value>,
    pub is_playing: bool,
    pub current_time: f64,
    #[serde(default)]
    pub queue: Vec<Value>,
}

/// Playback state as delivered to sibling devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSyncedPayload {
    pub current_song: Option<Value>,
    pub is_playing: bool,
    pub current_time: f64,
    pub queue: Vec<Value>,
    pub from_device: Option<String>,
    pub timestamp: i64,
}

impl PlaybackSyncedPayload {
    /// Stamp an incoming snapshot with its originating device and time
    pub fn from_snapshot(
        payload: SyncPlaybackPayload,
        from_device: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            current_song: payload.current_song,
            is_playing: payload.is_playing,
            current_time: payload.current_time,
            queue: payload.queue,
            from_device,
            timestamp,
        }
    }
}

/// Payload for Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::new("INVALID_MESSAGE", message)
    }
}

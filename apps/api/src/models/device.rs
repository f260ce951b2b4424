//! Device records for multi-device sessions
//!
//! A device row is created once at registration and never deleted; its
//! liveness flag, connection id, and last-seen timestamp are refreshed as
//! the device connects, reports status, and disconnects. Stale devices
//! simply age out of discovery once their last-seen timestamp falls
//! outside the liveness window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A device is live/discoverable only if it was seen within this window.
pub const LIVENESS_WINDOW_SECS: i64 = 5 * 60;

/// Maximum length for device_name (matches database constraint)
pub const MAX_DEVICE_NAME_LEN: usize = 255;

/// Errors that can occur during device validation
#[derive(Debug, Error)]
pub enum DeviceValidationError {
    #[error("device_name cannot be empty")]
    EmptyDeviceName,
    #[error("device_name exceeds maximum length of {MAX_DEVICE_NAME_LEN} (got {0})")]
    DeviceNameTooLong(usize),
    #[error("invalid device_type '{0}', must be one of: mobile, desktop, tablet, web")]
    InvalidDeviceType(String),
}

/// Device type categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
    Web,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Mobile => write!(f, "mobile"),
            DeviceType::Desktop => write!(f, "desktop"),
            DeviceType::Tablet => write!(f, "tablet"),
            DeviceType::Web => write!(f, "web"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = DeviceValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mobile" => Ok(DeviceType::Mobile),
            "desktop" => Ok(DeviceType::Desktop),
            "tablet" => Ok(DeviceType::Tablet),
            "web" => Ok(DeviceType::Web),
            other => Err(DeviceValidationError::InvalidDeviceType(other.to_string())),
        }
    }
}

/// A registered device belonging to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Globally unique, immutable once created
    pub device_id: String,

    /// Human-readable device name
    pub device_name: String,

    /// Type of device
    pub device_type: DeviceType,

    /// Liveness flag: has a live connection and was recently seen.
    /// Distinct from the user-level active-device selection.
    pub is_active: bool,

    /// Last activity timestamp
    pub last_seen_at: DateTime<Utc>,

    /// Current live-connection id, if any (last-writer-wins across
    /// reconnects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl Device {
    /// Create a freshly registered device: live now, no connection yet.
    pub fn new(device_id: String, device_name: String, device_type: DeviceType) -> Self {
        Self {
            device_id,
            device_name,
            device_type,
            is_active: true,
            last_seen_at: Utc::now(),
            connection_id: None,
        }
    }

    /// Whether the device falls inside the liveness window at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen_at < Duration::seconds(LIVENESS_WINDOW_SECS)
    }
}

/// Validate a device name before registration
pub fn validate_device_name(device_name: &str) -> Result<(), DeviceValidationError> {
    if device_name.is_empty() {
        return Err(DeviceValidationError::EmptyDeviceName);
    }
    if device_name.len() > MAX_DEVICE_NAME_LEN {
        return Err(DeviceValidationError::DeviceNameTooLong(device_name.len()));
    }
    Ok(())
}

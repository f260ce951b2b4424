//! User models
//!
//! Users are identified by the stable external id issued by the identity
//! provider; rows are created by the identity-sync service, never by this
//! server. The user row also carries the single active-device pointer and
//! the synced player settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// How many recently-played entries are kept per user
pub const RECENT_SONGS_CAP: i64 = 50;

/// User record from the database
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Stable external id from the identity provider
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// The single active-device pointer. Invariant: when set, it
    /// references a device row owned by this user.
    pub active_device_id: Option<String>,
    pub player_settings: Json<PlayerSettings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Player settings synced across a user's devices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerSettings {
    pub shuffle: bool,
    #[serde(rename = "loop")]
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub show_queue: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            shuffle: false,
            loop_mode: LoopMode::Off,
            volume: 75,
            show_queue: false,
        }
    }
}

impl PlayerSettings {
    /// Validate ranges before persisting
    pub fn validate(&self) -> Result<(), String> {
        if self.volume > 100 {
            return Err(format!("volume must be 0-100 (got {})", self.volume));
        }
        Ok(())
    }
}

/// Loop mode options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    One,
    All,
}

/// One entry of the bounded recently-played list
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecentSong {
    pub song_id: String,
    pub played_at: DateTime<Utc>,
}

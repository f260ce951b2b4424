//! Global presence tracking
//!
//! Tracks which logical users are currently connected and their free-text
//! activity status. Presence is social: activity changes are broadcast to
//! every connected party, not just the user's own devices. State lives
//! only in memory and is rebuilt empty on process start.
//!
//! A user goes offline only when their *last* open connection closes;
//! a single device disconnecting while siblings remain connected leaves
//! the user online. The offline decision itself is made by the caller,
//! which can see the connection directory.

use std::sync::Arc;

use dashmap::DashMap;

use super::messages::ActivityEntry;

/// Activity assigned to a user when they first come online
pub const IDLE_ACTIVITY: &str = "Idle";

/// In-memory map of online users and their activities
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    activities: Arc<DashMap<String, String>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user online and return the full online snapshot for the
    /// newly connected party. A user already online (sibling device)
    /// keeps their current activity.
    pub fn connect(&self, user_id: &str) -> Vec<String> {
        self.activities
            .entry(user_id.to_string())
            .or_insert_with(|| IDLE_ACTIVITY.to_string());

        tracing::debug!(user_id = %user_id, online = self.activities.len(), "User online");

        self.online_users()
    }

    /// Update a user's activity
    pub fn set_activity(&self, user_id: &str, activity: &str) {
        self.activities
            .insert(user_id.to_string(), activity.to_string());
    }

    /// Current activity of a user, if online
    pub fn activity_of(&self, user_id: &str) -> Option<String> {
        self.activities.get(user_id).map(|a| a.value().clone())
    }

    /// Whether a user is currently online
    pub fn is_online(&self, user_id: &str) -> bool {
        self.activities.contains_key(user_id)
    }

    /// Remove a user from the online set. Returns true if they were
    /// online. Callers invoke this only once the user's last connection
    /// has closed.
    pub fn mark_offline(&self, user_id: &str) -> bool {
        let was_online = self.activities.remove(user_id).is_some();
        if was_online {
            tracing::debug!(user_id = %user_id, online = self.activities.len(), "User offline");
        }
        was_online
    }

    /// All online user ids
    pub fn online_users(&self) -> Vec<String> {
        self.activities.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of every online user's activity
    pub fn activities_snapshot(&self) -> Vec<ActivityEntry> {
        self.activities
            .iter()
            .map(|e| ActivityEntry {
                user_id: e.key().clone(),
                activity: e.value().clone(),
            })
            .collect()
    }

    /// Number of online users
    pub fn online_count(&self) -> usize {
        self.activities.len()
    }
}

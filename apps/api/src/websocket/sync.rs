//! Per-connection event routing
//!
//! `SyncHandler` processes every inbound event for one connection:
//! presence announcements, device registration, targeted playback
//! commands, state fan-out, discovery, and the disconnect cleanup. All
//! delivery is at-most-once and fire-and-forget; a handler never tears
//! down the connection loop, it reports failures back over the same
//! channel and logs them.

use chrono::Utc;
use serde_json::Value;

use crate::services::DeviceService;

use super::connection::{ConnectionDirectory, ConnectionId};
use super::messages::{
    ClientEvent, ErrorPayload, PlaybackSyncedPayload, ServerEvent, SyncPlaybackPayload,
};
use super::presence::PresenceTracker;

/// Handles events for a single connection
#[derive(Clone)]
pub struct SyncHandler {
    connection_id: ConnectionId,
    directory: ConnectionDirectory,
    presence: PresenceTracker,
    devices: DeviceService,
}

impl SyncHandler {
    pub fn new(
        connection_id: ConnectionId,
        directory: ConnectionDirectory,
        presence: PresenceTracker,
        devices: DeviceService,
    ) -> Self {
        Self {
            connection_id,
            directory,
            presence,
            devices,
        }
    }

    /// Dispatch one inbound event
    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::UserConnected(user_id) => self.handle_user_connected(user_id),
            ClientEvent::UpdateActivity { user_id, activity } => {
                self.handle_update_activity(user_id, activity)
            }
            ClientEvent::RegisterDevice { device_id, user_id } => {
                self.handle_register_device(device_id, user_id).await
            }
            ClientEvent::SendPlaybackCommand {
                target_device_id,
                command,
                data,
            } => self.handle_send_command(target_device_id, command, data),
            ClientEvent::PlaybackCommandReceived {
                command,
                success,
                error,
            } => self.handle_command_ack(command, success, error),
            ClientEvent::UpdateDeviceStatus { device_id, status } => {
                self.handle_update_status(device_id, status).await
            }
            ClientEvent::SyncPlaybackState(payload) => self.handle_sync_state(payload),
            ClientEvent::DiscoverDevices { user_id } => self.handle_discover(user_id).await,
        }
    }

    /// Announce the user behind this connection and bring them online.
    /// The new party gets the full online and activity snapshots; everyone
    /// else gets a single incremental event.
    fn handle_user_connected(&self, user_id: String) {
        self.directory.bind_user(self.connection_id, &user_id);

        let online = self.presence.connect(&user_id);
        self.send_to_self(ServerEvent::UsersOnline(online));
        self.send_to_self(ServerEvent::Activities(self.presence.activities_snapshot()));

        self.directory
            .broadcast_all_except(self.connection_id, ServerEvent::UserConnected(user_id));
    }

    /// Presence is global: activity changes go to every connected party,
    /// not just the user's own devices.
    fn handle_update_activity(&self, user_id: String, activity: String) {
        self.presence.set_activity(&user_id, &activity);
        self.directory
            .broadcast_all(ServerEvent::ActivityUpdated { user_id, activity });
    }

    async fn handle_register_device(&self, device_id: String, user_id: String) {
        self.directory.bind(self.connection_id, &user_id, &device_id);

        let connection_id = self.connection_id.to_string();
        match self
            .devices
            .attach_connection(&user_id, &device_id, &connection_id)
            .await
        {
            Ok(()) => {
                self.send_to_self(ServerEvent::DeviceRegistered {
                    device_id,
                    connection_id,
                });
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    device_id = %device_id,
                    error = %e,
                    "Device registration failed"
                );
                self.send_to_self(ServerEvent::DeviceRegistrationError {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Targeted command addressed to an explicit device. Delivered to at
    /// most one connection; a disconnected target is reported back to the
    /// sender, never queued.
    fn handle_send_command(&self, target_device_id: String, command: String, data: Value) {
        let from_device = self.directory.resolve_device(self.connection_id);

        let Some(target) = self.directory.connection_for_device(&target_device_id) else {
            self.send_to_self(ServerEvent::CommandError {
                message: "Target device not connected".to_string(),
            });
            return;
        };

        let event = ServerEvent::PlaybackCommand {
            command: command.clone(),
            data,
            from_device,
            timestamp: Utc::now().timestamp_millis(),
        };

        match self.directory.send_to(target, event) {
            Ok(()) => {
                self.send_to_self(ServerEvent::CommandSent {
                    target_device_id,
                    command,
                });
            }
            Err(e) => {
                tracing::debug!(
                    target_device_id = %target_device_id,
                    error = %e,
                    "Targeted command undeliverable"
                );
                self.send_to_self(ServerEvent::CommandError {
                    message: "Target device not connected".to_string(),
                });
            }
        }
    }

    /// Command acks are logged, never propagated back to the original
    /// caller.
    fn handle_command_ack(&self, command: String, success: bool, error: Option<String>) {
        let device_id = self.directory.resolve_device(self.connection_id);
        if success {
            tracing::debug!(device_id = ?device_id, command = %command, "Command applied");
        } else {
            tracing::warn!(
                device_id = ?device_id,
                command = %command,
                error = ?error,
                "Command failed on device"
            );
        }
    }

    async fn handle_update_status(&self, device_id: String, status: String) {
        if let Err(e) = self.devices.update_status(&device_id, &status).await {
            tracing::error!(device_id = %device_id, error = %e, "Device status update failed");
            return;
        }

        // Status changes are private to the user's own devices
        if let Some(user_id) = self.directory.resolve_user(self.connection_id) {
            self.directory.broadcast_user_except(
                &user_id,
                self.connection_id,
                ServerEvent::DeviceStatusUpdated {
                    device_id,
                    status,
                    timestamp: Utc::now().timestamp_millis(),
                },
            );
        }
    }

    /// Mirror playback state to every other open connection of the user.
    /// Best-effort: no retry, no ordering beyond per-connection delivery
    /// order, and the originating connection never hears its own echo.
    fn handle_sync_state(&self, payload: SyncPlaybackPayload) {
        let user_id = payload.user_id.clone();
        let from_device = self.directory.resolve_device(self.connection_id);
        let event = ServerEvent::PlaybackStateSynced(PlaybackSyncedPayload::from_snapshot(
            payload,
            from_device,
            Utc::now().timestamp_millis(),
        ));

        let sent = self
            .directory
            .broadcast_user_except(&user_id, self.connection_id, event);
        tracing::trace!(user_id = %user_id, sent, "Playback state fanned out");
    }

    async fn handle_discover(&self, user_id: String) {
        match self.devices.list_devices(&user_id).await {
            Ok(list) => {
                self.send_to_self(ServerEvent::DevicesDiscovered {
                    devices: list.devices,
                    active_device: list.active_device,
                });
            }
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "Device discovery failed");
                self.send_to_self(ServerEvent::DeviceDiscoveryError {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Cleanup after the transport closed: reconcile the store, drop the
    /// binding, notify the user's remaining devices, and take the user
    /// offline only when this was their last open connection.
    pub async fn handle_disconnect(&self) {
        // Store update first, while the directory still knows the binding
        if let Err(e) = self.devices.mark_disconnected(self.connection_id).await {
            tracing::error!(
                connection_id = %self.connection_id,
                error = %e,
                "Store reconcile on disconnect failed"
            );
        }

        let Some(binding) = self.directory.unbind(self.connection_id) else {
            return;
        };

        if let (Some(user_id), Some(device_id)) = (&binding.user_id, &binding.device_id) {
            self.directory.broadcast_user(
                user_id,
                ServerEvent::DeviceDisconnected {
                    device_id: device_id.clone(),
                    timestamp: Utc::now().timestamp_millis(),
                },
            );
        }

        if let Some(user_id) = &binding.user_id {
            if self.directory.user_connection_count(user_id) == 0
                && self.presence.mark_offline(user_id)
            {
                self.directory
                    .broadcast_all(ServerEvent::UserDisconnected(user_id.clone()));
            }
        }
    }

    /// Report a malformed inbound frame back to the client
    pub fn report_invalid_message(&self, detail: impl Into<String>) {
        self.send_to_self(ServerEvent::Error(ErrorPayload::invalid_message(detail)));
    }

    fn send_to_self(&self, event: ServerEvent) {
        if let Err(e) = self.directory.send_to(self.connection_id, event) {
            tracing::debug!(
                connection_id = %self.connection_id,
                error = %e,
                "Failed to send message to self"
            );
        }
    }
}

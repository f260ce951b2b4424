//! Device registry, active-device arbiter, and targeted command delivery
//!
//! `DeviceService` owns the session-core semantics: how devices join a
//! user's device set, which one is the user-level active device, and how
//! a command reaches the active device's live connection. The durable
//! store behind it is a trait so the semantics can be exercised against
//! an in-memory double; the connection directory is the authoritative
//! source for open connections.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::device::{validate_device_name, Device, DeviceType};
use crate::repositories::{DeviceStore, UserDevices};
use crate::websocket::connection::{ConnectionDirectory, ConnectionId};
use crate::websocket::messages::ServerEvent;

/// Result of a device listing: live devices plus the active pointer
#[derive(Debug, Clone)]
pub struct DeviceList {
    pub devices: Vec<Device>,
    pub active_device: Option<String>,
}

#[derive(Clone)]
pub struct DeviceService {
    store: Arc<dyn DeviceStore>,
    directory: ConnectionDirectory,
}

impl DeviceService {
    pub fn new(store: Arc<dyn DeviceStore>, directory: ConnectionDirectory) -> Self {
        Self { store, directory }
    }

    /// Register a new device for a user and return its fresh id.
    ///
    /// Re-opening the app on the same kind of device replaces the old
    /// session, so every other device of the same type loses its liveness
    /// flag. The first device a user ever registers becomes their active
    /// device; later registrations never steal the selection.
    pub async fn register_device(
        &self,
        user_id: &str,
        device_name: &str,
        device_type: &str,
    ) -> ApiResult<String> {
        validate_device_name(device_name)?;
        let device_type: DeviceType = device_type.parse().map_err(ApiError::from)?;

        let session = self
            .store
            .load_user_devices(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("user", user_id))?;

        let device_id = Uuid::new_v4().to_string();
        let device = Device::new(device_id.clone(), device_name.to_string(), device_type);

        self.store
            .deactivate_devices_of_type(user_id, &device_type.to_string())
            .await?;
        self.store.insert_device(user_id, &device).await?;

        if session.active_device_id.is_none() {
            self.store
                .set_active_device(user_id, Some(&device_id))
                .await?;
        }

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            device_type = %device_type,
            "Device registered"
        );

        Ok(device_id)
    }

    /// List a user's live devices and their active-device pointer.
    /// Devices outside the liveness window are not discoverable.
    pub async fn list_devices(&self, user_id: &str) -> ApiResult<DeviceList> {
        let session = self
            .store
            .load_user_devices(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("user", user_id))?;

        let now = Utc::now();
        let devices = session
            .devices
            .into_iter()
            .filter(|d| d.is_live(now))
            .collect();

        Ok(DeviceList {
            devices,
            active_device: session.active_device_id,
        })
    }

    /// Switch the user-level active device and notify every open
    /// connection of that user. Returns the device name for caller
    /// confirmation.
    pub async fn set_active_device(&self, user_id: &str, device_id: &str) -> ApiResult<String> {
        let session = self
            .store
            .load_user_devices(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("user", user_id))?;

        let device = session
            .device(device_id)
            .ok_or_else(|| ApiError::not_found("device", device_id))?;
        let device_name = device.device_name.clone();

        self.store
            .set_active_device(user_id, Some(device_id))
            .await?;
        self.store.touch_device(device_id, None).await?;

        let notified = self.directory.broadcast_user(
            user_id,
            ServerEvent::ActiveDeviceChanged {
                new_active_device: device_id.to_string(),
                device_name: device_name.clone(),
            },
        );

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            notified,
            "Active device switched"
        );

        Ok(device_name)
    }

    /// Deliver a playback command to the user's stored active device.
    /// Fire-and-forget: the receiving device may report back through the
    /// transport, but success here only means the command left for an
    /// open connection. Returns the target's device name.
    pub async fn send_playback_command(
        &self,
        user_id: &str,
        command: &str,
        data: Value,
        from_device: Option<String>,
    ) -> ApiResult<String> {
        let session = self
            .store
            .load_user_devices(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("user", user_id))?;

        let active = session
            .active_device()
            .ok_or_else(|| ApiError::not_found("active device", user_id))?;

        let event = ServerEvent::PlaybackCommand {
            command: command.to_string(),
            data,
            from_device,
            timestamp: Utc::now().timestamp_millis(),
        };

        self.directory
            .send_to_device(&active.device_id, event)
            .map_err(|e| {
                tracing::debug!(
                    user_id = %user_id,
                    device_id = %active.device_id,
                    error = %e,
                    "Playback command undeliverable"
                );
                ApiError::DeliveryFailed(format!(
                    "active device {} not connected",
                    active.device_id
                ))
            })?;

        Ok(active.device_name.clone())
    }

    /// Attach a live connection to a device record: refreshes last-seen,
    /// stores the connection id, flags the device live. A status update
    /// racing an unknown or stale device is a no-op, not an error.
    pub async fn attach_connection(
        &self,
        user_id: &str,
        device_id: &str,
        connection_id: &str,
    ) -> ApiResult<()> {
        let updated = self
            .store
            .update_connection(user_id, device_id, connection_id)
            .await?;

        if !updated {
            tracing::debug!(
                user_id = %user_id,
                device_id = %device_id,
                "Connection update for unknown device ignored"
            );
        }

        Ok(())
    }

    /// Reconcile the store after a connection closed. The device id may
    /// be unknown to the caller at disconnect time, so it is resolved
    /// through the connection directory.
    pub async fn mark_disconnected(&self, connection_id: ConnectionId) -> ApiResult<()> {
        let Some(device_id) = self.directory.resolve_device(connection_id) else {
            return Ok(());
        };

        self.store.clear_connection(&device_id).await?;

        tracing::debug!(
            connection_id = %connection_id,
            device_id = %device_id,
            "Device marked disconnected"
        );

        Ok(())
    }

    /// Refresh a device's liveness from a status report. Returns false
    /// when the device row does not exist.
    pub async fn update_status(&self, device_id: &str, status: &str) -> ApiResult<bool> {
        self.store
            .touch_device(device_id, Some(status == "active"))
            .await
    }

    /// Validate that the pointer invariant holds for a loaded session.
    /// Used by debug assertions and tests.
    pub fn pointer_is_consistent(session: &UserDevices) -> bool {
        match &session.active_device_id {
            Some(id) => session.device(id).is_some(),
            None => true,
        }
    }
}

//! In-memory double for the durable device store
//!
//! Mirrors the read-modify-write, last-write-wins behavior of the
//! Postgres repository closely enough to exercise the session core
//! without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chorus_api::error::{ApiError, ApiResult};
use chorus_api::models::device::Device;
use chorus_api::repositories::{DeviceStore, UserDevices};

#[derive(Debug, Default, Clone)]
struct StoredUser {
    devices: Vec<Device>,
    active_device_id: Option<String>,
}

/// In-memory `DeviceStore` implementation for tests
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeviceStore {
    users: Arc<Mutex<HashMap<String, StoredUser>>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user row (the identity-sync collaborator's job in
    /// production)
    pub fn add_user(&self, user_id: &str) {
        self.users
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default();
    }

    /// Seed a device directly, bypassing registration semantics
    pub fn seed_device(&self, user_id: &str, device: Device) {
        self.users
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .devices
            .push(device);
    }

    /// Fetch a device row by id, across all users
    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.users
            .lock()
            .unwrap()
            .values()
            .flat_map(|u| u.devices.iter())
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    /// Overwrite a device's last-seen timestamp (to simulate staleness)
    pub fn set_last_seen(&self, device_id: &str, last_seen_at: DateTime<Utc>) {
        let mut users = self.users.lock().unwrap();
        for user in users.values_mut() {
            if let Some(device) = user.devices.iter_mut().find(|d| d.device_id == device_id) {
                device.last_seen_at = last_seen_at;
            }
        }
    }

    /// The active pointer currently stored for a user
    pub fn active_pointer(&self, user_id: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .and_then(|u| u.active_device_id.clone())
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn load_user_devices(&self, user_id: &str) -> ApiResult<Option<UserDevices>> {
        let users = self.users.lock().unwrap();
        Ok(users.get(user_id).map(|u| UserDevices {
            devices: u.devices.clone(),
            active_device_id: u.active_device_id.clone(),
        }))
    }

    async fn insert_device(&self, user_id: &str, device: &Device) -> ApiResult<()> {
        let mut users = self.users.lock().unwrap();

        // Device ids are globally unique across users
        let collision = users
            .values()
            .flat_map(|u| u.devices.iter())
            .any(|d| d.device_id == device.device_id);
        if collision {
            return Err(ApiError::conflict("device", device.device_id.clone()));
        }

        users
            .entry(user_id.to_string())
            .or_default()
            .devices
            .push(device.clone());
        Ok(())
    }

    async fn deactivate_devices_of_type(&self, user_id: &str, device_type: &str) -> ApiResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(user_id) {
            for device in &mut user.devices {
                if device.device_type.to_string() == device_type {
                    device.is_active = false;
                }
            }
        }
        Ok(())
    }

    async fn set_active_device(&self, user_id: &str, device_id: Option<&str>) -> ApiResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(user_id) {
            user.active_device_id = device_id.map(String::from);
        }
        Ok(())
    }

    async fn update_connection(
        &self,
        user_id: &str,
        device_id: &str,
        connection_id: &str,
    ) -> ApiResult<bool> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };
        let Some(device) = user.devices.iter_mut().find(|d| d.device_id == device_id) else {
            return Ok(false);
        };

        device.connection_id = Some(connection_id.to_string());
        device.last_seen_at = Utc::now();
        device.is_active = true;
        Ok(true)
    }

    async fn clear_connection(&self, device_id: &str) -> ApiResult<()> {
        let mut users = self.users.lock().unwrap();
        for user in users.values_mut() {
            if let Some(device) = user.devices.iter_mut().find(|d| d.device_id == device_id) {
                device.connection_id = None;
                device.is_active = false;
                device.last_seen_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn touch_device(&self, device_id: &str, is_active: Option<bool>) -> ApiResult<bool> {
        let mut users = self.users.lock().unwrap();
        for user in users.values_mut() {
            if let Some(device) = user.devices.iter_mut().find(|d| d.device_id == device_id) {
                device.last_seen_at = Utc::now();
                if let Some(flag) = is_active {
                    device.is_active = flag;
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}

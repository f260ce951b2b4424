//! Device store: durable device records per user
//!
//! The record store is the sole owner of device rows and the per-user
//! active-device pointer. Updates are read-modify-write without
//! optimistic or pessimistic locking; concurrent registrations for the
//! same user can race and the last write wins, which is accepted for the
//! small number of devices per user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::{ApiError, ApiResult};
use crate::models::device::{Device, DeviceType};

/// A user's device list plus their active-device pointer
#[derive(Debug, Clone, Default)]
pub struct UserDevices {
    pub devices: Vec<Device>,
    pub active_device_id: Option<String>,
}

impl UserDevices {
    /// Find a device by id
    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    /// The active device record, when the pointer is set and valid
    pub fn active_device(&self) -> Option<&Device> {
        self.active_device_id
            .as_deref()
            .and_then(|id| self.device(id))
    }
}

/// Operations the session core needs from the durable record store
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Load a user's devices and active pointer; `None` if the user does
    /// not exist.
    async fn load_user_devices(&self, user_id: &str) -> ApiResult<Option<UserDevices>>;

    /// Insert a freshly registered device. Fails with `Conflict` if the
    /// device id already exists anywhere (device ids are globally unique).
    async fn insert_device(&self, user_id: &str, device: &Device) -> ApiResult<()>;

    /// Mark every device of the given type inactive for this user
    async fn deactivate_devices_of_type(&self, user_id: &str, device_type: &str) -> ApiResult<()>;

    /// Point the user's active-device selection (or clear it)
    async fn set_active_device(&self, user_id: &str, device_id: Option<&str>) -> ApiResult<()>;

    /// Attach a live connection to a device: sets the connection id,
    /// refreshes last-seen, marks the device active. Returns false (not
    /// an error) when the device row does not exist.
    async fn update_connection(
        &self,
        user_id: &str,
        device_id: &str,
        connection_id: &str,
    ) -> ApiResult<bool>;

    /// Detach whatever connection a device holds: clears the connection
    /// id, marks the device inactive, refreshes last-seen.
    async fn clear_connection(&self, device_id: &str) -> ApiResult<()>;

    /// Refresh a device's last-seen timestamp, optionally forcing the
    /// liveness flag. Returns false when the device row does not exist.
    async fn touch_device(&self, device_id: &str, is_active: Option<bool>) -> ApiResult<bool>;
}

/// Postgres-backed device store
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

/// Raw device row; device_type is validated on the way out
#[derive(Debug, FromRow)]
struct DeviceRow {
    device_id: String,
    device_name: String,
    device_type: String,
    is_active: bool,
    last_seen_at: DateTime<Utc>,
    connection_id: Option<String>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = ApiError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let device_type: DeviceType = row
            .device_type
            .parse()
            .map_err(|_| ApiError::Internal(format!("corrupt device_type: {}", row.device_type)))?;
        Ok(Device {
            device_id: row.device_id,
            device_name: row.device_name,
            device_type,
            is_active: row.is_active,
            last_seen_at: row.last_seen_at,
            connection_id: row.connection_id,
        })
    }
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceStore for DeviceRepository {
    async fn load_user_devices(&self, user_id: &str) -> ApiResult<Option<UserDevices>> {
        let active_device_id: Option<Option<String>> =
            sqlx::query_scalar(r#"SELECT active_device_id FROM users WHERE id = $1"#)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(active_device_id) = active_device_id else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT device_id, device_name, device_type, is_active, last_seen_at, connection_id
            FROM devices
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let devices = rows
            .into_iter()
            .map(Device::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(UserDevices {
            devices,
            active_device_id,
        }))
    }

    async fn insert_device(&self, user_id: &str, device: &Device) -> ApiResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO devices (device_id, user_id, device_name, device_type, is_active, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&device.device_id)
        .bind(user_id)
        .bind(&device.device_name)
        .bind(device.device_type.to_string())
        .bind(device.is_active)
        .bind(device.last_seen_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ApiError::conflict("device", device.device_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn deactivate_devices_of_type(&self, user_id: &str, device_type: &str) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET is_active = FALSE
            WHERE user_id = $1 AND device_type = $2
            "#,
        )
        .bind(user_id)
        .bind(device_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_active_device(&self, user_id: &str, device_id: Option<&str>) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET active_device_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_connection(
        &self,
        user_id: &str,
        device_id: &str,
        connection_id: &str,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET connection_id = $3, last_seen_at = NOW(), is_active = TRUE
            WHERE user_id = $1 AND device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_connection(&self, device_id: &str) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET connection_id = NULL, is_active = FALSE, last_seen_at = NOW()
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_device(&self, device_id: &str, is_active: Option<bool>) -> ApiResult<bool> {
        let result = match is_active {
            Some(flag) => {
                sqlx::query(
                    r#"
                    UPDATE devices
                    SET last_seen_at = NOW(), is_active = $2
                    WHERE device_id = $1
                    "#,
                )
                .bind(device_id)
                .bind(flag)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE devices
                    SET last_seen_at = NOW()
                    WHERE device_id = $1
                    "#,
                )
                .bind(device_id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}

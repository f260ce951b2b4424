//! Device HTTP route handlers
//!
//! The REST counterpart of the realtime layer:
//! - `POST /devices/register` - register a new device, returns its id
//! - `GET  /devices` - live device list + active device
//! - `POST /devices/active` - switch the active device
//! - `POST /devices/command` - send a command to the stored active device
//! - `POST /devices/status` - refresh a device's connection/liveness
//!
//! Unlike the socket-level `send_playback_command` event (which targets
//! an explicit device id), the command endpoint always targets the
//! user's stored active device.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;
use crate::middleware::CurrentUser;
use crate::models::device::Device;
use crate::services::DeviceService;

/// Shared state for device route handlers
#[derive(Clone)]
pub struct DevicesState {
    pub devices: DeviceService,
}

impl DevicesState {
    pub fn new(devices: DeviceService) -> Self {
        Self { devices }
    }
}

/// Create the device router
pub fn devices_router(state: DevicesState) -> Router {
    Router::new()
        .route("/", get(list_devices))
        .route("/register", post(register_device))
        .route("/active", post(set_active_device))
        .route("/command", post(send_command))
        .route("/status", post(update_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RegisterDeviceRequest {
    device_name: String,
    device_type: String,
}

#[derive(Debug, Serialize)]
struct RegisterDeviceResponse {
    success: bool,
    device_id: String,
}

async fn register_device(
    State(state): State<DevicesState>,
    user: CurrentUser,
    Json(body): Json<RegisterDeviceRequest>,
) -> ApiResult<Json<RegisterDeviceResponse>> {
    let device_id = state
        .devices
        .register_device(user.id(), &body.device_name, &body.device_type)
        .await?;

    Ok(Json(RegisterDeviceResponse {
        success: true,
        device_id,
    }))
}

#[derive(Debug, Serialize)]
struct DeviceListResponse {
    devices: Vec<Device>,
    active_device: Option<String>,
}

async fn list_devices(
    State(state): State<DevicesState>,
    user: CurrentUser,
) -> ApiResult<Json<DeviceListResponse>> {
    let list = state.devices.list_devices(user.id()).await?;

    Ok(Json(DeviceListResponse {
        devices: list.devices,
        active_device: list.active_device,
    }))
}

#[derive(Debug, Deserialize)]
struct SetActiveDeviceRequest {
    device_id: String,
}

#[derive(Debug, Serialize)]
struct SetActiveDeviceResponse {
    success: bool,
    message: String,
    active_device: String,
}

async fn set_active_device(
    State(state): State<DevicesState>,
    user: CurrentUser,
    Json(body): Json<SetActiveDeviceRequest>,
) -> ApiResult<Json<SetActiveDeviceResponse>> {
    let device_name = state
        .devices
        .set_active_device(user.id(), &body.device_id)
        .await?;

    Ok(Json(SetActiveDeviceResponse {
        success: true,
        message: format!("Switched to {}", device_name),
        active_device: body.device_id,
    }))
}

#[derive(Debug, Deserialize)]
struct SendCommandRequest {
    command: String,
    #[serde(default)]
    data: Value,
    /// Optional id of the device issuing the command
    #[serde(default)]
    from_device: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendCommandResponse {
    success: bool,
    message: String,
}

async fn send_command(
    State(state): State<DevicesState>,
    user: CurrentUser,
    Json(body): Json<SendCommandRequest>,
) -> ApiResult<Json<SendCommandResponse>> {
    let device_name = state
        .devices
        .send_playback_command(user.id(), &body.command, body.data, body.from_device)
        .await?;

    Ok(Json(SendCommandResponse {
        success: true,
        message: format!("Command sent to {}", device_name),
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    device_id: String,
    connection_id: String,
}

#[derive(Debug, Serialize)]
struct UpdateStatusResponse {
    success: bool,
}

async fn update_status(
    State(state): State<DevicesState>,
    user: CurrentUser,
    Json(body): Json<UpdateStatusRequest>,
) -> ApiResult<Json<UpdateStatusResponse>> {
    state
        .devices
        .attach_connection(user.id(), &body.device_id, &body.connection_id)
        .await?;

    Ok(Json(UpdateStatusResponse { success: true }))
}

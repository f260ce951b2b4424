//! Integration tests for the realtime layer: presence lifecycle,
//! playback-state fan-out, and transport-level targeted commands.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use chorus_api::services::DeviceService;
use chorus_api::websocket::connection::{ConnectionDirectory, ConnectionId};
use chorus_api::websocket::messages::{ClientEvent, ServerEvent, SyncPlaybackPayload};
use chorus_api::websocket::{PresenceTracker, SyncHandler};

use common::{attach_connection, drain, InMemoryDeviceStore};

struct Harness {
    directory: ConnectionDirectory,
    presence: PresenceTracker,
    devices: DeviceService,
    store: InMemoryDeviceStore,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryDeviceStore::new();
        let directory = ConnectionDirectory::new();
        let presence = PresenceTracker::new();
        let devices = DeviceService::new(Arc::new(store.clone()), directory.clone());
        Self {
            directory,
            presence,
            devices,
            store,
        }
    }

    fn handler(&self, connection_id: ConnectionId) -> SyncHandler {
        SyncHandler::new(
            connection_id,
            self.directory.clone(),
            self.presence.clone(),
            self.devices.clone(),
        )
    }
}

fn sync_payload(user_id: &str) -> ClientEvent {
    ClientEvent::SyncPlaybackState(SyncPlaybackPayload {
        user_id: user_id.to_string(),
        current_song: Some(serde_json::json!({"id": "song-1", "title": "Aria"})),
        is_playing: true,
        current_time: 73.25,
        queue: vec![serde_json::json!({"id": "song-2"})],
    })
}

#[tokio::test]
async fn connect_sends_snapshot_to_self_and_increment_to_others() {
    let harness = Harness::new();

    let (conn_a, mut rx_a) = attach_connection(&harness.directory);
    harness
        .handler(conn_a)
        .handle(ClientEvent::UserConnected("user-1".into()))
        .await;

    let events = drain(&mut rx_a);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::UsersOnline(online), ServerEvent::Activities(_)]
            if online == &vec!["user-1".to_string()]
    );

    // Second party connects: first party hears one incremental event
    let (conn_b, mut rx_b) = attach_connection(&harness.directory);
    harness
        .handler(conn_b)
        .handle(ClientEvent::UserConnected("user-2".into()))
        .await;

    let events = drain(&mut rx_a);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::UserConnected(user)] if user == "user-2"
    );

    // The new party got the full snapshot including both users
    let events = drain(&mut rx_b);
    match &events[0] {
        ServerEvent::UsersOnline(online) => {
            assert_eq!(online.len(), 2);
            assert!(online.contains(&"user-1".to_string()));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn activity_updates_are_broadcast_globally() {
    let harness = Harness::new();

    let (conn_a, mut rx_a) = attach_connection(&harness.directory);
    let (conn_b, mut rx_b) = attach_connection(&harness.directory);
    harness
        .handler(conn_a)
        .handle(ClientEvent::UserConnected("user-1".into()))
        .await;
    harness
        .handler(conn_b)
        .handle(ClientEvent::UserConnected("user-2".into()))
        .await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    harness
        .handler(conn_a)
        .handle(ClientEvent::UpdateActivity {
            user_id: "user-1".into(),
            activity: "Listening to Aria".into(),
        })
        .await;

    // Presence is social: both parties hear it, including the origin
    for rx in [&mut rx_a, &mut rx_b] {
        let events = drain(rx);
        assert_matches!(
            events.as_slice(),
            [ServerEvent::ActivityUpdated { user_id, activity }]
                if user_id == "user-1" && activity == "Listening to Aria"
        );
    }
}

#[test_log::test(tokio::test)]
async fn presence_survives_single_device_disconnect() {
    let harness = Harness::new();

    // user-1 on two devices, user-2 watching
    let (conn_a, _rx_a) = attach_connection(&harness.directory);
    let (conn_b, _rx_b) = attach_connection(&harness.directory);
    let (conn_w, mut rx_w) = attach_connection(&harness.directory);
    harness
        .handler(conn_a)
        .handle(ClientEvent::UserConnected("user-1".into()))
        .await;
    harness
        .handler(conn_b)
        .handle(ClientEvent::UserConnected("user-1".into()))
        .await;
    harness
        .handler(conn_w)
        .handle(ClientEvent::UserConnected("user-2".into()))
        .await;
    drain(&mut rx_w);

    // First device closes: user-1 still online, no offline broadcast
    harness.handler(conn_a).handle_disconnect().await;
    assert!(harness.presence.is_online("user-1"));
    assert!(drain(&mut rx_w).is_empty());

    // Last device closes: now the offline broadcast goes out
    harness.handler(conn_b).handle_disconnect().await;
    assert!(!harness.presence.is_online("user-1"));
    let events = drain(&mut rx_w);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::UserDisconnected(user)] if user == "user-1"
    );
}

#[tokio::test]
async fn register_device_binds_connection_and_acks() {
    let harness = Harness::new();
    harness.store.add_user("user-1");
    let device_id = harness
        .devices
        .register_device("user-1", "Phone", "mobile")
        .await
        .unwrap();

    let (conn, mut rx) = attach_connection(&harness.directory);
    harness
        .handler(conn)
        .handle(ClientEvent::RegisterDevice {
            device_id: device_id.clone(),
            user_id: "user-1".into(),
        })
        .await;

    let events = drain(&mut rx);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::DeviceRegistered { device_id: d, .. }] if d == &device_id
    );

    assert_eq!(
        harness.directory.connection_for_device(&device_id),
        Some(conn)
    );
    // The store now holds this connection id
    let stored = harness.store.device(&device_id).unwrap();
    assert_eq!(stored.connection_id, Some(conn.to_string()));
}

#[tokio::test]
async fn targeted_command_reaches_only_the_target() {
    let harness = Harness::new();

    let (conn_a, mut rx_a) = attach_connection(&harness.directory);
    let (conn_b, mut rx_b) = attach_connection(&harness.directory);
    harness.directory.bind(conn_a, "user-1", "device-a");
    harness.directory.bind(conn_b, "user-1", "device-b");

    harness
        .handler(conn_a)
        .handle(ClientEvent::SendPlaybackCommand {
            target_device_id: "device-b".into(),
            command: "pause".into(),
            data: serde_json::Value::Null,
        })
        .await;

    let events = drain(&mut rx_b);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::PlaybackCommand { command, from_device, .. }]
            if command == "pause" && from_device.as_deref() == Some("device-a")
    );

    // Sender gets the ack, nothing else
    let events = drain(&mut rx_a);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::CommandSent { target_device_id, command }]
            if target_device_id == "device-b" && command == "pause"
    );
}

#[tokio::test]
async fn targeted_command_to_disconnected_device_errors_back() {
    let harness = Harness::new();

    let (conn_a, mut rx_a) = attach_connection(&harness.directory);
    harness.directory.bind(conn_a, "user-1", "device-a");

    harness
        .handler(conn_a)
        .handle(ClientEvent::SendPlaybackCommand {
            target_device_id: "device-gone".into(),
            command: "pause".into(),
            data: serde_json::Value::Null,
        })
        .await;

    let events = drain(&mut rx_a);
    assert_matches!(events.as_slice(), [ServerEvent::CommandError { .. }]);
}

#[test_log::test(tokio::test)]
async fn sync_fans_out_to_siblings_but_never_the_origin() {
    let harness = Harness::new();

    let (conn_a, mut rx_a) = attach_connection(&harness.directory);
    let (conn_b, mut rx_b) = attach_connection(&harness.directory);
    let (conn_c, mut rx_c) = attach_connection(&harness.directory);
    let (conn_other, mut rx_other) = attach_connection(&harness.directory);
    harness.directory.bind(conn_a, "user-1", "device-a");
    harness.directory.bind(conn_b, "user-1", "device-b");
    harness.directory.bind(conn_c, "user-1", "device-c");
    harness.directory.bind(conn_other, "user-2", "device-x");

    harness.handler(conn_a).handle(sync_payload("user-1")).await;

    for rx in [&mut rx_b, &mut rx_c] {
        let events = drain(rx);
        assert_matches!(
            events.as_slice(),
            [ServerEvent::PlaybackStateSynced(payload)]
                if payload.from_device.as_deref() == Some("device-a")
                    && payload.is_playing
                    && payload.queue.len() == 1
        );
    }

    // Never echoed back to the origin, never leaked to other users
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_other).is_empty());
}

#[tokio::test]
async fn status_update_notifies_siblings_only() {
    let harness = Harness::new();
    harness.store.add_user("user-1");
    let device_id = harness
        .devices
        .register_device("user-1", "Phone", "mobile")
        .await
        .unwrap();

    let (conn_a, mut rx_a) = attach_connection(&harness.directory);
    let (conn_b, mut rx_b) = attach_connection(&harness.directory);
    let (conn_other, mut rx_other) = attach_connection(&harness.directory);
    harness.directory.bind(conn_a, "user-1", &device_id);
    harness.directory.bind(conn_b, "user-1", "device-b");
    harness.directory.bind(conn_other, "user-2", "device-x");

    harness
        .handler(conn_a)
        .handle(ClientEvent::UpdateDeviceStatus {
            device_id: device_id.clone(),
            status: "inactive".into(),
        })
        .await;

    let events = drain(&mut rx_b);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::DeviceStatusUpdated { device_id: d, status, .. }]
            if d == &device_id && status == "inactive"
    );
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_other).is_empty());

    // The store reflects the reported status
    assert!(!harness.store.device(&device_id).unwrap().is_active);
}

#[tokio::test]
async fn discover_devices_returns_live_list() {
    let harness = Harness::new();
    harness.store.add_user("user-1");
    let device_id = harness
        .devices
        .register_device("user-1", "Phone", "mobile")
        .await
        .unwrap();

    let (conn, mut rx) = attach_connection(&harness.directory);
    harness
        .handler(conn)
        .handle(ClientEvent::DiscoverDevices {
            user_id: "user-1".into(),
        })
        .await;

    let events = drain(&mut rx);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::DevicesDiscovered { devices, active_device }]
            if devices.len() == 1
                && devices[0].device_id == device_id
                && active_device.as_deref() == Some(device_id.as_str())
    );
}

#[tokio::test]
async fn discover_devices_for_unknown_user_reports_error() {
    let harness = Harness::new();

    let (conn, mut rx) = attach_connection(&harness.directory);
    harness
        .handler(conn)
        .handle(ClientEvent::DiscoverDevices {
            user_id: "ghost".into(),
        })
        .await;

    let events = drain(&mut rx);
    assert_matches!(events.as_slice(), [ServerEvent::DeviceDiscoveryError { .. }]);
}

#[tokio::test]
async fn disconnect_notifies_sibling_devices() {
    let harness = Harness::new();
    harness.store.add_user("user-1");
    let device_id = harness
        .devices
        .register_device("user-1", "Phone", "mobile")
        .await
        .unwrap();

    let (conn_a, _rx_a) = attach_connection(&harness.directory);
    let (conn_b, mut rx_b) = attach_connection(&harness.directory);
    harness
        .handler(conn_a)
        .handle(ClientEvent::UserConnected("user-1".into()))
        .await;
    harness
        .handler(conn_b)
        .handle(ClientEvent::UserConnected("user-1".into()))
        .await;
    harness
        .handler(conn_a)
        .handle(ClientEvent::RegisterDevice {
            device_id: device_id.clone(),
            user_id: "user-1".into(),
        })
        .await;
    drain(&mut rx_b);

    harness.handler(conn_a).handle_disconnect().await;

    let events = drain(&mut rx_b);
    assert_matches!(
        events.as_slice(),
        [ServerEvent::DeviceDisconnected { device_id: d, .. }] if d == &device_id
    );

    // Store reconciled: connection cleared, device no longer flagged live
    let stored = harness.store.device(&device_id).unwrap();
    assert!(stored.connection_id.is_none());
    assert!(!stored.is_active);
}

#[tokio::test]
async fn command_ack_is_swallowed() {
    let harness = Harness::new();

    let (conn, mut rx) = attach_connection(&harness.directory);
    harness.directory.bind(conn, "user-1", "device-a");

    harness
        .handler(conn)
        .handle(ClientEvent::PlaybackCommandReceived {
            command: "play".into(),
            success: false,
            error: Some("codec error".into()),
        })
        .await;

    // Logged server-side, never reflected back to any connection
    assert!(drain(&mut rx).is_empty());
}

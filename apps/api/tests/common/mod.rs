//! Common test utilities for API integration tests
//!
//! This module provides shared test infrastructure, including the
//! in-memory device store double and connection helpers.

#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use chorus_api::websocket::connection::{ConnectionDirectory, ConnectionId};
use chorus_api::websocket::messages::ServerEvent;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

/// Attach a fake connection to the directory and return its id plus the
/// receiving end of its outbound channel.
pub fn attach_connection(
    directory: &ConnectionDirectory,
) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    directory.attach(connection_id, tx);
    (connection_id, rx)
}

/// Drain every event currently queued for a connection
pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

//! Broadcast engine
//!
//! Encodes an event once and queues it on every member's outbox. Queuing
//! never waits on a socket, so one slow or dead peer cannot hold up the
//! rest. Peers that fail are reported back instead of being removed here,
//! which keeps the registry untouched while its snapshot is in use.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::message::{self, Event};
use crate::registry::Registry;
use crate::types::ConnectionId;

/// Deliver an event to every registered connection
///
/// Returns the ids whose write failed; the caller evicts them.
pub fn broadcast(registry: &Registry, event: &Event) -> Vec<ConnectionId> {
    let line: Arc<str> = match message::encode(event) {
        Ok(line) => line.into(),
        Err(e) => {
            error!("Failed to encode {} event: {}", event.kind(), e);
            return Vec::new();
        }
    };

    let recipients = registry.snapshot();
    debug!("Broadcasting {} to {} members", event.kind(), recipients.len());

    let mut dead = Vec::new();
    for (connection, login) in recipients {
        if let Err(e) = connection.send_line(Arc::clone(&line)) {
            warn!("Dropping {} ({}): {}", login, connection.id, e);
            dead.push(connection.id);
        }
    }
    dead
}

//! Server configuration
//!
//! Channel sizes for the actor and for each connection's outbox, and the
//! longest line a peer may send.

use crate::cli::ServerArgs;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Channel buffer size for server commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Lines a connection may have queued before it counts as lagging
pub const OUTBOX_CAPACITY: usize = 256;

/// Longest accepted line in bytes, terminator excluded
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Runtime settings for `listener::serve`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Buffer between connection handlers and the ChatServer actor
    pub command_buffer: usize,
    /// Per-connection outbox size
    pub outbox_capacity: usize,
    /// Lines longer than this are dropped
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_buffer: CHANNEL_BUFFER_SIZE,
            outbox_capacity: OUTBOX_CAPACITY,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl From<&ServerArgs> for ServerConfig {
    fn from(args: &ServerArgs) -> Self {
        Self {
            command_buffer: args.command_buffer.max(1),
            outbox_capacity: args.outbox_capacity.max(1),
            max_line_length: args.max_line_length.max(1),
        }
    }
}

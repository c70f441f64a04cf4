//! Error types for the chat relay
//!
//! Application-level errors plus the three per-connection failure kinds:
//! decoding a line, writing to a peer, and reading from a peer.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Socket setup, client terminal I/O and encoding failures end up here;
/// per-connection failures have their own types below.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (bind, connect, stdin/stdout)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A line that is not a valid event
///
/// Recoverable: the reader logs it and moves on to the next line.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Invalid JSON, not an object, missing or unknown `event`,
    /// or a missing/mistyped field
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No newline within the line length limit; the line was dropped
    #[error("line exceeds {limit} bytes")]
    TooLong { limit: usize },
}

/// Failure to hand a line to one peer
///
/// `Closed` and `Lagging` mean the peer is dead and gets evicted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The writer task has exited (transport failed or connection closed)
    #[error("connection closed")]
    Closed,

    /// The peer is not draining its outbox
    #[error("outbox full, peer is not reading")]
    Lagging,

    /// The event could not be serialized; nothing was queued
    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// The read side of a connection is finished
#[derive(Debug, Error)]
pub enum EndOfStream {
    /// Peer closed the stream
    #[error("stream closed by peer")]
    Closed,

    /// Transport error while reading
    #[error("read failed: {0}")]
    Failed(#[from] std::io::Error),
}

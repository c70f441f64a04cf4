//! Connection handle and its two I/O halves
//!
//! A `Connection` is the cloneable handle the server keeps for one
//! accepted socket. Writes go through a bounded outbox drained by a single
//! writer task, so lines from concurrent broadcasts never interleave and
//! a peer that stops reading never blocks anyone else.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::MAX_LINE_LENGTH;
use crate::error::{DecodeError, EndOfStream, WriteError};
use crate::message::{self, Event};
use crate::types::ConnectionId;

/// Server-side handle for one connected socket
///
/// Cheap to clone. The registry holds one clone per joined connection;
/// the handler holds another for the connection's lifetime.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Encoded lines waiting for the writer task
    outbox: mpsc::Sender<Arc<str>>,
    /// Set to true to stop the writer task
    shutdown: Arc<watch::Sender<bool>>,
}

/// Receiving end of a connection's outbox, owned by the writer task
#[derive(Debug)]
pub struct Outbox {
    lines: mpsc::Receiver<Arc<str>>,
    shutdown: watch::Receiver<bool>,
}

impl Connection {
    /// Create a connection handle and the outbox its writer task drains
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, Outbox) {
        let (outbox, lines) = mpsc::channel(capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let connection = Self {
            id,
            outbox,
            shutdown: Arc::new(shutdown),
        };
        (
            connection,
            Outbox {
                lines,
                shutdown: shutdown_rx,
            },
        )
    }

    /// Queue an already encoded line without waiting
    ///
    /// Returns an error if the writer is gone or the outbox is full.
    pub fn send_line(&self, line: Arc<str>) -> Result<(), WriteError> {
        self.outbox.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WriteError::Lagging,
            mpsc::error::TrySendError::Closed(_) => WriteError::Closed,
        })
    }

    /// Encode and queue a single event
    pub fn write_event(&self, event: &Event) -> Result<(), WriteError> {
        let line = message::encode(event).map_err(|e| WriteError::Encode(e.to_string()))?;
        self.send_line(line.into())
    }

    /// Stop the writer task, abandoning anything still queued
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Check whether close has been requested
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[cfg(test)]
impl Outbox {
    /// Pop the next queued line, if any
    pub(crate) fn try_recv_line(&mut self) -> Option<Arc<str>> {
        self.lines.try_recv().ok()
    }
}

/// Drain an outbox into the write half of a socket
///
/// Ends when the connection is closed, when every handle is dropped, or
/// on the first write error. Shuts the write half down on the way out.
pub async fn write_lines<W>(id: ConnectionId, mut outbox: Outbox, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            line = outbox.lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            Ok(()) = outbox.shutdown.changed() => break,
        };

        let written = tokio::select! {
            result = write_line(&mut writer, &line) => result,
            Ok(()) = outbox.shutdown.changed() => break,
        };

        if let Err(e) = written {
            warn!("Write to {} failed: {}", id, e);
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", id, e);
    }
    debug!("Writer task ended for {}", id);
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Newline-framed reader over the read half of a socket
///
/// Lines longer than the configured limit are dropped whole and reported
/// as `DecodeError::TooLong`, so a peer that never sends a newline cannot
/// grow the buffer without bound.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_length: usize,
    /// `buf` holds a line already handed out
    consumed: bool,
    /// Skipping the rest of an overlong line
    discarding: bool,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self::with_max_length(inner, MAX_LINE_LENGTH)
    }

    /// Reader that rejects lines longer than `max_length` bytes,
    /// not counting the terminator
    pub fn with_max_length(inner: R, max_length: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            max_length: max_length.max(1),
            consumed: false,
            discarding: false,
        }
    }

    /// Wait for the next complete line
    ///
    /// The returned slice still carries its terminator, unless the peer
    /// closed mid-line, in which case the partial line is returned and the
    /// next call reports `EndOfStream::Closed`. An overlong line yields
    /// `Ok(Err(DecodeError::TooLong))` once it has been skipped.
    ///
    /// Cancel safe: bytes of a line read before cancellation are kept and
    /// completed by the next call.
    pub async fn read_line(&mut self) -> Result<Result<&[u8], DecodeError>, EndOfStream> {
        if self.consumed {
            self.buf.clear();
            self.consumed = false;
        }

        loop {
            if self.discarding {
                self.buf.clear();
            }

            // One spare byte for the terminator
            let room = self.max_length + 1 - self.buf.len();
            let read = (&mut self.inner)
                .take(room as u64)
                .read_until(b'\n', &mut self.buf)
                .await?;
            let terminated = self.buf.last() == Some(&b'\n');

            if self.discarding {
                if terminated || read == 0 {
                    self.buf.clear();
                    self.discarding = false;
                    return Ok(Err(DecodeError::TooLong {
                        limit: self.max_length,
                    }));
                }
                continue;
            }

            if !terminated && self.buf.len() > self.max_length {
                self.discarding = true;
                continue;
            }

            if self.buf.is_empty() {
                return Err(EndOfStream::Closed);
            }
            self.consumed = true;
            return Ok(Ok(&self.buf));
        }
    }

    /// Wait for the next non-blank line and decode it
    ///
    /// The inner error is per line: the caller logs it and reads on.
    pub async fn read_event(&mut self) -> Result<Result<Event, DecodeError>, EndOfStream> {
        loop {
            match self.read_line().await? {
                Ok(line) if message::is_blank(line) => continue,
                Ok(line) => return Ok(message::decode(line)),
                Err(e) => return Ok(Err(e)),
            }
        }
    }
}

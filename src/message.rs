//! Event protocol definitions
//!
//! One JSON object per line, discriminated by the `event` field.
//! The same three kinds travel in both directions: clients send them as
//! commands, the server fans them out as notifications.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{AppError, DecodeError};

/// Line terminators stripped before decoding
const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// A single wire event
///
/// Uses a tagged enum so an unknown or missing `event` value fails to
/// decode instead of falling through to a default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A client claims a login
    Join { login: String },
    /// A chat line. `user` is authoritative only when sent by the server;
    /// clients may omit it and the server ignores whatever they put there.
    Message {
        text: String,
        #[serde(default)]
        user: String,
    },
    /// A client departs
    Leave { login: String },
}

impl Event {
    /// Wire name of this event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Join { .. } => "join",
            Event::Message { .. } => "message",
            Event::Leave { .. } => "leave",
        }
    }
}

/// Encode an event as one newline-terminated JSON line
pub fn encode(event: &Event) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line (terminator optional) into an event
///
/// Works on raw bytes so invalid UTF-8 is a decode failure rather than
/// a read failure.
pub fn decode(line: &[u8]) -> Result<Event, DecodeError> {
    let line = trim_line_ending(line);
    Ok(serde_json::from_slice(line)?)
}

/// Whether a raw line carries nothing but whitespace
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    while let Some((last, rest)) = line.split_last() {
        if !LINE_ENDINGS.contains(&char::from(*last)) {
            break;
        }
        line = rest;
    }
    line
}

/// Encode and write one event, then flush
///
/// Used by the chat client, which owns its write half outright.
pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let line = encode(event)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

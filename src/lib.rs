//! Newline-delimited JSON Chat Relay Library
//!
//! A small TCP chat server built with tokio that rebroadcasts join, message
//! and leave events to every connected client, plus a terminal client.
//!
//! # Features
//! - One JSON object per line, tagged by an `event` field
//! - Join / message / leave fan-out to all joined clients
//! - Server-side sender identity (clients cannot spoof `user`)
//! - Leave notifications for ungraceful disconnects, exactly once
//! - Slow or dead peers are evicted without delaying anyone else
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the client registry
//! - Each connection has a read task that forwards decoded events as
//!   `ServerCommand`s, and a write task draining its own outbox
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_relay::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     serve(listener, ServerConfig::default()).await;
//! }
//! ```

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use connection::{Connection, LineReader};
pub use error::{AppError, DecodeError, EndOfStream, WriteError};
pub use handler::handle_connection;
pub use listener::serve;
pub use message::{decode, encode, Event};
pub use registry::Registry;
pub use server::{ChatServer, ServerCommand};
pub use types::ConnectionId;

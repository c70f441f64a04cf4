use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::config::{CHANNEL_BUFFER_SIZE, DEFAULT_ADDR, MAX_LINE_LENGTH, OUTBOX_CAPACITY};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, relaying events between connected clients.
    Server(ServerArgs),
    /// Connect to a server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub listen: SocketAddr,

    /// Lines queued per connection before a non-reading peer is dropped.
    #[arg(long, default_value_t = OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    /// Commands buffered between connection tasks and the server actor.
    #[arg(long, default_value_t = CHANNEL_BUFFER_SIZE)]
    pub command_buffer: usize,

    /// Longest line in bytes a client may send; longer lines are dropped.
    #[arg(long, default_value_t = MAX_LINE_LENGTH)]
    pub max_line_length: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Login announced when joining the chat.
    #[arg(long)]
    pub login: String,

    /// Address of the server to connect to.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub server: SocketAddr,
}

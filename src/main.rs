//! Chat Relay - Entry Point
//!
//! `server` binds the listener and relays events; `client` joins a server
//! from the terminal.

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::cli::{Cli, Command};
use chat_relay::{client, serve, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    // Logs go to stderr so the client's stdout carries only chat lines
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            // Start TCP listener
            let listener = TcpListener::bind(args.listen).await?;
            info!("Chat relay listening on {}", listener.local_addr()?);

            serve(listener, ServerConfig::from(&args)).await;
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}

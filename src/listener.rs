//! Accept loop
//!
//! Starts the ChatServer actor and spawns one handler task per accepted
//! socket. Per-connection failures are logged and never stop the loop.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::server::ChatServer;

/// Serve chat connections on an already bound listener
///
/// Runs until the task is dropped or aborted.
pub async fn serve(listener: TcpListener, config: ServerConfig) {
    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx).run());

    info!("ChatServer actor started");

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let config = config.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, config).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

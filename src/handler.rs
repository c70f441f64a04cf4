//! TCP connection handler
//!
//! Handles individual client connections: line framing, event decoding,
//! and bidirectional communication with the ChatServer.

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{write_lines, Connection, LineReader, Outbox};
use crate::error::{AppError, EndOfStream};
use crate::server::ServerCommand;
use crate::types::ConnectionId;

/// Handle a new TCP connection
///
/// Splits the socket, runs a read task and a write task, and reports the
/// disconnect to the ChatServer once either side is done.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: ServerConfig,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // Chat lines are small; don't hold them back for coalescing
    stream.set_nodelay(true)?;

    let connection_id = ConnectionId::new();
    info!("Connection {} accepted from {}", connection_id, peer_addr);

    let (read_half, write_half) = stream.into_split();
    let (connection, outbox) = Connection::channel(connection_id, config.outbox_capacity);
    let reader = LineReader::with_max_length(BufReader::new(read_half), config.max_line_length);

    run_connection(reader, write_half, connection, outbox, cmd_tx).await;

    info!("Connection {} closed", connection_id);

    Ok(())
}

/// Run the read and write tasks of one connection until it is finished
async fn run_connection<R, W>(
    reader: LineReader<R>,
    writer: W,
    connection: Connection,
    outbox: Outbox,
    cmd_tx: mpsc::Sender<ServerCommand>,
) where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let connection_id = connection.id;

    // Spawn write task (outbox -> socket)
    let mut write_task = tokio::spawn(write_lines(connection_id, outbox, writer));

    // Spawn read task (socket -> ServerCommand)
    let mut read_task = tokio::spawn(read_events(reader, connection.clone(), cmd_tx.clone()));

    // Wait for either task to complete
    let writer_done = tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", connection_id);
            false
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", connection_id);
            // Writer gone: nothing more can reach this peer
            read_task.abort();
            true
        }
    };

    // Queued after every command the read task submitted
    if cmd_tx
        .send(ServerCommand::Disconnect { connection_id })
        .await
        .is_err()
    {
        debug!("Server closed before disconnect of {}", connection_id);
    }

    connection.close();
    if !writer_done {
        if let Err(e) = write_task.await {
            warn!("Write task for {} failed: {}", connection_id, e);
        }
    }
}

/// Read lines until end of stream or leave, forwarding each decoded event
///
/// Decode failures are logged and skipped; they never end the connection.
async fn read_events<R>(
    mut reader: LineReader<R>,
    connection: Connection,
    cmd_tx: mpsc::Sender<ServerCommand>,
) where
    R: AsyncBufRead + Unpin,
{
    let connection_id = connection.id;
    // A join went out, so the server will act on a later leave
    let mut joined = false;

    loop {
        let event = match reader.read_event().await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!("Invalid event from {}: {}", connection_id, e);
                continue;
            }
            Err(EndOfStream::Closed) => {
                debug!("Connection {} reached end of stream", connection_id);
                break;
            }
            Err(EndOfStream::Failed(e)) => {
                warn!("Read error on {}: {}", connection_id, e);
                break;
            }
        };

        debug!("Received {} from {}", event.kind(), connection_id);
        let cmd = ServerCommand::from_event(&connection, event);
        let leaving = matches!(cmd, ServerCommand::Leave { .. });
        joined |= matches!(cmd, ServerCommand::Join { .. });
        if cmd_tx.send(cmd).await.is_err() {
            debug!("Server closed, ending read task for {}", connection_id);
            break;
        }
        // Closed is terminal: whatever the peer pipelined after leave is dropped
        if leaving && joined {
            break;
        }
    }

    debug!("Read task ended for {}", connection_id);
}

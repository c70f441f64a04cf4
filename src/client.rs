//! Terminal chat client
//!
//! Connects, announces itself with a join, then multiplexes stdin lines
//! and server notifications until the user quits or the server hangs up.

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::ClientArgs;
use crate::connection::LineReader;
use crate::error::{AppError, EndOfStream};
use crate::message::{write_event, Event};

/// Label shown instead of the user's own login
pub const SELF_LABEL: &str = "you";

/// Run the interactive client until quit, stdin EOF, Ctrl-C or server close
pub async fn run(args: ClientArgs) -> Result<(), AppError> {
    let stream = TcpStream::connect(args.server).await?;
    info!("Connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();

    // Must precede anything else we send
    write_event(
        &mut writer,
        &Event::Join {
            login: args.login.clone(),
        },
    )
    .await?;

    let mut receiver = tokio::spawn(receive_events(
        LineReader::new(BufReader::new(reader)),
        args.login.clone(),
    ));

    let mut stdin = BufReader::new(io::stdin());
    let server_open = run_input_loop(&mut receiver, &mut writer, &mut stdin, &args.login).await?;

    if server_open {
        let leave = Event::Leave {
            login: args.login.clone(),
        };
        if let Err(e) = write_event(&mut writer, &leave).await {
            warn!("Failed to send leave: {}", e);
        }
    }

    if let Err(e) = writer.shutdown().await {
        warn!("Failed to shutdown client writer cleanly: {}", e);
    }
    receiver.abort();

    Ok(())
}

/// Turn stdin lines into message events
///
/// Returns whether the server connection is still usable.
async fn run_input_loop(
    receiver: &mut JoinHandle<Result<(), AppError>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<io::Stdin>,
    login: &str,
) -> Result<bool, AppError> {
    let mut input = String::new();

    loop {
        input.clear();
        tokio::select! {
            received = &mut *receiver => {
                match received {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Receive loop failed: {}", e),
                    Err(e) => warn!("Receive task panicked: {}", e),
                }
                return Ok(false);
            }
            bytes_read = stdin.read_line(&mut input) => {
                if bytes_read? == 0 {
                    return Ok(true);
                }
                let text = input.trim_end_matches(['\r', '\n']);
                if is_quit(text) {
                    return Ok(true);
                }
                if text.trim().is_empty() {
                    continue;
                }
                let event = Event::Message {
                    text: text.to_string(),
                    user: login.to_string(),
                };
                write_event(writer, &event).await?;
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(e) = ctrl_c {
                    warn!("Ctrl-C handler failed: {}", e);
                }
                return Ok(true);
            }
        }
    }
}

/// Print incoming events until the server closes the stream
async fn receive_events(
    mut reader: LineReader<BufReader<OwnedReadHalf>>,
    login: String,
) -> Result<(), AppError> {
    loop {
        match reader.read_event().await {
            Ok(Ok(event)) => write_stdout(&render(&event, &login)).await?,
            Ok(Err(e)) => warn!("Skipping undecodable line: {}", e),
            Err(EndOfStream::Closed) => break,
            Err(EndOfStream::Failed(e)) => {
                warn!("Connection lost: {}", e);
                break;
            }
        }
    }

    write_stdout("*** server closed the connection").await?;
    Ok(())
}

/// Whether an input line asks to quit
pub fn is_quit(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("/quit")
}

/// Format an incoming event for the terminal
pub fn render(event: &Event, own_login: &str) -> String {
    match event {
        Event::Message { text, user } => {
            let who = if user == own_login { SELF_LABEL } else { user.as_str() };
            format!("{}: {}", who, text)
        }
        Event::Join { login } => format!("*** {} joined", login),
        Event::Leave { login } => format!("*** {} left", login),
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_message_from_peer() {
        let event = Event::Message {
            text: "hi".to_string(),
            user: "alice".to_string(),
        };
        assert_eq!(render(&event, "bob"), "alice: hi");
    }

    #[test]
    fn test_render_own_message() {
        let event = Event::Message {
            text: "hi".to_string(),
            user: "bob".to_string(),
        };
        assert_eq!(render(&event, "bob"), "you: hi");
    }

    #[test]
    fn test_render_presence() {
        let join = Event::Join {
            login: "carol".to_string(),
        };
        let leave = Event::Leave {
            login: "carol".to_string(),
        };
        assert_eq!(render(&join, "bob"), "*** carol joined");
        assert_eq!(render(&leave, "bob"), "*** carol left");
    }

    #[test]
    fn test_is_quit() {
        assert!(is_quit("quit"));
        assert!(is_quit("QUIT "));
        assert!(is_quit("/quit"));
        assert!(!is_quit("quitting"));
        assert!(!is_quit(""));
    }
}

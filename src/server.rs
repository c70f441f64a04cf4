//! ChatServer Actor implementation
//!
//! The central actor that owns the registry and drives every broadcast.
//! Connection handlers never touch shared state directly; they send
//! `ServerCommand`s here and this task applies them one at a time.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::connection::Connection;
use crate::message::Event;
use crate::registry::Registry;
use crate::types::ConnectionId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Client claimed a login
    Join {
        connection: Connection,
        login: String,
    },
    /// Client sent a chat line
    Message {
        connection_id: ConnectionId,
        text: String,
    },
    /// Client asked to leave
    Leave {
        connection_id: ConnectionId,
    },
    /// Read side ended (EOF or transport error)
    Disconnect {
        connection_id: ConnectionId,
    },
}

impl ServerCommand {
    /// Turn a decoded client event into a command for this connection
    ///
    /// The client-supplied `user` on messages and `login` on leaves are
    /// dropped here; the registry is the only source of identity.
    pub fn from_event(connection: &Connection, event: Event) -> Self {
        match event {
            Event::Join { login } => ServerCommand::Join {
                connection: connection.clone(),
                login,
            },
            Event::Message { text, .. } => ServerCommand::Message {
                connection_id: connection.id,
                text,
            },
            Event::Leave { .. } => ServerCommand::Leave {
                connection_id: connection.id,
            },
        }
    }
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Joined connections: ConnectionId -> login
    registry: Registry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join { connection, login } => {
                self.handle_join(connection, login);
            }
            ServerCommand::Message {
                connection_id,
                text,
            } => {
                self.handle_message(connection_id, text);
            }
            ServerCommand::Leave { connection_id } => {
                self.handle_leave(connection_id);
            }
            ServerCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
        }
    }

    /// Connected -> Active
    fn handle_join(&mut self, connection: Connection, login: String) {
        // Left or evicted while this join was queued
        if connection.is_closed() {
            warn!("Join as '{}' from closed connection {}, ignoring", login, connection.id);
            return;
        }

        if let Some(current) = self.registry.login_of(connection.id) {
            warn!(
                "Connection {} already joined as '{}', ignoring join as '{}'",
                connection.id, current, login
            );
            return;
        }

        info!("Connection {} joined as '{}'", connection.id, login);
        self.registry.register(connection, login.clone());
        debug!("Total members: {}", self.registry.len());

        self.fan_out(Event::Join { login });
    }

    /// Active -> Active
    fn handle_message(&mut self, connection_id: ConnectionId, text: String) {
        let Some(login) = self.registry.login_of(connection_id) else {
            warn!("Message from {} before join, ignoring", connection_id);
            return;
        };

        debug!("Message from '{}': {}", login, text);
        let user = login.to_string();
        self.fan_out(Event::Message { text, user });
    }

    /// Active -> Closed
    fn handle_leave(&mut self, connection_id: ConnectionId) {
        let Some(member) = self.registry.unregister(connection_id) else {
            warn!("Leave from {} before join, ignoring", connection_id);
            return;
        };

        info!("'{}' left ({})", member.login, connection_id);
        member.connection.close();
        self.fan_out(Event::Leave {
            login: member.login,
        });
    }

    /// any -> Closed
    ///
    /// Only announces a leave if the connection was still registered, so an
    /// explicit leave followed by stream close produces one notification.
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(member) = self.registry.unregister(connection_id) else {
            debug!("Connection {} closed without an active membership", connection_id);
            return;
        };

        info!("'{}' disconnected ({})", member.login, connection_id);
        member.connection.close();
        self.fan_out(Event::Leave {
            login: member.login,
        });
    }

    /// Broadcast an event, then evict every peer the broadcast found dead
    ///
    /// Each eviction is announced with its own leave, which may in turn
    /// uncover more dead peers; the queue drains once a pass succeeds.
    fn fan_out(&mut self, event: Event) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            for connection_id in broadcast(&self.registry, &event) {
                let Some(member) = self.registry.unregister(connection_id) else {
                    continue;
                };
                warn!("Evicted '{}' ({})", member.login, connection_id);
                member.connection.close();
                pending.push_back(Event::Leave {
                    login: member.login,
                });
            }
        }
    }

    /// Number of joined connections
    pub fn member_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbox;
    use crate::message;

    fn server() -> ChatServer {
        let (_tx, rx) = mpsc::channel(8);
        ChatServer::new(rx)
    }

    fn peer(capacity: usize) -> (Connection, Outbox) {
        Connection::channel(ConnectionId::new(), capacity)
    }

    fn join(server: &mut ChatServer, connection: &Connection, login: &str) {
        server.handle_command(ServerCommand::Join {
            connection: connection.clone(),
            login: login.to_string(),
        });
    }

    fn drain(outbox: &mut Outbox) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(line) = outbox.try_recv_line() {
            events.push(message::decode(line.as_bytes()).unwrap());
        }
        events
    }

    fn leave(login: &str) -> Event {
        Event::Leave {
            login: login.to_string(),
        }
    }

    #[test]
    fn test_join_is_broadcast_to_everyone_including_joiner() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (bob, mut bob_out) = peer(8);

        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");

        let alice_join = Event::Join {
            login: "alice".to_string(),
        };
        let bob_join = Event::Join {
            login: "bob".to_string(),
        };
        assert_eq!(drain(&mut alice_out), [alice_join, bob_join.clone()]);
        assert_eq!(drain(&mut bob_out), [bob_join]);
        assert_eq!(server.member_count(), 2);
    }

    #[test]
    fn test_message_uses_registered_login() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (bob, mut bob_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        drain(&mut alice_out);
        drain(&mut bob_out);

        let forged = Event::Message {
            text: "hi".to_string(),
            user: "mallory".to_string(),
        };
        server.handle_command(ServerCommand::from_event(&alice, forged));

        let expected = Event::Message {
            text: "hi".to_string(),
            user: "alice".to_string(),
        };
        assert_eq!(drain(&mut bob_out), [expected.clone()]);
        assert_eq!(drain(&mut alice_out), [expected]);
    }

    #[test]
    fn test_message_before_join_is_ignored() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (stranger, _stranger_out) = peer(8);
        join(&mut server, &alice, "alice");
        drain(&mut alice_out);

        server.handle_command(ServerCommand::Message {
            connection_id: stranger.id,
            text: "sneaky".to_string(),
        });

        assert!(drain(&mut alice_out).is_empty());
        assert_eq!(server.member_count(), 1);
    }

    #[test]
    fn test_second_join_is_ignored() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &alice, "queen");

        assert_eq!(
            drain(&mut alice_out),
            [Event::Join {
                login: "alice".to_string()
            }]
        );
        assert_eq!(server.registry.login_of(alice.id), Some("alice"));
    }

    #[test]
    fn test_leave_uses_registered_login_and_closes() {
        let mut server = server();
        let (alice, _alice_out) = peer(8);
        let (bob, mut bob_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        drain(&mut bob_out);

        let spoofed = Event::Leave {
            login: "bob".to_string(),
        };
        server.handle_command(ServerCommand::from_event(&alice, spoofed));

        assert_eq!(drain(&mut bob_out), [leave("alice")]);
        assert!(alice.is_closed());
        assert!(!bob.is_closed());
    }

    #[test]
    fn test_leave_then_disconnect_announces_once() {
        let mut server = server();
        let (alice, _alice_out) = peer(8);
        let (bob, mut bob_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        drain(&mut bob_out);

        server.handle_command(ServerCommand::Leave {
            connection_id: alice.id,
        });
        server.handle_command(ServerCommand::Disconnect {
            connection_id: alice.id,
        });

        assert_eq!(drain(&mut bob_out), [leave("alice")]);
        assert_eq!(server.member_count(), 1);
    }

    #[test]
    fn test_disconnect_before_join_is_silent() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (lurker, _lurker_out) = peer(8);
        join(&mut server, &alice, "alice");
        drain(&mut alice_out);

        server.handle_command(ServerCommand::Disconnect {
            connection_id: lurker.id,
        });

        assert!(drain(&mut alice_out).is_empty());
    }

    #[test]
    fn test_dead_peer_is_evicted_and_announced() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (bob, bob_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        drain(&mut alice_out);
        drop(bob_out);

        server.handle_command(ServerCommand::Message {
            connection_id: alice.id,
            text: "anyone?".to_string(),
        });

        assert_eq!(
            drain(&mut alice_out),
            [
                Event::Message {
                    text: "anyone?".to_string(),
                    user: "alice".to_string(),
                },
                leave("bob"),
            ]
        );
        assert!(bob.is_closed());
        assert_eq!(server.member_count(), 1);

        // A later disconnect from the evicted peer stays silent
        server.handle_command(ServerCommand::Disconnect {
            connection_id: bob.id,
        });
        assert!(drain(&mut alice_out).is_empty());
    }

    #[test]
    fn test_lagging_peer_is_evicted() {
        let mut server = server();
        let (alice, mut alice_out) = peer(16);
        // Space for its own join only
        let (bob, _bob_out) = peer(1);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");

        server.handle_command(ServerCommand::Message {
            connection_id: alice.id,
            text: "flood".to_string(),
        });

        let events = drain(&mut alice_out);
        assert_eq!(events.last(), Some(&leave("bob")));
        assert!(bob.is_closed());
        assert_eq!(server.member_count(), 1);
    }

    #[test]
    fn test_join_after_leave_is_ignored() {
        let mut server = server();
        let (alice, _alice_out) = peer(8);
        let (bob, mut bob_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        drain(&mut bob_out);

        server.handle_command(ServerCommand::Leave {
            connection_id: alice.id,
        });
        join(&mut server, &alice, "ghost");
        server.handle_command(ServerCommand::Message {
            connection_id: alice.id,
            text: "boo".to_string(),
        });

        assert_eq!(drain(&mut bob_out), [leave("alice")]);
        assert_eq!(server.member_count(), 1);
        assert!(server.registry.login_of(alice.id).is_none());
    }

    #[test]
    fn test_queued_join_from_evicted_peer_is_ignored() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (bob, bob_out) = peer(8);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        drain(&mut alice_out);
        drop(bob_out);

        server.handle_command(ServerCommand::Message {
            connection_id: alice.id,
            text: "ping".to_string(),
        });
        drain(&mut alice_out);
        assert!(bob.is_closed());

        join(&mut server, &bob, "bob-again");

        assert!(drain(&mut alice_out).is_empty());
        assert_eq!(server.member_count(), 1);
    }

    #[test]
    fn test_leave_before_join_keeps_connection_usable() {
        let mut server = server();
        let (alice, mut alice_out) = peer(8);
        let (eager, mut eager_out) = peer(8);
        join(&mut server, &alice, "alice");
        drain(&mut alice_out);

        server.handle_command(ServerCommand::Leave {
            connection_id: eager.id,
        });
        assert!(drain(&mut alice_out).is_empty());
        assert!(!eager.is_closed());

        join(&mut server, &eager, "eager");
        server.handle_command(ServerCommand::Message {
            connection_id: eager.id,
            text: "made it".to_string(),
        });

        let expected = [
            Event::Join {
                login: "eager".to_string(),
            },
            Event::Message {
                text: "made it".to_string(),
                user: "eager".to_string(),
            },
        ];
        assert_eq!(drain(&mut alice_out), expected);
        assert_eq!(drain(&mut eager_out), expected);
    }
}

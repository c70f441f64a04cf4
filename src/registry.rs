//! Client registry
//!
//! Maps each joined connection to the login it claimed. Owned by the
//! `ChatServer` actor, so every operation here is atomic with respect to
//! the others without any locking.

use std::collections::HashMap;

use crate::connection::Connection;
use crate::types::ConnectionId;

/// A joined connection and its login
#[derive(Debug, Clone)]
pub struct Member {
    /// Handle used to reach this member
    pub connection: Connection,
    /// Login recorded at join time
    pub login: String,
}

/// Registry of joined connections
#[derive(Debug, Default)]
pub struct Registry {
    members: HashMap<ConnectionId, Member>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the login for a connection
    ///
    /// Returns the previous member, if the connection was already joined.
    pub fn register(&mut self, connection: Connection, login: String) -> Option<Member> {
        self.members
            .insert(connection.id, Member { connection, login })
    }

    /// Remove a connection
    ///
    /// Idempotent: a second call for the same id returns None.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Member> {
        self.members.remove(&id)
    }

    /// Point-in-time copy of every member, safe to iterate while the
    /// registry changes
    pub fn snapshot(&self) -> Vec<(Connection, String)> {
        self.members
            .values()
            .map(|m| (m.connection.clone(), m.login.clone()))
            .collect()
    }

    /// Login recorded for a connection, if it has joined
    pub fn login_of(&self, id: ConnectionId) -> Option<&str> {
        self.members.get(&id).map(|m| m.login.as_str())
    }

    /// Number of joined connections
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

//! Session registry: connection lifecycle, player records, and fan-out.
//!
//! The registry owns every connected session and its outbound event handle.
//! Role assignment is by vacancy: the first human without a counterpart
//! becomes the batter, the next the pitcher, and everyone after that watches
//! as a spectator. All mutation happens on the coordinator task, so no
//! locking is needed here.

use log::{debug, info};
use shared::{Position, Role, ServerEvent, SessionId};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Per-session scoreboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub hits: u32,
    pub home_runs: u32,
    pub runs: u32,
    pub strikes: u32,
    pub balls: u32,
}

/// A joined player. Connections that have not sent `Join` yet have an
/// outbound handle but no session record.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub position: Position,
    pub is_pitching: bool,
    pub is_batting: bool,
    pub stats: SessionStats,
}

impl Session {
    fn new(id: SessionId, name: String) -> Self {
        Self {
            id,
            name,
            position: Position::origin(),
            is_pitching: false,
            is_batting: false,
            stats: SessionStats::default(),
        }
    }

    /// The contested role this session holds, if any.
    pub fn role(&self) -> Option<Role> {
        if self.is_pitching {
            Some(Role::Pitcher)
        } else if self.is_batting {
            Some(Role::Batter)
        } else {
            None
        }
    }
}

/// Registry of connections and joined sessions, keyed by session id.
pub struct SessionRegistry {
    connections: HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>,
    sessions: HashMap<SessionId, Session>,
    next_id: SessionId,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            connections: HashMap::new(),
            sessions: HashMap::new(),
            next_id: 1,
            max_sessions,
        }
    }

    /// Whether another connection may be accepted.
    pub fn has_capacity(&self) -> bool {
        self.connections.len() < self.max_sessions
    }

    /// Registers a new connection and returns its assigned id.
    pub fn connect(&mut self, tx: mpsc::UnboundedSender<ServerEvent>) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, tx);
        info!("Connection {} registered", id);
        id
    }

    /// Removes a connection, returning the joined session it held, if any.
    pub fn disconnect(&mut self, id: SessionId) -> Option<Session> {
        self.connections.remove(&id);
        let session = self.sessions.remove(&id);
        if let Some(session) = &session {
            info!("Player {} ({}) left", session.id, session.name);
        } else {
            debug!("Connection {} closed before joining", id);
        }
        session
    }

    /// Creates a session for a connected peer and assigns a role by vacancy.
    ///
    /// Returns the assigned role (`None` means spectator), or `None` outer if
    /// the id is unknown or already joined.
    pub fn join(&mut self, id: SessionId, name: String) -> Option<Option<Role>> {
        if !self.connections.contains_key(&id) || self.sessions.contains_key(&id) {
            return None;
        }

        let mut session = Session::new(id, name);
        let role = if !self.has_human(Role::Batter) {
            session.is_batting = true;
            Some(Role::Batter)
        } else if !self.has_human(Role::Pitcher) {
            session.is_pitching = true;
            Some(Role::Pitcher)
        } else {
            None
        };

        info!(
            "Player {} ({}) joined as {}",
            id,
            session.name,
            match role {
                Some(Role::Batter) => "batter",
                Some(Role::Pitcher) => "pitcher",
                None => "spectator",
            }
        );
        self.sessions.insert(id, session);
        Some(role)
    }

    /// True if any joined session currently holds the given role.
    pub fn has_human(&self, role: Role) -> bool {
        self.sessions.values().any(|s| s.role() == Some(role))
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Sets (or clears) a session's role flags, keeping them exclusive.
    ///
    /// A missing session is tolerated: a disconnect may race the role swap,
    /// in which case there is simply no record to update.
    pub fn set_role(&mut self, id: SessionId, role: Option<Role>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.is_pitching = role == Some(Role::Pitcher);
            session.is_batting = role == Some(Role::Batter);
        }
    }

    /// Delivers an event to every connected peer, joined or not.
    pub fn broadcast(&self, event: &ServerEvent) {
        for tx in self.connections.values() {
            // A closed channel means the writer task is gone; the pending
            // disconnect message will clean the entry up.
            let _ = tx.send(event.clone());
        }
    }

    /// Delivers an event to a single peer.
    pub fn send_to(&self, id: SessionId, event: &ServerEvent) {
        if let Some(tx) = self.connections.get(&id) {
            let _ = tx.send(event.clone());
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

//! Connection Registry
//!
//! Live sockets of one session with their declared role and team, and
//! best-effort fan-out to them. Owned by the session actor, so no locking.
//!
//! Each socket is represented by the sending half of its outbound queue;
//! a writer task on the other end serializes frames onto the WebSocket.

use std::collections::BTreeMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::state::Team;
use crate::network::protocol::{
    Role, ServerMessage, REPLACED_CLOSE_CODE, REPLACED_CLOSE_REASON, REPLACED_NOTICE,
};

/// Process-unique connection identifier.
pub type ConnectionId = u64;

/// Frame queued for a socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON message.
    Message(ServerMessage),
    /// Close the socket with a code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Sending half of a socket's outbound queue.
pub type OutboundSender = mpsc::Sender<Outbound>;

/// Metadata for one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionMeta {
    /// Declared role. Sockets count as host until they JOIN.
    pub role: Role,
    /// Declared team.
    pub team: Option<Team>,
}

impl Default for ConnectionMeta {
    fn default() -> Self {
        Self {
            role: Role::Host,
            team: None,
        }
    }
}

struct Connection {
    sender: OutboundSender,
    meta: ConnectionMeta,
}

/// Sockets attached to one session.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new socket.
    pub fn register(&mut self, id: ConnectionId, sender: OutboundSender) {
        self.connections.insert(
            id,
            Connection {
                sender,
                meta: ConnectionMeta::default(),
            },
        );
    }

    /// Forget a socket after its transport closed.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    /// Whether a socket is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Record a JOIN.
    ///
    /// A buzzer joining for a team replaces any other buzzer of that team:
    /// the old socket gets the replacement notice and a 4001 close, and is
    /// dropped from the registry. Returns the replaced connection ids.
    pub fn join(&mut self, id: ConnectionId, role: Role, team: Option<Team>) -> Vec<ConnectionId> {
        if !self.connections.contains_key(&id) {
            return Vec::new();
        }

        let mut replaced = Vec::new();
        if let (Role::Buzzer, Some(team)) = (role, team) {
            replaced = self
                .connections
                .iter()
                .filter(|(peer, conn)| {
                    **peer != id && conn.meta.role == Role::Buzzer && conn.meta.team == Some(team)
                })
                .map(|(peer, _)| *peer)
                .collect();

            for peer in &replaced {
                if let Some(conn) = self.connections.remove(peer) {
                    warn!(connection = peer, %team, "buzzer replaced by newer device");
                    Self::evict(*peer, conn.sender);
                }
            }
        }

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.meta = ConnectionMeta { role, team };
        }
        replaced
    }

    /// Queue the replacement notice and close frame for a dropped socket.
    ///
    /// Frames that do not fit in a full queue are sent from a task that
    /// waits for the writer to drain, so the close is never lost.
    fn evict(id: ConnectionId, sender: OutboundSender) {
        let mut frames = vec![
            Outbound::Message(ServerMessage::error(REPLACED_NOTICE)),
            Outbound::Close {
                code: REPLACED_CLOSE_CODE,
                reason: REPLACED_CLOSE_REASON.to_string(),
            },
        ]
        .into_iter();

        while let Some(frame) = frames.next() {
            match sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    debug!(connection = id, "outbound queue full, close deferred");
                    let rest: Vec<Outbound> = std::iter::once(frame).chain(frames).collect();
                    tokio::spawn(async move {
                        for frame in rest {
                            if sender.send(frame).await.is_err() {
                                break;
                            }
                        }
                    });
                    return;
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }

    /// Queue a message for one socket. False if it could not be queued.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(&id) {
            Some(conn) => Self::deliver(id, conn, Outbound::Message(message)),
            None => false,
        }
    }

    /// Queue a message for every socket.
    ///
    /// A full or closed queue only loses this message for that socket.
    /// Returns how many sockets accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        self.connections
            .iter()
            .filter(|(id, conn)| Self::deliver(**id, conn, Outbound::Message(message.clone())))
            .count()
    }

    fn deliver(id: ConnectionId, conn: &Connection, frame: Outbound) -> bool {
        match conn.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(connection = id, "outbound queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = id, "outbound queue closed");
                false
            }
        }
    }

    /// Metadata for a socket.
    pub fn meta(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.connections.get(&id).map(|c| c.meta)
    }

    /// Registered socket count.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no sockets are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn socket(registry: &mut ConnectionRegistry, id: ConnectionId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(8);
        registry.register(id, tx);
        rx
    }

    #[test]
    fn test_unjoined_socket_is_host() {
        let mut registry = ConnectionRegistry::new();
        let _rx = socket(&mut registry, 1);
        assert_eq!(registry.meta(1), Some(ConnectionMeta { role: Role::Host, team: None }));
    }

    #[test]
    fn test_buzzer_join_replaces_same_team() {
        let mut registry = ConnectionRegistry::new();
        let mut old = socket(&mut registry, 1);
        let _new = socket(&mut registry, 2);
        let _other_team = socket(&mut registry, 3);

        registry.join(1, Role::Buzzer, Some(Team::Green));
        registry.join(3, Role::Buzzer, Some(Team::Red));
        let replaced = registry.join(2, Role::Buzzer, Some(Team::Green));

        assert_eq!(replaced, vec![1]);
        assert_eq!(registry.len(), 2);
        assert!(registry.meta(3).is_some());

        assert_eq!(
            old.try_recv().unwrap(),
            Outbound::Message(ServerMessage::error(REPLACED_NOTICE))
        );
        assert_eq!(
            old.try_recv().unwrap(),
            Outbound::Close { code: 4001, reason: "Replaced by newer device".into() }
        );
    }

    #[tokio::test]
    async fn test_replaced_socket_with_full_queue_still_closed() {
        let mut registry = ConnectionRegistry::new();
        let (old_tx, mut old) = mpsc::channel(1);
        registry.register(1, old_tx);
        let _new = socket(&mut registry, 2);

        registry.join(1, Role::Buzzer, Some(Team::Red));
        registry.broadcast(&ServerMessage::BuzzReset);
        registry.join(2, Role::Buzzer, Some(Team::Red));
        assert!(!registry.contains(1));

        assert_eq!(old.recv().await, Some(Outbound::Message(ServerMessage::BuzzReset)));
        assert_eq!(
            old.recv().await,
            Some(Outbound::Message(ServerMessage::error(REPLACED_NOTICE)))
        );
        assert!(matches!(old.recv().await, Some(Outbound::Close { code: 4001, .. })));
    }

    #[test]
    fn test_host_join_replaces_nobody() {
        let mut registry = ConnectionRegistry::new();
        let _a = socket(&mut registry, 1);
        let _b = socket(&mut registry, 2);
        registry.join(1, Role::Host, None);
        assert!(registry.join(2, Role::Host, None).is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_broadcast_survives_dead_socket() {
        let mut registry = ConnectionRegistry::new();
        let mut a = socket(&mut registry, 1);
        let dead = socket(&mut registry, 2);
        let mut c = socket(&mut registry, 3);
        drop(dead);

        let delivered = registry.broadcast(&ServerMessage::BuzzReset);

        assert_eq!(delivered, 2);
        assert_eq!(a.try_recv().unwrap(), Outbound::Message(ServerMessage::BuzzReset));
        assert_eq!(c.try_recv().unwrap(), Outbound::Message(ServerMessage::BuzzReset));
        // Dead sockets stay until their transport reports the disconnect
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_broadcast_survives_full_queue() {
        let mut registry = ConnectionRegistry::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        registry.register(1, slow_tx);
        let mut fast = socket(&mut registry, 2);

        registry.broadcast(&ServerMessage::BuzzReset);
        let delivered = registry.broadcast(&ServerMessage::error("x"));

        assert_eq!(delivered, 1);
        assert_eq!(fast.try_recv().unwrap(), Outbound::Message(ServerMessage::BuzzReset));
        assert_eq!(fast.try_recv().unwrap(), Outbound::Message(ServerMessage::error("x")));
    }

    #[test]
    fn test_send_to_unknown() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to(9, ServerMessage::BuzzReset));
    }
}

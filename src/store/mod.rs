//! Snapshot Persistence
//!
//! Durable storage for one [`SessionState`] per session id. The session
//! actor writes a snapshot synchronously after every mutation, before
//! broadcasting, and the session manager reads it back to restore evicted
//! sessions.
//!
//! Snapshots are the same camelCase JSON the clients see, so older
//! snapshots load through the serde defaults on [`SessionState`].

pub mod file;
pub mod memory;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

use crate::game::state::SessionState;

/// Snapshot storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Session id cannot be used as a storage key.
    #[error("invalid session id: {0:?}")]
    InvalidId(String),
}

/// Keyed snapshot storage.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot for `state.session_id`.
    fn save(&self, state: &SessionState) -> Result<(), StoreError>;

    /// Latest snapshot for a session, if any.
    fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;
}

/// Session ids double as file names, so only URL-safe characters pass.
pub fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= 64
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidId(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("6f1c2d3e-aaaa-4bbb-8ccc-123456789abc").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id(&"x".repeat(65)).is_err());
    }
}

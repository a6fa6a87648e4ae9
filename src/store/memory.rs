//! In-memory snapshot store, used when no data directory is configured.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::game::state::SessionState;
use crate::store::{validate_session_id, SnapshotStore, StoreError};

/// Snapshots kept as JSON text in process memory.
///
/// Storing the encoded form keeps load behaviour identical to the file
/// store, including serde defaults for missing fields.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<String, String>>,
}

impl MemorySnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw JSON for a session, bypassing encoding.
    pub fn insert_raw(&self, session_id: impl Into<String>, json: impl Into<String>) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(session_id.into(), json.into());
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        validate_session_id(&state.session_id)?;
        let json = serde_json::to_string(state)?;
        self.insert_raw(state.session_id.clone(), json);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        match snapshots.get(session_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Cell, Stage, Team};

    #[test]
    fn test_save_overwrites() {
        let store = MemorySnapshotStore::new();
        let mut state = SessionState::new("s1", vec![Cell::new(0, 0, "ا")], 1);
        store.save(&state).unwrap();

        state.current_team_turn = Team::Red;
        state.updated_at = 2;
        store.save(&state).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load("s1").unwrap(), Some(state));
        assert_eq!(store.load("missing").unwrap(), None);
    }

    #[test]
    fn test_legacy_snapshot_gets_defaults() {
        let store = MemorySnapshotStore::new();
        store.insert_raw(
            "old",
            r#"{
                "sessionId": "old",
                "status": "playing",
                "board": [],
                "currentTeamTurn": "red",
                "activeCellId": null,
                "activeQuestion": null,
                "buzzer": {"locked": false, "lockedBy": null},
                "stage": "final",
                "winner": null,
                "updatedAt": 99
            }"#,
        );

        let state = store.load("old").unwrap().unwrap();
        assert!(state.auto_judge);
        assert_eq!(state.match_wins.green, 0);
        assert_eq!(state.match_wins.red, 0);
        assert_eq!(state.attempt_no, 1);
        assert_eq!(state.stage, Stage::Other);
        assert_eq!(state.allowed_buzz_teams, Team::ALL.to_vec());
    }

    #[test]
    fn test_corrupt_snapshot_is_error() {
        let store = MemorySnapshotStore::new();
        store.insert_raw("bad", "{");
        assert!(matches!(store.load("bad"), Err(StoreError::Encoding(_))));
    }
}

//! File snapshot store: one JSON file per session under a data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::game::state::SessionState;
use crate::store::{validate_session_id, SnapshotStore, StoreError};

/// Writes `<dir>/<session_id>.json`, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let path = self.path_for(&state.session_id)?;
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec(state)?;
        fs::write(&tmp, json)?;
        // Readers never observe a half-written snapshot
        fs::rename(&tmp, &path)?;

        debug!(session = %state.session_id, path = %path.display(), "snapshot written");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let path = self.path_for(session_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

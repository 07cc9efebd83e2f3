//! Durable snapshot storage.
//!
//! The whole [`DomainState`] is persisted as one JSON document. Writes go to a
//! temp file in the same directory and are renamed over the target, so a
//! reader never sees a half-written snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::LedgerError;
use crate::state::DomainState;

pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last snapshot. A missing or unreadable file yields the
    /// default empty state; data loss is accepted here, not a fatal error.
    pub fn load(&self) -> DomainState {
        match fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(state) => {
                    info!(path = %self.path.display(), "Loaded snapshot");
                    state
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Corrupt snapshot, starting empty");
                    DomainState::default()
                }
            },
            Err(_) => {
                info!(path = %self.path.display(), "No snapshot found, starting empty");
                DomainState::default()
            }
        }
    }

    /// Persist a fully-formed snapshot atomically. A failed save means the
    /// in-memory mutation that produced `state` is not durably committed.
    pub fn save(&self, state: &DomainState) -> Result<(), LedgerError> {
        let data = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data.json"));
        let state = store.load();
        assert!(state.users.is_empty());
        assert!(state.codes.is_empty());
        assert!(state.config.admins.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{not json").unwrap();
        let state = Store::new(&path).load();
        assert!(state.users.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("data.json"));

        let mut state = DomainState::default();
        state.account_mut(&"alice".to_string()).balance = dec!(42.50);
        state.config.admins.push("root".to_string());
        store.save(&state).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.users["alice"].balance, dec!(42.50));
        assert_eq!(loaded.config.admins, vec!["root".to_string()]);
    }

    #[test]
    fn test_save_to_unwritable_path_fails() {
        let store = Store::new("/nonexistent-dir/data.json");
        assert!(store.save(&DomainState::default()).is_err());
    }
}

//! Key-value persistence behind a storage port.
//!
//! The engine saves session flags and the transcript snapshot after every
//! mutation and restores them at startup. Storage trouble is logged and
//! swallowed; a broken disk never takes the session down.

use crate::log_debug;
use crate::session::SessionRecord;
use crate::transcript::TranscriptSnapshot;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Key holding the serialized [`SessionRecord`].
pub const SESSION_STATE_KEY: &str = "session-state";
/// Key holding the serialized [`TranscriptSnapshot`].
pub const TRANSCRIPT_KEY: &str = "transcript";

/// Durable string storage keyed by short slugs.
pub trait StoragePort: Send {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

// ============================================================================
// Ports
// ============================================================================

/// One JSON file per key inside a state directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating state dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StoragePort for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key);
        fs::write(&path, value).with_context(|| format!("writing {}", path.display()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }
}

/// In-memory storage for `--no-persist` runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

// ============================================================================
// Session store
// ============================================================================

/// Restored startup state. `transcript` is absent when no snapshot was
/// saved or the saved one no longer parses.
#[derive(Debug)]
pub struct RestoredSession {
    pub record: SessionRecord,
    pub transcript: Option<TranscriptSnapshot>,
}

/// Best-effort persistence wrapper over a storage port.
pub struct SessionStore {
    port: Box<dyn StoragePort>,
}

impl SessionStore {
    pub fn new(port: Box<dyn StoragePort>) -> Self {
        Self { port }
    }

    /// Load whatever previous state survives. A missing or unreadable
    /// session record means a fresh session; a bad transcript snapshot is
    /// dropped on its own.
    pub fn restore(&self) -> Option<RestoredSession> {
        let raw = match self.port.read(SESSION_STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log_debug(&format!("session restore failed: {err:#}"));
                tracing::warn!(error = %err, "session restore failed");
                return None;
            }
        };
        let record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                log_debug(&format!("discarding unparseable session record: {err}"));
                return None;
            }
        };

        let transcript = match self.port.read(TRANSCRIPT_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    log_debug(&format!("discarding unparseable transcript snapshot: {err}"));
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                log_debug(&format!("transcript restore failed: {err:#}"));
                None
            }
        };

        Some(RestoredSession { record, transcript })
    }

    /// Persist both keys. Failures are logged, never surfaced.
    pub fn save(&mut self, record: &SessionRecord, snapshot: &TranscriptSnapshot) {
        if let Err(err) = self.try_save(record, snapshot) {
            log_debug(&format!("session save failed: {err:#}"));
            tracing::warn!(error = %err, "session save failed");
        }
    }

    fn try_save(&mut self, record: &SessionRecord, snapshot: &TranscriptSnapshot) -> Result<()> {
        let record_json = serde_json::to_string(record).context("encoding session record")?;
        self.port.write(SESSION_STATE_KEY, &record_json)?;
        let snapshot_json =
            serde_json::to_string(snapshot).context("encoding transcript snapshot")?;
        self.port.write(TRANSCRIPT_KEY, &snapshot_json)?;
        Ok(())
    }

    /// Drop both keys so the next run starts fresh.
    pub fn clear(&mut self) {
        for key in [SESSION_STATE_KEY, TRANSCRIPT_KEY] {
            if let Err(err) = self.port.remove(key) {
                log_debug(&format!("clearing {key} failed: {err:#}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{TranscriptEntry, TranscriptStore};
    use anyhow::bail;
    use std::env;

    fn temp_store_dir(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("dreamterm-store-{tag}-{}", std::process::id()))
    }

    fn sample_snapshot() -> TranscriptSnapshot {
        let mut store = TranscriptStore::with_greeting("hi");
        store.push(TranscriptEntry::command("status"));
        store.snapshot()
    }

    #[test]
    fn memory_store_round_trips_session() {
        let mut store = SessionStore::new(Box::new(MemoryStore::new()));
        let record = SessionRecord {
            is_initialized: true,
            is_voice_enabled: false,
        };
        store.save(&record, &sample_snapshot());

        let restored = store.restore().unwrap();
        assert_eq!(restored.record, record);
        let transcript = restored.transcript.unwrap();
        assert_eq!(transcript.entries.len(), 2);
    }

    #[test]
    fn restore_without_saved_state_is_none() {
        let store = SessionStore::new(Box::new(MemoryStore::new()));
        assert!(store.restore().is_none());
    }

    #[test]
    fn malformed_session_record_reads_as_fresh() {
        let mut port = MemoryStore::new();
        port.write(SESSION_STATE_KEY, "{not json").unwrap();
        let store = SessionStore::new(Box::new(port));
        assert!(store.restore().is_none());
    }

    #[test]
    fn malformed_transcript_is_dropped_but_record_survives() {
        let mut port = MemoryStore::new();
        port.write(SESSION_STATE_KEY, r#"{"isInitialized":true,"isVoiceEnabled":true}"#)
            .unwrap();
        port.write(TRANSCRIPT_KEY, "][").unwrap();
        let store = SessionStore::new(Box::new(port));
        let restored = store.restore().unwrap();
        assert!(restored.record.is_initialized);
        assert!(restored.transcript.is_none());
    }

    #[test]
    fn clear_removes_both_keys() {
        let mut store = SessionStore::new(Box::new(MemoryStore::new()));
        let record = SessionRecord {
            is_initialized: true,
            is_voice_enabled: true,
        };
        store.save(&record, &sample_snapshot());
        store.clear();
        assert!(store.restore().is_none());
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = temp_store_dir("roundtrip");
        let _ = fs::remove_dir_all(&dir);
        let mut store = SessionStore::new(Box::new(FileStore::new(dir.clone()).unwrap()));
        let record = SessionRecord {
            is_initialized: true,
            is_voice_enabled: true,
        };
        store.save(&record, &sample_snapshot());

        let reopened = SessionStore::new(Box::new(FileStore::new(dir.clone()).unwrap()));
        let restored = reopened.restore().unwrap();
        assert_eq!(restored.record, record);
        assert!(restored.transcript.is_some());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_store_missing_key_reads_none() {
        let dir = temp_store_dir("missing");
        let _ = fs::remove_dir_all(&dir);
        let store = FileStore::new(dir.clone()).unwrap();
        assert!(store.read("never-written").unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    struct FailingStore;

    impl StoragePort for FailingStore {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            bail!("disk on fire")
        }
        fn write(&mut self, _key: &str, _value: &str) -> Result<()> {
            bail!("disk on fire")
        }
        fn remove(&mut self, _key: &str) -> Result<()> {
            bail!("disk on fire")
        }
    }

    #[test]
    fn save_and_restore_swallow_port_failures() {
        let mut store = SessionStore::new(Box::new(FailingStore));
        let record = SessionRecord {
            is_initialized: false,
            is_voice_enabled: false,
        };
        store.save(&record, &sample_snapshot());
        assert!(store.restore().is_none());
        store.clear();
    }
}

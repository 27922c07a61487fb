//! Bounded persistence for finished (or cancelled-partial) reviews.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;
use crate::review::{OutputLanguage, ProviderKind};

/// Hard cap on stored entries; the oldest are evicted first.
pub const MAX_HISTORY_ENTRIES: usize = 50;
/// Entry count at which [`SaveReceipt::near_capacity`] turns on, so a UI can
/// warn before eviction begins.
pub const WARNING_THRESHOLD: usize = 45;

const PREVIEW_CHARS: usize = 100;

/// One persisted review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub code: String,
    /// First 100 characters of the code, for list display.
    pub code_preview: String,
    pub response: String,
    pub provider: ProviderKind,
    pub model: String,
    pub language: OutputLanguage,
}

/// Fields the controller supplies when recording a result.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub code: String,
    pub response: String,
    pub provider: ProviderKind,
    pub model: String,
    pub language: OutputLanguage,
}

/// Outcome of a save, surfaced so the UI can warn near the capacity limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReceipt {
    pub saved_count: usize,
    pub near_capacity: bool,
}

/// Summary counters over the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    pub total: usize,
    pub near_capacity: bool,
    pub remaining: usize,
}

/// Capability the controller uses to persist results.
pub trait HistoryRecorder: Send + Sync {
    fn save(&self, entry: NewHistoryEntry) -> Result<SaveReceipt, ReviewError>;
}

impl HistoryEntry {
    fn from_new(new: NewHistoryEntry) -> Self {
        let code = new.code.trim().to_string();
        let code_preview = preview_of(&code);
        Self {
            id: generate_entry_id(),
            timestamp: Utc::now(),
            code,
            code_preview,
            response: new.response,
            provider: new.provider,
            model: new.model,
            language: new.language,
        }
    }
}

fn generate_entry_id() -> String {
    format!(
        "{}_{:08x}",
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn preview_of(code: &str) -> String {
    let preview: String = code.chars().take(PREVIEW_CHARS).collect();
    if preview.len() < code.len() {
        format!("{preview}...")
    } else {
        preview
    }
}

/// JSON-file-backed history store, newest entries first.
///
/// A missing or unreadable file is treated as an empty history; only writes
/// surface errors.
pub struct JsonHistoryStore {
    path: PathBuf,
    // Serializes read-modify-write cycles between clones of the controller.
    lock: Mutex<()>,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the platform data directory (`<data_dir>/nobicode/history.json`).
    pub fn at_default_path() -> Result<Self, ReviewError> {
        let base = dirs::data_dir()
            .ok_or_else(|| ReviewError::HistoryError("no data directory available".into()))?;
        Ok(Self::new(base.join("nobicode").join("history.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored entries, newest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let _guard = self.lock.lock().expect("history lock poisoned");
        self.read_entries()
    }

    pub fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.entries().into_iter().find(|entry| entry.id == id)
    }

    pub fn delete(&self, id: &str) -> Result<bool, ReviewError> {
        let _guard = self.lock.lock().expect("history lock poisoned");
        let mut entries = self.read_entries();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write_entries(&entries)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), ReviewError> {
        let _guard = self.lock.lock().expect("history lock poisoned");
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|err| ReviewError::HistoryError(err.to_string()))?;
        }
        Ok(())
    }

    pub fn stats(&self) -> HistoryStats {
        let total = self.entries().len();
        HistoryStats {
            total,
            near_capacity: total >= WARNING_THRESHOLD,
            remaining: MAX_HISTORY_ENTRIES.saturating_sub(total),
        }
    }

    fn read_entries(&self) -> Vec<HistoryEntry> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("discarding unreadable history file: {err}");
                Vec::new()
            }
        }
    }

    fn write_entries(&self, entries: &[HistoryEntry]) -> Result<(), ReviewError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ReviewError::HistoryError(err.to_string()))?;
        }
        let json = serde_json::to_string(entries)?;
        std::fs::write(&self.path, json).map_err(|err| ReviewError::HistoryError(err.to_string()))
    }
}

impl HistoryRecorder for JsonHistoryStore {
    fn save(&self, new: NewHistoryEntry) -> Result<SaveReceipt, ReviewError> {
        let _guard = self.lock.lock().expect("history lock poisoned");
        let mut entries = self.read_entries();
        entries.insert(0, HistoryEntry::from_new(new));
        entries.truncate(MAX_HISTORY_ENTRIES);
        self.write_entries(&entries)?;
        Ok(SaveReceipt {
            saved_count: entries.len(),
            near_capacity: entries.len() >= WARNING_THRESHOLD,
        })
    }
}

/// In-memory recorder, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().expect("history lock poisoned").clone()
    }
}

impl HistoryRecorder for MemoryHistory {
    fn save(&self, new: NewHistoryEntry) -> Result<SaveReceipt, ReviewError> {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        entries.insert(0, HistoryEntry::from_new(new));
        entries.truncate(MAX_HISTORY_ENTRIES);
        Ok(SaveReceipt {
            saved_count: entries.len(),
            near_capacity: entries.len() >= WARNING_THRESHOLD,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, JsonHistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));
        (dir, store)
    }

    fn entry(code: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            code: code.to_string(),
            response: format!("review of {code}"),
            provider: ProviderKind::Google,
            model: "gemini-2.0-flash".to_string(),
            language: OutputLanguage::En,
        }
    }

    #[test]
    fn saves_newest_first() {
        let (_dir, store) = store();
        store.save(entry("first")).unwrap();
        store.save(entry("second")).unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, "second");
        assert_eq!(entries[1].code, "first");
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let (_dir, store) = store();
        for i in 0..(MAX_HISTORY_ENTRIES + 3) {
            store.save(entry(&format!("snippet {i}"))).unwrap();
        }

        let entries = store.entries();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(entries[0].code, format!("snippet {}", MAX_HISTORY_ENTRIES + 2));
        assert!(!entries.iter().any(|e| e.code == "snippet 0"));
    }

    #[test]
    fn warns_at_the_threshold() {
        let (_dir, store) = store();
        for i in 0..WARNING_THRESHOLD {
            let receipt = store.save(entry(&format!("s{i}"))).unwrap();
            let expected = i + 1 >= WARNING_THRESHOLD;
            assert_eq!(receipt.near_capacity, expected, "at count {}", i + 1);
        }
    }

    #[test]
    fn delete_and_clear() {
        let (_dir, store) = store();
        store.save(entry("keep")).unwrap();
        store.save(entry("drop")).unwrap();

        let id = store.entries()[0].id.clone();
        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert_eq!(store.entries().len(), 1);

        store.clear().unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn unreadable_file_is_treated_as_empty() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.entries().is_empty());
        // A save still succeeds and replaces the bad file.
        store.save(entry("fresh")).unwrap();
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn long_code_gets_a_truncated_preview() {
        let (_dir, store) = store();
        let long = "x".repeat(250);
        store.save(entry(&long)).unwrap();
        let saved = &store.entries()[0];
        assert_eq!(saved.code_preview.len(), 103); // 100 chars + "..."
        assert!(saved.code_preview.ends_with("..."));
    }
}

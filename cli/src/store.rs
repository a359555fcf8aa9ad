use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use twotone_core::{ToneTableEntry, ToneTableSnapshot, ToneTableSource};

pub const MIN_TONE_HZ: f64 = 20.0;
pub const MAX_TONE_HZ: f64 = 20_000.0;
pub const MAX_LABEL_LEN: usize = 255;
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tone entry with id {0} not found")]
    NotFound(u64),

    #[error("Invalid tone entry: {0}")]
    Invalid(String),

    #[error("Tone table I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tone table file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fields a client supplies when creating or replacing an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewToneEntry {
    pub label: String,
    pub tone1_hz: f64,
    pub tone2_hz: f64,
}

impl NewToneEntry {
    fn validate(&self) -> Result<(), StoreError> {
        let label = self.label.trim();
        if label.is_empty() {
            return Err(StoreError::Invalid("label must not be empty".to_string()));
        }
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(StoreError::Invalid(format!(
                "label must be at most {} characters",
                MAX_LABEL_LEN
            )));
        }
        if label.chars().any(char::is_control) {
            return Err(StoreError::Invalid("label must not contain control characters".to_string()));
        }
        for (name, hz) in [("tone1_hz", self.tone1_hz), ("tone2_hz", self.tone2_hz)] {
            if !(hz.is_finite() && (MIN_TONE_HZ..=MAX_TONE_HZ).contains(&hz)) {
                return Err(StoreError::Invalid(format!(
                    "{} must be within [{}, {}] Hz, got {}",
                    name, MIN_TONE_HZ, MAX_TONE_HZ, hz
                )));
            }
        }
        Ok(())
    }

    fn into_entry(self, id: u64) -> ToneTableEntry {
        ToneTableEntry::new(id, self.label.trim(), self.tone1_hz, self.tone2_hz)
    }
}

/// Table entry as stored and served, with creation and last-change times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneRecord {
    #[serde(flatten)]
    pub entry: ToneTableEntry,
    /// Tables written without timestamps load with the Unix epoch here
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    version: u64,
    next_id: u64,
    entries: BTreeMap<u64, ToneRecord>,
}

/// On-disk layout of the tone table
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u64,
    next_id: u64,
    entries: Vec<ToneRecord>,
}

impl From<StoreFile> for StoreState {
    fn from(file: StoreFile) -> Self {
        let entries: BTreeMap<u64, ToneRecord> = file.entries.into_iter().map(|r| (r.entry.id, r)).collect();
        let max_id = entries.keys().next_back().copied().unwrap_or(0);
        Self {
            version: file.version,
            next_id: file.next_id.max(max_id + 1),
            entries,
        }
    }
}

impl From<&StoreState> for StoreFile {
    fn from(state: &StoreState) -> Self {
        Self {
            version: state.version,
            next_id: state.next_id,
            entries: state.entries.values().cloned().collect(),
        }
    }
}

/// Tone table shared between the decoder and the maintenance API
///
/// Readers take a snapshot and never see a half-applied change. Every
/// mutation bumps the version and, for file-backed stores, is written to
/// disk before it becomes visible.
#[derive(Debug)]
pub struct ToneStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl ToneStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState {
                next_id: 1,
                ..StoreState::default()
            }),
        }
    }

    /// Load the table at `path`; a missing file is an empty table
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&text)?;
            StoreState::from(file)
        } else {
            tracing::info!("tone table {} does not exist yet, starting empty", path.display());
            StoreState {
                next_id: 1,
                ..StoreState::default()
            }
        };
        tracing::debug!(
            "loaded {} tone entries (version {}) from {}",
            state.entries.len(),
            state.version,
            path.display()
        );

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn version(&self) -> u64 {
        self.read().version
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Entries in id order; `limit` of 0 means the default page size
    pub fn list(&self, skip: usize, limit: usize) -> Vec<ToneRecord> {
        let limit = match limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(MAX_LIST_LIMIT),
        };
        self.read().entries.values().skip(skip).take(limit).cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<ToneRecord> {
        self.read().entries.get(&id).cloned()
    }

    pub fn create(&self, new: NewToneEntry) -> Result<ToneRecord, StoreError> {
        new.validate()?;
        self.mutate(|state| {
            let id = state.next_id;
            state.next_id += 1;
            let now = Utc::now();
            let record = ToneRecord {
                entry: new.into_entry(id),
                created_at: now,
                updated_at: now,
            };
            state.entries.insert(id, record.clone());
            Ok(record)
        })
    }

    /// Replace every field of entry `id`; the creation time is kept
    pub fn update(&self, id: u64, new: NewToneEntry) -> Result<ToneRecord, StoreError> {
        new.validate()?;
        self.mutate(|state| {
            let slot = state.entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            slot.entry = new.into_entry(id);
            slot.updated_at = Utc::now();
            Ok(slot.clone())
        })
    }

    pub fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.mutate(|state| state.entries.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id)))
    }

    /// Apply `change` to a copy of the state, persist it, then publish it
    fn mutate<T>(&self, change: impl FnOnce(&mut StoreState) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut state = self.write();
        let mut next = state.clone();
        let out = change(&mut next)?;
        next.version += 1;

        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *state = next;
        Ok(out)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ToneTableSource for ToneStore {
    fn snapshot(&self) -> ToneTableSnapshot {
        let state = self.read();
        ToneTableSnapshot::new(
            state.version,
            state.entries.values().map(|record| record.entry.clone()).collect(),
        )
    }
}

/// Write to a sibling temp file and rename over the target
fn persist(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(&StoreFile::from(state))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    tracing::debug!("wrote tone table version {} to {}", state.version, path.display());
    Ok(())
}

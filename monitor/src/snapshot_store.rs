/* neira:meta
id: NEI-20260913-114500-snapshot-store
intent: feature
summary: Fingerprint map with single-pass diff and JSON persistence.
*/
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Content fingerprint of one monitored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
}

/// Last known fingerprint per path. Keyed by path, so a path never appears twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotStore {
    entries: BTreeMap<String, String>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = FileFingerprint> + '_ {
        self.entries.iter().map(|(path, hash)| FileFingerprint {
            path: path.clone(),
            hash: hash.clone(),
        })
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Replace the whole snapshot with the result of a new scan.
    pub fn replace(&mut self, current: BTreeMap<String, String>) {
        self.entries = current;
    }

    /// Events turning `self` into `current`: one per path that appeared,
    /// disappeared or changed hash.
    pub fn diff(&self, current: &BTreeMap<String, String>) -> Vec<ChangeEvent> {
        diff(&self.entries, current)
    }

    /// Read a persisted snapshot. Missing or corrupt files yield an empty store.
    pub fn load(path: &Path) -> Self {
        Self::read(path).unwrap_or_default()
    }

    /// Like [`SnapshotStore::load`], but `None` when no usable snapshot exists.
    pub fn read(path: &Path) -> Option<Self> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// Persist the snapshot, replacing any previous file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }
}

/// Compare two fingerprint maps in a single pass over each.
pub fn diff(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    for (path, hash) in current {
        match previous.get(path) {
            None => events.push(ChangeEvent {
                kind: ChangeKind::Created,
                path: path.clone(),
            }),
            Some(old) if old != hash => events.push(ChangeEvent {
                kind: ChangeKind::Modified,
                path: path.clone(),
            }),
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !current.contains_key(path) {
            events.push(ChangeEvent {
                kind: ChangeKind::Deleted,
                path: path.clone(),
            });
        }
    }
    events
}

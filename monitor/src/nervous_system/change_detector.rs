/* neira:meta
id: NEI-20261016-140000-change-baseline
intent: bugfix
summary: |
  Baseline only on the first cycle without a persisted snapshot;
  files appearing in an emptied tree are reported as created.
*/
//! Content-hash based change detection over the watched directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::WatchTarget;
use crate::debug_log::{DebugLog, LogLevel};
use crate::error::Result;
use crate::snapshot_store::{ChangeEvent, SnapshotStore};

/// Hash every whitelisted file under the watch roots.
///
/// Keys are paths relative to `base` (or absolute when a file lives outside it).
/// Unreadable entries are skipped; a root that cannot be opened contributes nothing.
pub fn scan(base: &Path, targets: &[WatchTarget]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for target in targets {
        if !target.root.is_dir() {
            debug!(root = %target.root.display(), "watch root unavailable, skipping");
            continue;
        }
        for entry in WalkDir::new(&target.root).into_iter().filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("skipping unreadable entry: {err}");
                None
            }
        }) {
            if !entry.file_type().is_file() {
                continue;
            }
            if !has_extension(entry.path(), &target.extensions) {
                continue;
            }
            let Ok(bytes) = fs::read(entry.path()) else {
                debug!(file = %entry.path().display(), "unreadable file skipped");
                continue;
            };
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let hash = format!("{:x}", hasher.finalize());
            out.insert(relative_key(base, entry.path()), hash);
        }
    }
    out
}

fn has_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Owns the snapshot and turns consecutive scans into change events.
pub struct ChangeDetector {
    base: PathBuf,
    targets: Vec<WatchTarget>,
    snapshot: SnapshotStore,
    snapshot_path: Option<PathBuf>,
    /// Set once a baseline exists, either from a first scan or a persisted snapshot.
    baselined: bool,
    log: DebugLog,
}

impl ChangeDetector {
    pub fn new(base: impl Into<PathBuf>, targets: Vec<WatchTarget>, log: DebugLog) -> Self {
        Self {
            base: base.into(),
            targets,
            snapshot: SnapshotStore::new(),
            snapshot_path: None,
            baselined: false,
            log,
        }
    }

    /// Persist the snapshot at `path` between runs, seeding it from any existing file.
    pub fn with_snapshot_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(stored) = SnapshotStore::read(&path) {
            self.snapshot = stored;
            self.baselined = true;
        }
        self.snapshot_path = Some(path);
        self
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// Run one detection cycle.
    ///
    /// The very first cycle without a persisted snapshot records a baseline
    /// instead of reporting every file as created. Every later cycle diffs
    /// against the previous scan, even when that scan found nothing, and logs
    /// one aggregated record when something changed.
    pub fn detect(&mut self) -> Result<Vec<ChangeEvent>> {
        let current = scan(&self.base, &self.targets);
        let total = current.len();
        if !self.baselined {
            self.baselined = true;
            self.log.record(
                LogLevel::Info,
                "File monitoring baseline established",
                json!({ "total_files": total }),
            );
            self.snapshot.replace(current);
            self.persist()?;
            return Ok(Vec::new());
        }

        let events = self.snapshot.diff(&current);
        self.snapshot.replace(current);
        if !events.is_empty() {
            self.log.record(
                LogLevel::Info,
                "File changes detected",
                json!({ "changes": events, "total_files": total }),
            );
        }
        self.persist()?;
        Ok(events)
    }

    fn persist(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => self.snapshot.save(path),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_store::ChangeKind;
    use tempfile::tempdir;

    fn target(root: &Path, exts: &[&str]) -> WatchTarget {
        WatchTarget {
            root: root.to_path_buf(),
            extensions: exts.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn scan_filters_by_extension_and_keys_relative_paths() {
        let dir = tempdir().unwrap();
        let theme = dir.path().join("theme");
        fs::create_dir_all(theme.join("js")).unwrap();
        fs::write(theme.join("index.php"), "<?php").unwrap();
        fs::write(theme.join("js/app.JS"), "x").unwrap();
        fs::write(theme.join("notes.txt"), "ignored").unwrap();

        let map = scan(dir.path(), &[target(&theme, &["php", "js"])]);
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["theme/index.php", "theme/js/app.JS"]);
    }

    #[test]
    fn missing_root_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.php"), "a").unwrap();
        let map = scan(
            dir.path(),
            &[
                target(&dir.path().join("does-not-exist"), &["php"]),
                target(dir.path(), &["php"]),
            ],
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn detect_logs_only_non_empty_diffs() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.php"), "one").unwrap();
        let log = DebugLog::new(dir.path().join("debug.log"));
        let mut detector = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log.clone());

        assert!(detector.detect().unwrap().is_empty());
        assert_eq!(log.tail(10).len(), 1, "baseline record");

        assert!(detector.detect().unwrap().is_empty());
        assert_eq!(log.tail(10).len(), 1, "no noise on an empty diff");

        fs::write(root.join("a.php"), "two").unwrap();
        fs::write(root.join("b.php"), "new").unwrap();
        let events = detector.detect().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.kind == ChangeKind::Modified));
        assert!(events.iter().any(|e| e.kind == ChangeKind::Created));

        let last = log.tail(1).pop().unwrap();
        assert_eq!(last.context["changes"].as_array().unwrap().len(), 2);
        assert_eq!(last.context["total_files"], 2);
    }

    #[test]
    fn snapshot_file_prevents_rebaseline_after_restart() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.php"), "one").unwrap();
        let snap = dir.path().join("snapshot.json");
        let log = DebugLog::new(dir.path().join("debug.log"));

        let mut first = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log.clone())
            .with_snapshot_file(&snap);
        first.detect().unwrap();

        fs::remove_file(root.join("a.php")).unwrap();
        let mut second = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log)
            .with_snapshot_file(&snap);
        let events = second.detect().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Deleted);
        assert_eq!(events[0].path, "src/a.php");
    }

    #[test]
    fn files_added_to_an_empty_tree_are_created() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        let log = DebugLog::new(dir.path().join("debug.log"));
        let mut detector = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log.clone());

        assert!(detector.detect().unwrap().is_empty());
        fs::write(root.join("new.php"), "<?php").unwrap();
        let events = detector.detect().unwrap();
        assert_eq!(
            events,
            vec![ChangeEvent {
                kind: ChangeKind::Created,
                path: "src/new.php".into()
            }]
        );

        let baselines = log
            .tail(10)
            .iter()
            .filter(|r| r.message == "File monitoring baseline established")
            .count();
        assert_eq!(baselines, 1);
    }

    #[test]
    fn files_recreated_after_everything_was_deleted_are_created() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.php"), "a").unwrap();
        let log = DebugLog::new(dir.path().join("debug.log"));
        let mut detector = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log);

        detector.detect().unwrap();
        fs::remove_file(root.join("a.php")).unwrap();
        let deleted = detector.detect().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].kind, ChangeKind::Deleted);
        assert!(detector.snapshot().is_empty());

        fs::write(root.join("b.php"), "b").unwrap();
        let created = detector.detect().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, ChangeKind::Created);
        assert_eq!(created[0].path, "src/b.php");
    }

    #[test]
    fn empty_persisted_snapshot_still_counts_as_baseline() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        let snap = dir.path().join("snapshot.json");
        SnapshotStore::new().save(&snap).unwrap();
        fs::write(root.join("a.php"), "a").unwrap();

        let log = DebugLog::new(dir.path().join("debug.log"));
        let mut detector = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log)
            .with_snapshot_file(&snap);
        let events = detector.detect().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Created);
    }

    #[test]
    fn snapshot_write_failure_fails_the_cycle() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        fs::create_dir_all(&root).unwrap();
        let log = DebugLog::new(dir.path().join("debug.log"));
        // A directory where the snapshot file should be.
        let mut detector = ChangeDetector::new(dir.path(), vec![target(&root, &["php"])], log)
            .with_snapshot_file(dir.path());
        assert!(detector.detect().is_err());
    }
}

//! Snapshot/undo store
//!
//! A [`Snapshot`] records, for every file a cycle is about to rewrite, the
//! hash of the content before and after the rewrite plus a reverse line diff
//! that rebuilds the before-content from the after-content. Only changed lines
//! are stored.
//!
//! # Restore
//!
//! Restore first checks the snapshot digest, then plans every file before
//! writing any of them:
//! - current content hashes to `before_hash` → already restored, nothing to do
//! - current content hashes to `after_hash` → apply the reverse diff
//! - anything else → [`FileRestore::Drifted`]; that file is left as found
//!
//! Each file is restored on its own, so one drifted file does not hold back
//! the rest. Restoring twice is a no-op the second time.

use crate::error::{LedgerError, Result};
use crate::fsutil::atomic_write;
use crate::types::CycleId;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use remedy_artifact::{ContentHash, LineDiff, Sha256Digest, WorkspacePath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Content of one file around a pending rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCapture {
    pub path: WorkspacePath,
    /// `None` if the file does not exist yet
    pub before: Option<String>,
    pub after: String,
}

/// One file's undo record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: WorkspacePath,
    pub before_hash: Option<ContentHash>,
    pub after_hash: ContentHash,
    /// Rebuilds the before-content from the after-content
    pub undo: LineDiff,
}

/// Pre-mutation capture of a cycle's files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cycle_id: CycleId,
    pub files: Vec<SnapshotEntry>,
    pub sha256: Sha256Digest,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot from before/after captures
    ///
    /// # Errors
    /// Returns error if the entry list cannot be encoded for hashing
    pub fn capture(
        cycle_id: CycleId,
        captures: &[FileCapture],
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let mut files: Vec<SnapshotEntry> = captures
            .iter()
            .map(|c| SnapshotEntry {
                path: c.path.clone(),
                before_hash: c.before.as_deref().map(|b| ContentHash::compute(b.as_bytes())),
                after_hash: ContentHash::compute(c.after.as_bytes()),
                undo: LineDiff::between(&c.after, c.before.as_deref().unwrap_or("")),
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let sha256 = digest_entries(cycle_id, &files)?;
        Ok(Self {
            cycle_id,
            files,
            sha256,
            created_at,
        })
    }

    /// Recompute the digest and compare with the recorded one
    ///
    /// # Errors
    /// Returns [`LedgerError::SnapshotIntegrityMismatch`] on mismatch
    pub fn verify_integrity(&self) -> Result<()> {
        let actual = digest_entries(self.cycle_id, &self.files)?;
        if actual != self.sha256 {
            tracing::error!(
                snapshot = %self.cycle_id,
                expected = %self.sha256,
                actual = %actual,
                "snapshot integrity mismatch"
            );
            return Err(LedgerError::SnapshotIntegrityMismatch {
                id: self.cycle_id,
                expected: self.sha256,
                actual,
            });
        }
        Ok(())
    }

    /// Paths covered by this snapshot
    pub fn paths(&self) -> impl Iterator<Item = &WorkspacePath> {
        self.files.iter().map(|f| &f.path)
    }
}

fn digest_entries(cycle_id: CycleId, files: &[SnapshotEntry]) -> Result<Sha256Digest> {
    let canonical =
        serde_json::to_vec(files).map_err(|e| LedgerError::serde(cycle_id.to_string(), e))?;
    Ok(Sha256Digest::compute(&canonical))
}

/// What restore did to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRestore {
    /// Before-content rebuilt and written
    Restored,
    /// File created by the cycle, removed
    Removed,
    /// File already held its before-content
    AlreadyRestored,
    /// File holds neither its before- nor its after-content; not touched
    Drifted {
        /// Hash found on disk, `None` if the file is gone
        found: Option<ContentHash>,
    },
}

/// Result of restoring one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub snapshot: CycleId,
    pub files: Vec<(WorkspacePath, FileRestore)>,
}

impl RestoreReport {
    /// Number of files actually written or removed
    #[must_use]
    pub fn changed(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, r)| matches!(r, FileRestore::Restored | FileRestore::Removed))
            .count()
    }

    /// Files left alone because someone else changed them
    pub fn drifted(&self) -> impl Iterator<Item = &WorkspacePath> {
        self.files
            .iter()
            .filter(|(_, r)| matches!(r, FileRestore::Drifted { .. }))
            .map(|(path, _)| path)
    }

    /// Every file holds its before-content
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.drifted().next().is_none()
    }

    /// Turn drifted files into [`LedgerError::WorkspaceDrift`]
    ///
    /// # Errors
    /// Returns [`LedgerError::WorkspaceDrift`] naming every drifted file
    pub fn ensure_complete(self) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(LedgerError::WorkspaceDrift {
            snapshot: self.snapshot,
            paths: self.drifted().cloned().collect(),
        })
    }
}

/// Snapshot retention limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_count: 20,
            max_age_days: 30,
        }
    }
}

impl RetentionPolicy {
    /// Ids to prune from `ids` (newest first), never including `keep`
    ///
    /// An age limit reaching past the earliest representable time imposes
    /// no age cutoff.
    #[must_use]
    pub fn select_expired(
        &self,
        ids: &[CycleId],
        keep: CycleId,
        now: DateTime<Utc>,
    ) -> Vec<CycleId> {
        let cutoff = Duration::try_days(i64::from(self.max_age_days))
            .and_then(|age| now.checked_sub_signed(age));
        ids.iter()
            .enumerate()
            .filter(|(rank, id)| {
                let too_old = cutoff.is_some_and(|cutoff| id.created_at() < cutoff);
                **id != keep && (*rank >= self.max_count || too_old)
            })
            .map(|(_, id)| *id)
            .collect()
    }
}

/// Storage for snapshots, keyed by cycle id
///
/// Implementors provide storage only; snapshot creation, restore and
/// retention are shared provided methods.
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot; an existing snapshot with the same id is kept
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be written
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Load a snapshot
    ///
    /// # Errors
    /// Returns [`LedgerError::SnapshotNotFound`] if absent
    fn load(&self, id: CycleId) -> Result<Snapshot>;

    /// Snapshot ids, newest first
    ///
    /// # Errors
    /// Returns error if the store cannot be listed
    fn list(&self) -> Result<Vec<CycleId>>;

    /// Delete a snapshot
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be removed
    fn remove(&self, id: CycleId) -> Result<()>;

    /// Capture `captures` under `cycle_id`, then apply `retention`
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be written; pruning failures are
    /// logged and ignored
    fn snapshot(
        &self,
        cycle_id: CycleId,
        captures: &[FileCapture],
        retention: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<CycleId> {
        let snapshot = Snapshot::capture(cycle_id, captures, now)?;
        self.save(&snapshot)?;
        tracing::info!(
            snapshot = %cycle_id,
            files = snapshot.files.len(),
            sha256 = %snapshot.sha256.short(),
            "snapshot written"
        );

        match self.list() {
            Ok(ids) => {
                for expired in retention.select_expired(&ids, cycle_id, now) {
                    if let Err(err) = self.remove(expired) {
                        tracing::warn!(
                            snapshot = %expired,
                            error = %err,
                            "failed to prune snapshot"
                        );
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to list snapshots for pruning"),
        }
        Ok(cycle_id)
    }

    /// Restore the files of snapshot `id` under `root`
    ///
    /// Drifted files are reported in the [`RestoreReport`], not as errors.
    ///
    /// # Errors
    /// Returns [`LedgerError::SnapshotIntegrityMismatch`] on a corrupt
    /// snapshot, before any file is written
    fn restore(&self, id: CycleId, root: &Path) -> Result<RestoreReport> {
        let snapshot = self.load(id)?;
        restore_snapshot(&snapshot, root)
    }

    /// Restore the newest snapshot
    ///
    /// # Errors
    /// Returns [`LedgerError::NoSnapshots`] if the store is empty
    fn restore_latest(&self, root: &Path) -> Result<RestoreReport> {
        let latest = self.list()?.into_iter().next().ok_or(LedgerError::NoSnapshots)?;
        self.restore(latest, root)
    }
}

enum Planned {
    Write(PathBuf, String),
    Remove(PathBuf),
    Skip,
    Drifted(Option<ContentHash>),
}

/// Restore `snapshot` under `root`
///
/// # Errors
/// See [`SnapshotStore::restore`]
pub fn restore_snapshot(snapshot: &Snapshot, root: &Path) -> Result<RestoreReport> {
    snapshot.verify_integrity()?;

    let mut plan = Vec::with_capacity(snapshot.files.len());
    for entry in &snapshot.files {
        let abs = entry.path.resolve(root);
        let current = match fs::read(&abs) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(LedgerError::io(&abs, e)),
        };
        plan.push(plan_file(snapshot.cycle_id, entry, abs, current.as_deref())?);
    }

    let mut files = Vec::with_capacity(plan.len());
    for (entry, step) in snapshot.files.iter().zip(plan) {
        let outcome = match step {
            Planned::Write(abs, content) => {
                atomic_write(&abs, content.as_bytes())?;
                FileRestore::Restored
            }
            Planned::Remove(abs) => {
                match fs::remove_file(&abs) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(LedgerError::io(&abs, e)),
                }
                FileRestore::Removed
            }
            Planned::Skip => FileRestore::AlreadyRestored,
            Planned::Drifted(found) => {
                tracing::warn!(
                    snapshot = %snapshot.cycle_id,
                    file = %entry.path,
                    expected = %entry.after_hash,
                    found = ?found,
                    "file changed outside the engine; left as found"
                );
                FileRestore::Drifted { found }
            }
        };
        files.push((entry.path.clone(), outcome));
    }

    let report = RestoreReport {
        snapshot: snapshot.cycle_id,
        files,
    };
    tracing::info!(
        snapshot = %snapshot.cycle_id,
        changed = report.changed(),
        drifted = report.drifted().count(),
        "snapshot restored"
    );
    Ok(report)
}

fn plan_file(
    id: CycleId,
    entry: &SnapshotEntry,
    abs: PathBuf,
    current: Option<&[u8]>,
) -> Result<Planned> {
    let current_hash = current.map(ContentHash::compute);
    if current_hash == entry.before_hash {
        return Ok(Planned::Skip);
    }
    if current_hash != Some(entry.after_hash) {
        return Ok(Planned::Drifted(current_hash));
    }
    let Some(before_hash) = entry.before_hash else {
        return Ok(Planned::Remove(abs));
    };
    let Some(after) = current.and_then(|bytes| std::str::from_utf8(bytes).ok()) else {
        return Ok(Planned::Drifted(current_hash));
    };

    let rebuilt = entry.undo.apply(after)?;
    if ContentHash::compute(rebuilt.as_bytes()) != before_hash {
        return Err(LedgerError::UndoMismatch {
            id,
            path: entry.path.clone(),
            reason: "rebuilt content does not match before-hash".to_string(),
        });
    }
    Ok(Planned::Write(abs, rebuilt))
}

/// Snapshots as JSON files in one directory
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, id: CycleId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.file_for(snapshot.cycle_id);
        if path.exists() {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| LedgerError::serde(&path, e))?;
        atomic_write(&path, &bytes)
    }

    fn load(&self, id: CycleId) -> Result<Snapshot> {
        let path = self.file_for(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LedgerError::SnapshotNotFound(id));
            }
            Err(e) => return Err(LedgerError::io(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| LedgerError::serde(&path, e))
    }

    fn list(&self) -> Result<Vec<CycleId>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LedgerError::io(&self.dir, e)),
        };
        let mut ids: Vec<CycleId> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                name.to_str()?.strip_suffix(".json")?.parse().ok()
            })
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn remove(&self, id: CycleId) -> Result<()> {
        let path = self.file_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LedgerError::io(&path, e)),
        }
    }
}

/// In-memory snapshot store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<BTreeMap<CycleId, Snapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored snapshot verbatim (test hook for corruption)
    pub fn overwrite(&self, snapshot: Snapshot) {
        self.inner.lock().insert(snapshot.cycle_id, snapshot);
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        self.inner
            .lock()
            .entry(snapshot.cycle_id)
            .or_insert_with(|| snapshot.clone());
        Ok(())
    }

    fn load(&self, id: CycleId) -> Result<Snapshot> {
        self.inner
            .lock()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::SnapshotNotFound(id))
    }

    fn list(&self) -> Result<Vec<CycleId>> {
        Ok(self.inner.lock().keys().rev().copied().collect())
    }

    fn remove(&self, id: CycleId) -> Result<()> {
        self.inner.lock().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use remedy_artifact::DiffOp;

    fn path(p: &str) -> WorkspacePath {
        WorkspacePath::new(p).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn id_at(days_ago: i64, n: u128) -> CycleId {
        let ms = (now() - Duration::days(days_ago)).timestamp_millis();
        CycleId::from_parts(u64::try_from(ms).unwrap(), n)
    }

    fn write(root: &Path, p: &str, content: &str) {
        let abs = path(p).resolve(root);
        fs::create_dir_all(abs.parent().unwrap()).unwrap();
        fs::write(abs, content).unwrap();
    }

    fn read(root: &Path, p: &str) -> String {
        fs::read_to_string(path(p).resolve(root)).unwrap()
    }

    /// Writes `after` for every capture, as the applier would
    fn mutate(root: &Path, captures: &[FileCapture]) {
        for c in captures {
            write(root, c.path.as_str(), &c.after);
        }
    }

    fn captures() -> Vec<FileCapture> {
        vec![
            FileCapture {
                path: path("src/a.ts"),
                before: Some("const x = a.b.c;  \nkeep\n".to_string()),
                after: "const x = a.b?.c;\nkeep\n".to_string(),
            },
            FileCapture {
                path: path("src/new.ts"),
                before: None,
                after: "export {};\n".to_string(),
            },
        ]
    }

    #[test]
    fn restore_rebuilds_exact_bytes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/a.ts", "const x = a.b.c;  \nkeep\n");

        let store = MemorySnapshotStore::new();
        let id = id_at(0, 1);
        store
            .snapshot(id, &captures(), &RetentionPolicy::default(), now())
            .unwrap();
        mutate(root, &captures());

        let first = store.restore(id, root).unwrap();
        assert_eq!(
            first.files,
            vec![
                (path("src/a.ts"), FileRestore::Restored),
                (path("src/new.ts"), FileRestore::Removed),
            ]
        );
        assert_eq!(read(root, "src/a.ts"), "const x = a.b.c;  \nkeep\n");
        assert!(!path("src/new.ts").resolve(root).exists());

        let second = store.restore(id, root).unwrap();
        assert_eq!(second.changed(), 0);
        assert_eq!(read(root, "src/a.ts"), "const x = a.b.c;  \nkeep\n");
    }

    #[test]
    fn drifted_file_is_reported_and_the_rest_restored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let store = MemorySnapshotStore::new();
        let id = id_at(0, 1);
        store
            .snapshot(id, &captures(), &RetentionPolicy::default(), now())
            .unwrap();
        mutate(root, &captures());
        write(root, "src/new.ts", "someone else\n");

        let report = store.restore(id, root).unwrap();
        assert_eq!(report.changed(), 1);
        assert_eq!(report.drifted().collect::<Vec<_>>(), vec![&path("src/new.ts")]);
        assert_eq!(read(root, "src/a.ts"), "const x = a.b.c;  \nkeep\n");
        assert_eq!(read(root, "src/new.ts"), "someone else\n");

        // a second pass changes nothing and still reports the drift
        let again = store.restore(id, root).unwrap();
        assert_eq!(again.changed(), 0);
        assert!(!again.is_complete());
        let err = again.ensure_complete().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::WorkspaceDrift { ref paths, .. } if paths == &[path("src/new.ts")]
        ));
    }

    #[test]
    fn corrupted_snapshot_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let store = MemorySnapshotStore::new();
        let id = id_at(0, 1);
        store
            .snapshot(id, &captures(), &RetentionPolicy::default(), now())
            .unwrap();
        mutate(root, &captures());

        let mut tampered = store.load(id).unwrap();
        tampered.files[0].undo = LineDiff::between("", "evil\n");
        store.overwrite(tampered);

        let err = store.restore(id, root).unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(matches!(err, LedgerError::SnapshotIntegrityMismatch { .. }));
        assert_eq!(read(root, "src/a.ts"), "const x = a.b?.c;\nkeep\n");
    }

    #[test]
    fn snapshot_stores_only_changed_lines() {
        let before: String = (0..200).map(|i| format!("line {i}\n")).collect();
        let after = before.replace("line 100\n", "line one hundred\n");
        let snapshot = Snapshot::capture(
            id_at(0, 1),
            &[FileCapture {
                path: path("big.txt"),
                before: Some(before),
                after,
            }],
            now(),
        )
        .unwrap();
        let inserted: usize = snapshot.files[0]
            .undo
            .ops()
            .iter()
            .map(|op| match op {
                DiffOp::Insert(lines) => lines.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn fs_store_lists_newest_first_and_restores_latest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let store = FsSnapshotStore::new(root.join(".remedy/snapshots"));
        assert!(matches!(store.restore_latest(root), Err(LedgerError::NoSnapshots)));

        let old = id_at(2, 1);
        let new = id_at(1, 1);
        write(root, "f.txt", "v1\n");
        store
            .snapshot(
                old,
                &[FileCapture {
                    path: path("f.txt"),
                    before: Some("v1\n".into()),
                    after: "v2\n".into(),
                }],
                &RetentionPolicy::default(),
                now(),
            )
            .unwrap();
        store
            .snapshot(
                new,
                &[FileCapture {
                    path: path("f.txt"),
                    before: Some("v2\n".into()),
                    after: "v3\n".into(),
                }],
                &RetentionPolicy::default(),
                now(),
            )
            .unwrap();
        write(root, "f.txt", "v3\n");

        assert_eq!(store.list().unwrap(), vec![new, old]);
        store.restore_latest(root).unwrap();
        assert_eq!(read(root, "f.txt"), "v2\n");
        store.restore(old, root).unwrap();
        assert_eq!(read(root, "f.txt"), "v1\n");
    }

    #[test]
    fn fs_store_detects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let store = FsSnapshotStore::new(root.join("snaps"));
        let id = id_at(0, 7);
        write(root, "f.txt", "one\n");
        store
            .snapshot(
                id,
                &[FileCapture {
                    path: path("f.txt"),
                    before: Some("one\n".into()),
                    after: "two\n".into(),
                }],
                &RetentionPolicy::default(),
                now(),
            )
            .unwrap();
        write(root, "f.txt", "two\n");

        let file = root.join(format!("snaps/{id}.json"));
        let text = fs::read_to_string(&file).unwrap().replace("one", "ONE");
        fs::write(&file, text).unwrap();

        assert!(matches!(
            store.restore(id, root),
            Err(LedgerError::SnapshotIntegrityMismatch { .. })
        ));
    }

    #[test]
    fn retention_prunes_by_count_and_age_but_keeps_latest_write() {
        let policy = RetentionPolicy {
            max_count: 2,
            max_age_days: 30,
        };
        let ids = vec![id_at(0, 4), id_at(1, 3), id_at(2, 2), id_at(40, 1)];
        assert_eq!(policy.select_expired(&ids, ids[0], now()), vec![ids[2], ids[3]]);

        let aged = vec![id_at(45, 1)];
        assert!(policy.select_expired(&aged, aged[0], now()).is_empty());
    }

    #[test]
    fn huge_age_limit_means_no_age_cutoff() {
        let policy = RetentionPolicy {
            max_count: 20,
            max_age_days: u32::MAX,
        };
        let ids = vec![id_at(0, 2), id_at(4000, 1)];
        assert!(policy.select_expired(&ids, ids[0], now()).is_empty());

        let by_count = RetentionPolicy {
            max_count: 1,
            ..policy
        };
        assert_eq!(by_count.select_expired(&ids, ids[0], now()), vec![ids[1]]);
    }

    #[test]
    fn snapshot_call_applies_retention() {
        let store = MemorySnapshotStore::new();
        let policy = RetentionPolicy {
            max_count: 2,
            max_age_days: 30,
        };
        let capture = [FileCapture {
            path: path("a"),
            before: Some("a\n".into()),
            after: "b\n".into(),
        }];
        for n in 0..4 {
            store
                .snapshot(id_at(0, n), &capture, &policy, now())
                .unwrap();
        }
        assert_eq!(store.list().unwrap(), vec![id_at(0, 3), id_at(0, 2)]);
    }
}

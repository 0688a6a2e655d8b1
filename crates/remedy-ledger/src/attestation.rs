//! Attestation chain
//!
//! Append-only, hash-linked record of every cycle. Each record's `prev_hash`
//! is the previous record's `self_hash` (the first record links to
//! [`Sha256Digest::ZERO`]) and `self_hash` digests every other field.
//!
//! Records are stored one compact JSON document per line. Verification
//! re-encodes every parsed record and requires the exact stored bytes, so any
//! altered byte surfaces as a broken chain.

use crate::error::{LedgerError, Result};
use crate::fsutil::{append_line, read_or_empty};
use crate::types::{CycleId, Verdict};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use remedy_artifact::{Sha256Digest, WorkspacePath};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cycle facts to be attested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationDraft {
    pub cycle_id: CycleId,
    pub recorded_at: DateTime<Utc>,
    pub issues_before: u32,
    pub issues_after: u32,
    pub recipes_applied: Vec<String>,
    pub files_changed: Vec<WorkspacePath>,
    pub verdict: Verdict,
}

/// One sealed link of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationRecord {
    pub sequence: u64,
    pub cycle_id: CycleId,
    pub recorded_at: DateTime<Utc>,
    pub prev_hash: Sha256Digest,
    pub self_hash: Sha256Digest,
    pub issues_before: u32,
    pub issues_after: u32,
    pub recipes_applied: Vec<String>,
    pub files_changed: Vec<WorkspacePath>,
    pub verdict: Verdict,
}

impl AttestationRecord {
    /// Seal `draft` as link `sequence` after `prev_hash`
    #[must_use]
    pub fn seal(draft: AttestationDraft, sequence: u64, prev_hash: Sha256Digest) -> Self {
        let mut record = Self {
            sequence,
            cycle_id: draft.cycle_id,
            recorded_at: draft.recorded_at,
            prev_hash,
            self_hash: Sha256Digest::ZERO,
            issues_before: draft.issues_before,
            issues_after: draft.issues_after,
            recipes_applied: draft.recipes_applied,
            files_changed: draft.files_changed,
            verdict: draft.verdict,
        };
        record.self_hash = record.compute_hash();
        record
    }

    /// Digest of every field except `self_hash`
    #[must_use]
    pub fn compute_hash(&self) -> Sha256Digest {
        let mut builder = Sha256Digest::builder()
            .field(self.prev_hash.as_bytes())
            .u64_field(self.sequence)
            .str_field(&self.cycle_id.to_string())
            .str_field(&self.recorded_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .u64_field(u64::from(self.issues_before))
            .u64_field(u64::from(self.issues_after))
            .u64_field(self.recipes_applied.len() as u64);
        for recipe in &self.recipes_applied {
            builder = builder.str_field(recipe);
        }
        builder = builder.u64_field(self.files_changed.len() as u64);
        for file in &self.files_changed {
            builder = builder.str_field(file.as_str());
        }
        builder.str_field(self.verdict.as_str()).finish()
    }

    fn encode(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Walk a JSONL chain and return its records
///
/// # Errors
/// Returns [`LedgerError::AttestationChainBroken`] naming the first bad line
/// (1-based)
pub fn check_chain(bytes: &[u8]) -> Result<Vec<AttestationRecord>> {
    let broken = |line: usize, reason: String| LedgerError::AttestationChainBroken { line, reason };

    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
        broken(line, "invalid utf-8".to_string())
    })?;
    if !text.is_empty() && !text.ends_with('\n') {
        return Err(broken(text.lines().count(), "truncated final record".to_string()));
    }

    let mut records = Vec::new();
    let mut prev = Sha256Digest::ZERO;
    for (idx, line) in text.split_terminator('\n').enumerate() {
        let n = idx + 1;
        let record: AttestationRecord =
            serde_json::from_str(line).map_err(|e| broken(n, format!("unparseable record: {e}")))?;
        let canonical = record
            .encode()
            .map_err(|e| broken(n, format!("unencodable record: {e}")))?;
        if canonical != line {
            return Err(broken(n, "record bytes differ from canonical encoding".to_string()));
        }
        if record.sequence != idx as u64 {
            return Err(broken(n, format!("sequence {} where {idx} expected", record.sequence)));
        }
        if record.prev_hash != prev {
            return Err(broken(
                n,
                format!("prev_hash {} does not link to {prev}", record.prev_hash),
            ));
        }
        let expected = record.compute_hash();
        if record.self_hash != expected {
            return Err(broken(
                n,
                format!("self_hash {} recomputes to {expected}", record.self_hash),
            ));
        }
        prev = record.self_hash;
        records.push(record);
    }
    Ok(records)
}

/// Append-only attestation log
pub trait AttestationLog: Send + Sync {
    /// Raw log bytes
    ///
    /// # Errors
    /// Returns error if the log is unreadable
    fn raw(&self) -> Result<Vec<u8>>;

    /// Append one encoded record line
    ///
    /// # Errors
    /// Returns error if the line cannot be persisted
    fn append_line(&self, line: &str) -> Result<()>;

    /// Seal and append a record for `draft`
    ///
    /// The existing chain is verified first; a broken chain is reported and
    /// the new record is linked after the last parseable record.
    ///
    /// # Errors
    /// Returns error if the log cannot be read or written
    fn record(&self, draft: AttestationDraft) -> Result<AttestationRecord> {
        let raw = self.raw()?;
        let (sequence, prev) = match check_chain(&raw) {
            Ok(records) => records
                .last()
                .map_or((0, Sha256Digest::ZERO), |r| (r.sequence + 1, r.self_hash)),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "attestation chain broken; appending after last readable record"
                );
                last_readable(&raw)
            }
        };
        let record = AttestationRecord::seal(draft, sequence, prev);
        let line = record
            .encode()
            .map_err(|e| LedgerError::serde("attestation record", e))?;
        self.append_line(&line)?;
        tracing::info!(
            cycle = %record.cycle_id,
            sequence,
            hash = %record.self_hash.short(),
            verdict = %record.verdict,
            "cycle attested"
        );
        Ok(record)
    }

    /// All records, if the chain verifies
    ///
    /// # Errors
    /// Returns [`LedgerError::AttestationChainBroken`] on any mismatch
    fn records(&self) -> Result<Vec<AttestationRecord>> {
        check_chain(&self.raw()?)
    }

    /// True iff the whole chain verifies
    fn verify_chain(&self) -> bool {
        match self.raw().and_then(|raw| check_chain(&raw)) {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(error = %err, "attestation chain verification failed");
                false
            }
        }
    }
}

fn last_readable(raw: &[u8]) -> (u64, Sha256Digest) {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(|line| serde_json::from_str::<AttestationRecord>(line).ok())
        .last()
        .map_or((0, Sha256Digest::ZERO), |r| (r.sequence + 1, r.self_hash))
}

/// Attestation log in a JSONL file
#[derive(Debug, Clone)]
pub struct FileAttestationLog {
    path: PathBuf,
}

impl FileAttestationLog {
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AttestationLog for FileAttestationLog {
    fn raw(&self) -> Result<Vec<u8>> {
        read_or_empty(&self.path)
    }

    fn append_line(&self, line: &str) -> Result<()> {
        append_line(&self.path, line)
    }
}

/// In-memory attestation log
#[derive(Debug, Default)]
pub struct MemoryAttestationLog {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryAttestationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one byte (test hook for tamper detection)
    pub fn corrupt_byte(&self, index: usize, value: u8) {
        if let Some(b) = self.bytes.lock().get_mut(index) {
            *b = value;
        }
    }
}

impl AttestationLog for MemoryAttestationLog {
    fn raw(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.lock().clone())
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut bytes = self.bytes.lock();
        if bytes.last().is_some_and(|b| *b != b'\n') {
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn draft(n: u32, verdict: Verdict) -> AttestationDraft {
        AttestationDraft {
            cycle_id: CycleId::from_parts(1_760_000_000_000 + u64::from(n), u128::from(n)),
            recorded_at: Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, n % 60).unwrap(),
            issues_before: 10,
            issues_after: 10 - (n % 5),
            recipes_applied: vec!["trailing-whitespace".to_string()],
            files_changed: vec![WorkspacePath::new("src/a.py").unwrap()],
            verdict,
        }
    }

    fn log_with(n: u32) -> MemoryAttestationLog {
        let log = MemoryAttestationLog::new();
        for i in 0..n {
            log.record(draft(i, Verdict::Success)).unwrap();
        }
        log
    }

    #[test]
    fn genesis_links_to_zero_and_chain_links() {
        let log = log_with(3);
        let records = log.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].prev_hash, Sha256Digest::ZERO);
        assert_eq!(records[1].prev_hash, records[0].self_hash);
        assert_eq!(records[2].prev_hash, records[1].self_hash);
        assert_eq!(records.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(log.verify_chain());
    }

    #[test]
    fn empty_log_verifies() {
        assert!(MemoryAttestationLog::new().verify_chain());
    }

    #[test]
    fn hash_is_deterministic() {
        let a = AttestationRecord::seal(draft(1, Verdict::Partial), 4, Sha256Digest::ZERO);
        let b = AttestationRecord::seal(draft(1, Verdict::Partial), 4, Sha256Digest::ZERO);
        assert_eq!(a.self_hash, b.self_hash);
        let c = AttestationRecord::seal(draft(1, Verdict::Failure), 4, Sha256Digest::ZERO);
        assert_ne!(a.self_hash, c.self_hash);
    }

    #[test]
    fn removed_record_is_a_gap() {
        let log = log_with(3);
        let raw = log.raw().unwrap();
        let text = String::from_utf8(raw).unwrap();
        let kept: Vec<&str> = text
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| l)
            .collect();
        let spliced = format!("{}\n", kept.join("\n"));
        let err = check_chain(spliced.as_bytes()).unwrap_err();
        assert!(matches!(err, LedgerError::AttestationChainBroken { line: 2, .. }));
    }

    #[test]
    fn file_log_appends_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".remedy/attestations.jsonl");
        FileAttestationLog::new(&path).record(draft(0, Verdict::Noop)).unwrap();
        let second = FileAttestationLog::new(&path).record(draft(1, Verdict::Success)).unwrap();
        assert_eq!(second.sequence, 1);
        assert!(FileAttestationLog::new(&path).verify_chain());
    }

    #[test]
    fn record_after_truncated_tail_gets_its_own_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attestations.jsonl");
        let log = FileAttestationLog::new(&path);
        log.record(draft(0, Verdict::Success)).unwrap();
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(b"{\"sequence\":1,\"cyc");
        std::fs::write(&path, raw).unwrap();

        let second = log.record(draft(1, Verdict::Failure)).unwrap();
        assert_eq!(second.sequence, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        let last = text.lines().last().unwrap();
        assert_eq!(serde_json::from_str::<AttestationRecord>(last).unwrap(), second);

        // the cut-short line stays reported, the new record stays linkable
        assert!(!log.verify_chain());
        let third = log.record(draft(2, Verdict::Success)).unwrap();
        assert_eq!(third.sequence, 2);
        assert_eq!(third.prev_hash, second.self_hash);
    }

    #[test]
    fn recording_on_broken_chain_still_appends() {
        let log = log_with(2);
        log.corrupt_byte(5, b'X');
        assert!(!log.verify_chain());
        let rec = log.record(draft(9, Verdict::Failure)).unwrap();
        assert_eq!(rec.sequence, 2);
        assert!(!log.verify_chain());
    }

    proptest! {
        #[test]
        fn any_single_byte_change_breaks_the_chain(
            records in 1u32..5,
            pick in any::<prop::sample::Index>(),
            xor in 1u8..=255,
        ) {
            let log = log_with(records);
            let len = log.raw().unwrap().len();
            let index = pick.index(len);
            let original = log.raw().unwrap()[index];
            log.corrupt_byte(index, original ^ xor);
            prop_assert!(!log.verify_chain());
        }
    }
}

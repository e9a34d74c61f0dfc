//! Operation log persistence.
//!
//! A live migration creates one log file before its first mutation and
//! rewrites it atomically after every confirmed mutation, so the file on disk
//! always matches what was actually applied. Revert only reads it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::types::{Operation, OperationRecord};
use crate::error::MigrationError;
use crate::io::cloud::write_atomic;

const RECORD_SCHEMA: &str = include_str!("../../schemas/operation_log/v1.schema.json");

/// File name prefix for operation logs.
pub const LOG_FILE_PREFIX: &str = "billing-migration-";

/// Append-only operation log for one live migration run.
#[derive(Debug)]
pub struct OperationLog {
    path: PathBuf,
    records: Vec<OperationRecord>,
}

impl OperationLog {
    /// Create an empty log under `dir`, named after `started_at`.
    ///
    /// The empty array is written immediately so an unwritable directory is
    /// detected before anything is mutated.
    pub fn create(dir: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        let path = unique_log_path(dir, started_at);
        let log = Self {
            path,
            records: Vec::new(),
        };
        log.flush()?;
        info!(path = %log.path.display(), "operation log created");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a confirmed mutation and flush the log to disk.
    ///
    /// No-op operations are ignored. Timestamps never go backwards within a
    /// log. A failed flush is fatal: the caller must stop mutating.
    pub fn append(&mut self, operation: Operation) -> Result<()> {
        let now = Utc::now();
        let timestamp = match self.records.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let Some(record) = operation.into_record(timestamp) else {
            debug!("skipping no-op operation");
            return Ok(());
        };
        debug!(project = %record.project, kind = %record.kind, "appending operation record");
        self.records.push(record);
        if let Err(err) = self.flush() {
            let unlogged = self.records.pop();
            return Err(err.context(format!(
                "applied but unrecorded operation: {unlogged:?}"
            )));
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(&self.records).map_err(|err| {
            MigrationError::LogIo {
                path: self.path.clone(),
                message: format!("serialize: {err}"),
            }
        })?;
        buf.push('\n');
        write_atomic(&self.path, &buf).map_err(|err| {
            anyhow::Error::new(MigrationError::LogIo {
                path: self.path.clone(),
                message: format!("{err:#}"),
            })
        })
    }
}

/// Load and validate a persisted operation log.
///
/// Every element is checked against the record schema and decoded into a
/// typed [`Operation`]; timestamps must be non-decreasing.
pub fn load_log(path: &Path) -> Result<Vec<OperationRecord>> {
    Ok(load_entries(path)?
        .into_iter()
        .map(|(record, _)| record)
        .collect())
}

/// Load a log and return its decoded operations in recorded order.
pub fn load_operations(path: &Path) -> Result<Vec<Operation>> {
    Ok(load_entries(path)?
        .into_iter()
        .map(|(_, operation)| operation)
        .collect())
}

fn load_entries(path: &Path) -> Result<Vec<(OperationRecord, Operation)>> {
    debug!(path = %path.display(), "loading operation log");
    let contents = fs::read_to_string(path).map_err(|err| MigrationError::LogIo {
        path: path.to_path_buf(),
        message: format!("read: {err}"),
    })?;
    let format_error = |index: Option<usize>, message: String| MigrationError::LogFormat {
        path: path.to_path_buf(),
        index,
        message,
    };

    let document: Value = serde_json::from_str(&contents)
        .map_err(|err| format_error(None, format!("parse json: {err}")))?;
    let Value::Array(items) = document else {
        return Err(format_error(None, "expected a JSON array of records".to_string()).into());
    };

    let schema: Value = serde_json::from_str(RECORD_SCHEMA)?;
    let validator = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;

    let mut entries: Vec<(OperationRecord, Operation)> = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let messages: Vec<String> = validator
            .iter_errors(&item)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            return Err(format_error(Some(index), messages.join("; ")).into());
        }
        let record: OperationRecord = serde_json::from_value(item)
            .map_err(|err| format_error(Some(index), err.to_string()))?;
        let operation = record
            .operation()
            .map_err(|message| format_error(Some(index), message))?;
        if let Some((previous, _)) = entries.last() {
            if record.timestamp < previous.timestamp {
                return Err(format_error(
                    Some(index),
                    format!(
                        "timestamp {} precedes previous record {}",
                        record.timestamp, previous.timestamp
                    ),
                )
                .into());
            }
        }
        entries.push((record, operation));
    }
    debug!(count = entries.len(), "operation log loaded");
    Ok(entries)
}

/// `billing-migration-<YYYYMMDDTHHMMSSZ>.json`, suffixed if already taken.
pub fn log_file_name(started_at: DateTime<Utc>) -> String {
    format!(
        "{LOG_FILE_PREFIX}{}.json",
        started_at.format("%Y%m%dT%H%M%SZ")
    )
}

fn unique_log_path(dir: &Path, started_at: DateTime<Utc>) -> PathBuf {
    let base = dir.join(log_file_name(started_at));
    if !base.exists() {
        return base;
    }
    let stem = log_file_name(started_at).trim_end_matches(".json").to_string();
    let mut suffix = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}-{suffix}.json"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BillingAccountRef, LabelEntry, OperationKind, ProjectRef};

    fn started_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn label_op(project: &str) -> Operation {
        Operation::LabelUpdate {
            project: ProjectRef::new(project),
            before: None,
            after: LabelEntry::new("original-billing-account-id", "111-AAA"),
        }
    }

    fn move_op(project: &str) -> Operation {
        Operation::BillingMove {
            project: ProjectRef::new(project),
            from: BillingAccountRef::new("111-AAA"),
            to: BillingAccountRef::new("999-ZZZ"),
        }
    }

    fn format_index(err: &anyhow::Error) -> Option<usize> {
        match err.downcast_ref::<MigrationError>() {
            Some(MigrationError::LogFormat { index, .. }) => *index,
            other => panic!("expected LogFormat, got {other:?}"),
        }
    }

    #[test]
    fn file_name_embeds_run_timestamp() {
        assert_eq!(
            log_file_name(started_at()),
            "billing-migration-20260102T030405Z.json"
        );
    }

    #[test]
    fn create_writes_empty_array_and_avoids_collisions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = OperationLog::create(temp.path(), started_at()).expect("create");
        let second = OperationLog::create(temp.path(), started_at()).expect("create");
        assert_ne!(first.path(), second.path());
        assert_eq!(
            fs::read_to_string(first.path()).expect("read"),
            "[]\n"
        );
    }

    #[test]
    fn every_append_is_flushed_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = OperationLog::create(temp.path(), started_at()).expect("create");
        log.append(label_op("proj-1")).expect("append label");
        assert_eq!(load_log(log.path()).expect("load").len(), 1);

        log.append(move_op("proj-1")).expect("append move");
        let records = load_log(log.path()).expect("load");
        assert_eq!(log.len(), 2);
        assert_eq!(records.as_slice(), log.records());
        assert_eq!(records[0].kind, OperationKind::LabelUpdate);
        assert_eq!(records[0].before, None);
        assert_eq!(records[1].kind, OperationKind::BillingMove);
        assert_eq!(
            records[1].before.as_deref(),
            Some("billingAccounts/111-AAA")
        );
        assert!(records[0].timestamp <= records[1].timestamp);
    }

    #[test]
    fn load_operations_decodes_in_recorded_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = OperationLog::create(temp.path(), started_at()).expect("create");
        log.append(label_op("proj-1")).expect("append label");
        log.append(move_op("proj-1")).expect("append move");

        let operations = load_operations(log.path()).expect("load");

        assert_eq!(operations, vec![label_op("proj-1"), move_op("proj-1")]);
        let kinds: Vec<OperationKind> = operations.iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::LabelUpdate, OperationKind::BillingMove]
        );
    }

    #[test]
    fn append_ignores_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = OperationLog::create(temp.path(), started_at()).expect("create");
        log.append(Operation::BillingMove {
            project: ProjectRef::new("proj-1"),
            from: BillingAccountRef::new("999-ZZZ"),
            to: BillingAccountRef::new("999-ZZZ"),
        })
        .expect("append");
        assert!(log.is_empty());
    }

    #[test]
    fn create_fails_with_log_io_error_when_dir_is_a_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, "x").expect("write");
        let err = OperationLog::create(&blocker, started_at()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::LogIo { .. })
        ));
    }

    #[test]
    fn load_rejects_unknown_kind_with_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.json");
        let body = r#"[
  {"timestamp": "2026-01-02T03:04:05Z", "project": "p", "kind": "BILLING_MOVE",
   "before": "billingAccounts/1", "after": "billingAccounts/2"},
  {"timestamp": "2026-01-02T03:04:06Z", "project": "p", "kind": "BUDGET_CHANGE",
   "before": null, "after": "x"}
]"#;
        fs::write(&path, body).expect("write");
        let err = load_log(&path).unwrap_err();
        assert_eq!(format_index(&err), Some(1));
    }

    #[test]
    fn load_rejects_non_array_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.json");
        fs::write(&path, "{}").expect("write");
        let err = load_log(&path).unwrap_err();
        assert_eq!(format_index(&err), None);
    }

    #[test]
    fn load_rejects_identical_before_and_after() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.json");
        let body = r#"[{"timestamp": "2026-01-02T03:04:05Z", "project": "p", "kind": "BILLING_MOVE",
   "before": "billingAccounts/1", "after": "billingAccounts/1"}]"#;
        fs::write(&path, body).expect("write");
        let err = load_log(&path).unwrap_err();
        assert_eq!(format_index(&err), Some(0));
        assert!(err.to_string().contains("identical"));
    }

    #[test]
    fn load_rejects_decreasing_timestamps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.json");
        let body = r#"[
  {"timestamp": "2026-01-02T03:04:06Z", "project": "p", "kind": "LABEL_UPDATE",
   "before": null, "after": "k=1"},
  {"timestamp": "2026-01-02T03:04:05Z", "project": "p", "kind": "BILLING_MOVE",
   "before": "billingAccounts/1", "after": "billingAccounts/2"}
]"#;
        fs::write(&path, body).expect("write");
        let err = load_log(&path).unwrap_err();
        assert_eq!(format_index(&err), Some(1));
    }

    #[test]
    fn load_missing_file_is_log_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_log(&temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::LogIo { .. })
        ));
    }
}

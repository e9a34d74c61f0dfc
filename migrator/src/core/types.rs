//! Shared deterministic types for the migration engine.
//!
//! These types define the stable contract between discovery, execution, the
//! persisted operation log, and revert. They must not depend on I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix shared by every billing account resource name.
pub const BILLING_ACCOUNT_PREFIX: &str = "billingAccounts/";

/// Project labels, ordered by key for stable output.
pub type Labels = BTreeMap<String, String>;

/// Opaque project identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRef(String);

impl ProjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Billing account resource name of the form `billingAccounts/<id>`.
///
/// Equality is plain string equality on the full name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingAccountRef(String);

impl BillingAccountRef {
    /// Build a ref from either a bare id (`111-AAA`) or a full resource name.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.starts_with(BILLING_ACCOUNT_PREFIX) {
            Self(id)
        } else {
            Self(format!("{BILLING_ACCOUNT_PREFIX}{id}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id portion after `billingAccounts/`.
    pub fn id(&self) -> &str {
        self.0
            .strip_prefix(BILLING_ACCOUNT_PREFIX)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for BillingAccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `key=value` label pair as stored in operation records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub key: String,
    pub value: String,
}

impl LabelEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse `key=value`, splitting on the first `=`. Keys never contain `=`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, value))
    }
}

impl fmt::Display for LabelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    LabelUpdate,
    BillingMove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::LabelUpdate => f.write_str("LABEL_UPDATE"),
            OperationKind::BillingMove => f.write_str("BILLING_MOVE"),
        }
    }
}

/// One confirmed mutation, exactly as persisted in the operation log.
///
/// `before` is `None` only for a label update that introduced a new key.
/// Records are immutable once written; `before != after` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    pub project: ProjectRef,
    pub kind: OperationKind,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Typed view of an [`OperationRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    LabelUpdate {
        project: ProjectRef,
        before: Option<LabelEntry>,
        after: LabelEntry,
    },
    BillingMove {
        project: ProjectRef,
        from: BillingAccountRef,
        to: BillingAccountRef,
    },
}

impl Operation {
    pub fn project(&self) -> &ProjectRef {
        match self {
            Operation::LabelUpdate { project, .. } | Operation::BillingMove { project, .. } => {
                project
            }
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::LabelUpdate { .. } => OperationKind::LabelUpdate,
            Operation::BillingMove { .. } => OperationKind::BillingMove,
        }
    }

    /// Convert into a persisted record. Returns `None` for a no-op.
    pub fn into_record(self, timestamp: DateTime<Utc>) -> Option<OperationRecord> {
        let kind = self.kind();
        let (project, before, after) = match self {
            Operation::LabelUpdate {
                project,
                before,
                after,
            } => (
                project,
                before.map(|entry| entry.to_string()),
                Some(after.to_string()),
            ),
            Operation::BillingMove { project, from, to } => (
                project,
                Some(from.as_str().to_string()),
                Some(to.as_str().to_string()),
            ),
        };
        if before == after {
            return None;
        }
        Some(OperationRecord {
            timestamp,
            project,
            kind,
            before,
            after,
        })
    }
}

impl OperationRecord {
    /// Decode the kind-specific `before`/`after` payloads.
    ///
    /// Returns a human-readable reason when the record is malformed.
    pub fn operation(&self) -> Result<Operation, String> {
        if self.before == self.after {
            return Err("before and after are identical".to_string());
        }
        let after = self
            .after
            .as_deref()
            .ok_or_else(|| format!("{} record is missing `after`", self.kind))?;
        match self.kind {
            OperationKind::LabelUpdate => {
                let after = LabelEntry::parse(after)
                    .ok_or_else(|| format!("label `after` is not key=value: {after:?}"))?;
                let before = match self.before.as_deref() {
                    None => None,
                    Some(raw) => Some(
                        LabelEntry::parse(raw)
                            .ok_or_else(|| format!("label `before` is not key=value: {raw:?}"))?,
                    ),
                };
                if let Some(before) = &before {
                    if before.key != after.key {
                        return Err(format!(
                            "label keys differ: before={} after={}",
                            before.key, after.key
                        ));
                    }
                }
                Ok(Operation::LabelUpdate {
                    project: self.project.clone(),
                    before,
                    after,
                })
            }
            OperationKind::BillingMove => {
                let before = self
                    .before
                    .as_deref()
                    .ok_or_else(|| "BILLING_MOVE record is missing `before`".to_string())?;
                Ok(Operation::BillingMove {
                    project: self.project.clone(),
                    from: parse_account(before)?,
                    to: parse_account(after)?,
                })
            }
        }
    }
}

fn parse_account(raw: &str) -> Result<BillingAccountRef, String> {
    match raw.strip_prefix(BILLING_ACCOUNT_PREFIX) {
        Some(id) if !id.is_empty() => Ok(BillingAccountRef::new(raw)),
        _ => Err(format!("not a billing account name: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn billing_account_ref_accepts_bare_and_full_ids() {
        let bare = BillingAccountRef::new("111-AAA");
        let full = BillingAccountRef::new("billingAccounts/111-AAA");
        assert_eq!(bare, full);
        assert_eq!(bare.as_str(), "billingAccounts/111-AAA");
        assert_eq!(bare.id(), "111-AAA");
    }

    #[test]
    fn label_entry_splits_on_first_equals() {
        let entry = LabelEntry::parse("k=a=b").expect("parse");
        assert_eq!(entry.key, "k");
        assert_eq!(entry.value, "a=b");
        assert!(LabelEntry::parse("=x").is_none());
        assert!(LabelEntry::parse("novalue").is_none());
    }

    #[test]
    fn kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&OperationKind::LabelUpdate).expect("serialize");
        assert_eq!(json, "\"LABEL_UPDATE\"");
        let kind: OperationKind = serde_json::from_str("\"BILLING_MOVE\"").expect("parse");
        assert_eq!(kind, OperationKind::BillingMove);
    }

    #[test]
    fn no_op_billing_move_is_never_recorded() {
        let account = BillingAccountRef::new("111-AAA");
        let op = Operation::BillingMove {
            project: ProjectRef::new("proj-1"),
            from: account.clone(),
            to: account,
        };
        assert!(op.into_record(ts()).is_none());
    }

    #[test]
    fn record_decodes_back_to_operation() {
        let op = Operation::LabelUpdate {
            project: ProjectRef::new("proj-1"),
            before: None,
            after: LabelEntry::new("original-billing-account-id", "111-AAA"),
        };
        let record = op.clone().into_record(ts()).expect("record");
        assert_eq!(
            record.after.as_deref(),
            Some("original-billing-account-id=111-AAA")
        );
        assert_eq!(record.operation().expect("decode"), op);
    }

    #[test]
    fn malformed_billing_record_is_rejected() {
        let record = OperationRecord {
            timestamp: ts(),
            project: ProjectRef::new("proj-1"),
            kind: OperationKind::BillingMove,
            before: Some("111-AAA".to_string()),
            after: Some("billingAccounts/999-ZZZ".to_string()),
        };
        let err = record.operation().unwrap_err();
        assert!(err.contains("not a billing account name"));
    }
}

//! Per-project mutation planning and revert inversion.
//!
//! Planning is pure: it takes the project's current billing account and labels
//! and decides which of the two mutations (label, then billing move) are needed.
//! Inversion maps a recorded [`Operation`] to the action that undoes it.

use crate::core::label::label_value_for;
use crate::core::types::{BillingAccountRef, LabelEntry, Labels, Operation, ProjectRef};

/// A project eligible for migration, with the account it is linked to today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub project: ProjectRef,
    pub current: BillingAccountRef,
}

/// Label mutation for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelChange {
    pub key: String,
    /// Value under `key` before the change, if any.
    pub previous: Option<String>,
    /// Normalized value written to the project.
    pub value: String,
    /// Canonical (unnormalized) billing id recorded in the operation log.
    pub canonical: String,
}

impl LabelChange {
    /// Full label map to send, given the labels currently on the project.
    pub fn apply(&self, labels: &Labels) -> Labels {
        let mut next = labels.clone();
        next.insert(self.key.clone(), self.value.clone());
        next
    }

    pub fn operation(&self, project: &ProjectRef) -> Operation {
        Operation::LabelUpdate {
            project: project.clone(),
            before: self
                .previous
                .as_ref()
                .map(|value| LabelEntry::new(&self.key, value)),
            after: LabelEntry::new(&self.key, &self.canonical),
        }
    }
}

/// Billing move for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingChange {
    pub from: BillingAccountRef,
    pub to: BillingAccountRef,
}

impl BillingChange {
    pub fn operation(&self, project: &ProjectRef) -> Operation {
        Operation::BillingMove {
            project: project.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

/// Mutations planned for one project, applied label first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPlan {
    pub project: ProjectRef,
    pub label: Option<LabelChange>,
    pub billing: Option<BillingChange>,
}

impl ProjectPlan {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.billing.is_none()
    }
}

/// Plan the label and billing mutations for `candidate`.
///
/// A project already on `target` gets an empty plan. The label mutation is
/// dropped when the project already carries the normalized value or the
/// canonical id, since either identifies the original account and a write
/// over the canonical id could not be recorded.
pub fn plan_project(
    candidate: &Candidate,
    labels: &Labels,
    target: &BillingAccountRef,
    label_key: &str,
) -> ProjectPlan {
    let project = candidate.project.clone();
    if candidate.current == *target {
        return ProjectPlan {
            project,
            label: None,
            billing: None,
        };
    }

    let value = label_value_for(&candidate.current);
    let canonical = candidate.current.id().to_string();
    let previous = labels.get(label_key).cloned();
    let already_labeled = previous
        .as_deref()
        .is_some_and(|current| current == value || current == canonical);
    let label = if already_labeled {
        None
    } else {
        Some(LabelChange {
            key: label_key.to_string(),
            previous,
            value,
            canonical,
        })
    };

    ProjectPlan {
        project,
        label,
        billing: Some(BillingChange {
            from: candidate.current.clone(),
            to: target.clone(),
        }),
    }
}

/// Action that undoes one recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertAction {
    /// Link the project back to `account`.
    RestoreBilling {
        project: ProjectRef,
        account: BillingAccountRef,
    },
    /// Put the previous value back under `key`.
    RestoreLabel {
        project: ProjectRef,
        key: String,
        value: String,
    },
    /// Remove `key`; it was absent before migration.
    RemoveLabel { project: ProjectRef, key: String },
}

impl RevertAction {
    pub fn project(&self) -> &ProjectRef {
        match self {
            RevertAction::RestoreBilling { project, .. }
            | RevertAction::RestoreLabel { project, .. }
            | RevertAction::RemoveLabel { project, .. } => project,
        }
    }

    /// Apply a label action to `labels`. Returns the new map, or `None` when
    /// the labels already match (including billing actions).
    pub fn apply_to_labels(&self, labels: &Labels) -> Option<Labels> {
        match self {
            RevertAction::RestoreBilling { .. } => None,
            RevertAction::RestoreLabel { key, value, .. } => {
                if labels.get(key) == Some(value) {
                    return None;
                }
                let mut next = labels.clone();
                next.insert(key.clone(), value.clone());
                Some(next)
            }
            RevertAction::RemoveLabel { key, .. } => {
                if !labels.contains_key(key) {
                    return None;
                }
                let mut next = labels.clone();
                next.remove(key);
                Some(next)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RevertAction::RestoreBilling { project, account } => {
                format!("move project {project} back to {account}")
            }
            RevertAction::RestoreLabel {
                project,
                key,
                value,
            } => format!("restore label '{key}: {value}' on project {project}"),
            RevertAction::RemoveLabel { project, key } => {
                format!("remove label '{key}' from project {project}")
            }
        }
    }
}

/// Invert a recorded operation.
pub fn inverse(operation: &Operation) -> RevertAction {
    match operation {
        Operation::BillingMove { project, from, .. } => RevertAction::RestoreBilling {
            project: project.clone(),
            account: from.clone(),
        },
        Operation::LabelUpdate {
            project,
            before: Some(before),
            ..
        } => RevertAction::RestoreLabel {
            project: project.clone(),
            key: before.key.clone(),
            value: before.value.clone(),
        },
        Operation::LabelUpdate {
            project,
            before: None,
            after,
        } => RevertAction::RemoveLabel {
            project: project.clone(),
            key: after.key.clone(),
        },
    }
}

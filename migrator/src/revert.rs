//! Orchestration for `--revert <log>`.
//!
//! Replays a persisted operation log latest-first, applying the inverse of each
//! record. The log is trusted: current state is not compared against the
//! recorded `after` values before inverting.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::context::RunContext;
use crate::core::plan::{RevertAction, inverse};
use crate::error::MigrationError;
use crate::io::cloud::Cloud;
use crate::io::oplog::load_operations;

/// Parameters for a revert run.
#[derive(Debug, Clone)]
pub struct RevertRequest {
    pub log_path: PathBuf,
    pub dry_run: bool,
}

/// Result of a revert run.
#[derive(Debug)]
pub struct RevertOutcome {
    pub dry_run: bool,
    /// Inverse actions in the order they were (or would be) applied.
    pub actions: Vec<RevertAction>,
    /// Inverse actions confirmed by the cloud (live only).
    pub applied: usize,
    /// Label actions skipped because labels already matched.
    pub unchanged: usize,
    pub failures: Vec<MigrationError>,
}

impl RevertOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Revert the operations recorded in `request.log_path`.
///
/// Loading errors are fatal. Each inverse action is attempted independently;
/// failures are collected and the replay continues.
#[instrument(skip_all, fields(log = %request.log_path.display(), dry_run = request.dry_run))]
pub fn run_revert<C: Cloud>(cloud: &C, request: &RevertRequest) -> Result<RevertOutcome> {
    let actions = plan_revert(&request.log_path)?;

    if request.dry_run {
        info!("DRY RUN MODE: no changes will be made");
    } else {
        warn!("LIVE RUN MODE: recorded operations will be reverted");
    }

    let mut ctx = RunContext::unlogged(request.dry_run);
    let mut unchanged = 0;
    for action in &actions {
        if ctx.dry_run() {
            info!("[DRY RUN] Would {}", action.describe());
            continue;
        }
        if apply_action(cloud, &mut ctx, action) == ActionResult::Unchanged {
            unchanged += 1;
        }
    }

    let applied = ctx.applied();
    let (_, _, failures) = ctx.into_parts();
    info!(
        actions = actions.len(),
        applied,
        unchanged,
        failed = failures.len(),
        "revert finished"
    );
    Ok(RevertOutcome {
        dry_run: request.dry_run,
        actions,
        applied,
        unchanged,
        failures,
    })
}

/// Load a log and compute its inverse actions, latest record first.
pub fn plan_revert(log_path: &Path) -> Result<Vec<RevertAction>> {
    let operations = load_operations(log_path)?;
    info!(records = operations.len(), "operation log loaded");
    Ok(operations.iter().rev().map(inverse).collect())
}

/// What happened to one inverse action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionResult {
    Applied,
    Unchanged,
    Failed,
}

fn apply_action<C: Cloud>(cloud: &C, ctx: &mut RunContext, action: &RevertAction) -> ActionResult {
    let project = action.project();
    let attempt = match action {
        RevertAction::RestoreBilling { account, .. } => {
            info!(%project, %account, "restoring billing account");
            cloud
                .set_billing(project, account)
                .map(|()| ActionResult::Applied)
                .map_err(|err| ("restore billing", err))
        }
        RevertAction::RestoreLabel { .. } | RevertAction::RemoveLabel { .. } => {
            match cloud.labels(project) {
                Err(err) => Err(("read labels", err)),
                Ok(labels) => match action.apply_to_labels(&labels) {
                    None => {
                        debug!(%project, "labels already match; nothing to revert");
                        Ok(ActionResult::Unchanged)
                    }
                    Some(next) => {
                        info!(%project, "{}", action.describe());
                        cloud
                            .set_labels(project, &next)
                            .map(|()| ActionResult::Applied)
                            .map_err(|err| ("restore labels", err))
                    }
                },
            }
        }
    };

    match attempt {
        Ok(result) => {
            if result == ActionResult::Applied {
                ctx.note_applied();
            }
            result
        }
        Err((operation, err)) => {
            ctx.fail(MigrationError::Mutation {
                project: project.clone(),
                operation,
                message: format!("{err:#}"),
            });
            ActionResult::Failed
        }
    }
}

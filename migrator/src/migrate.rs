//! Orchestration for `--migrate`.
//!
//! Discovers candidates, plans the label and billing mutations for each one,
//! and either logs the intent (dry run) or applies them label first, recording
//! every confirmed mutation in the operation log as it happens.

use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::context::RunContext;
use crate::core::label::validate_label_key;
use crate::core::plan::{Candidate, ProjectPlan, plan_project};
use crate::core::types::BillingAccountRef;
use crate::discover::discover_candidates;
use crate::error::MigrationError;
use crate::io::cloud::Cloud;
use crate::io::oplog::OperationLog;

/// Parameters for a migration run.
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub target: BillingAccountRef,
    /// Restrict sources to this account.
    pub source: Option<BillingAccountRef>,
    /// Label key that stores the original billing id.
    pub label_key: String,
    pub dry_run: bool,
    /// Directory for the operation log (live runs only).
    pub log_dir: PathBuf,
}

/// Result of a migration run.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub dry_run: bool,
    /// Projects considered after discovery.
    pub candidates: usize,
    /// Plans that were (or in a dry run, would be) executed.
    pub plans: Vec<ProjectPlan>,
    /// Projects whose planned mutations all succeeded (live only).
    pub completed: usize,
    /// Confirmed mutations, equal to the number of log records.
    pub applied: usize,
    /// Operation log written by a live run.
    pub log_path: Option<PathBuf>,
    pub failed_sources: Vec<MigrationError>,
    pub failed_projects: Vec<MigrationError>,
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        self.failed_sources.is_empty() && self.failed_projects.is_empty()
    }
}

/// Run a migration against `cloud`.
///
/// Per-project failures are collected and the run continues. Errors returned
/// from this function are fatal: invalid input, account enumeration failure,
/// or an operation log that cannot be written.
#[instrument(skip_all, fields(target = %request.target, dry_run = request.dry_run))]
pub fn run_migration<C: Cloud>(cloud: &C, request: &MigrationRequest) -> Result<MigrationOutcome> {
    let key_errors = validate_label_key(&request.label_key);
    if !key_errors.is_empty() {
        bail!("invalid label key: {}", key_errors.join("; "));
    }

    if request.dry_run {
        info!("DRY RUN MODE: no changes will be made");
    } else {
        warn!("LIVE RUN MODE: project billing and labels will be changed");
    }

    let discovery = discover_candidates(cloud, &request.target, request.source.as_ref())?;
    for failure in &discovery.failed_sources {
        warn!(error = %failure, "source skipped");
    }

    let mut ctx = if request.dry_run {
        RunContext::unlogged(true)
    } else {
        RunContext::logged(OperationLog::create(&request.log_dir, Utc::now())?)
    };

    let mut plans = Vec::new();
    let mut completed = 0;
    for candidate in &discovery.candidates {
        if let Some(plan) = migrate_project(cloud, &mut ctx, request, candidate)? {
            if !ctx.dry_run() && plan_completed(&ctx, &plan) {
                completed += 1;
            }
            plans.push(plan);
        }
    }

    let candidates = discovery.candidates.len();
    let (log_path, applied, failed_projects) = ctx.into_parts();
    info!(
        candidates,
        planned = plans.len(),
        completed,
        applied,
        failed_sources = discovery.failed_sources.len(),
        failed_projects = failed_projects.len(),
        "migration finished"
    );

    Ok(MigrationOutcome {
        dry_run: request.dry_run,
        candidates,
        plans,
        completed,
        applied,
        log_path,
        failed_sources: discovery.failed_sources,
        failed_projects,
    })
}

/// Plan and (unless dry-running) apply the mutations for one candidate.
///
/// Returns the plan, or `None` when there was nothing to do or the labels
/// could not be read.
fn migrate_project<C: Cloud>(
    cloud: &C,
    ctx: &mut RunContext,
    request: &MigrationRequest,
    candidate: &Candidate,
) -> Result<Option<ProjectPlan>> {
    let project = &candidate.project;
    info!(%project, current = %candidate.current, "processing project");

    let labels = match cloud.labels(project) {
        Ok(labels) => labels,
        Err(err) => {
            ctx.fail(MigrationError::Mutation {
                project: project.clone(),
                operation: "read labels",
                message: format!("{err:#}"),
            });
            return Ok(None);
        }
    };

    let plan = plan_project(candidate, &labels, &request.target, &request.label_key);
    if plan.is_empty() {
        info!(%project, target = %request.target, "project already on target billing account; skipping");
        return Ok(None);
    }

    if ctx.dry_run() {
        match &plan.label {
            Some(label) => info!(
                "[DRY RUN] Would label project {project} with '{}: {}'",
                label.key, label.value
            ),
            None => info!("[DRY RUN] Project {project} already labeled; label unchanged"),
        }
        if let Some(billing) = &plan.billing {
            info!(
                "[DRY RUN] Would move project {project} from {} to {}",
                billing.from, billing.to
            );
        }
        return Ok(Some(plan));
    }

    if let Some(label) = &plan.label {
        info!(%project, key = %label.key, value = %label.value, "labeling project");
        if let Err(err) = cloud.set_labels(project, &label.apply(&labels)) {
            ctx.fail(MigrationError::Mutation {
                project: project.clone(),
                operation: "set labels",
                message: format!("{err:#}"),
            });
            return Ok(Some(plan));
        }
        ctx.confirm(label.operation(project))?;
    } else {
        debug!(%project, "label already present");
    }

    if let Some(billing) = &plan.billing {
        info!(%project, from = %billing.from, to = %billing.to, "moving project billing");
        if let Err(err) = cloud.set_billing(project, &billing.to) {
            ctx.fail(MigrationError::Mutation {
                project: project.clone(),
                operation: "set billing",
                message: format!("{err:#}"),
            });
            return Ok(Some(plan));
        }
        ctx.confirm(billing.operation(project))?;
        info!(%project, to = %billing.to, "project moved");
    }

    Ok(Some(plan))
}

fn plan_completed(ctx: &RunContext, plan: &ProjectPlan) -> bool {
    !ctx.failures().iter().any(|failure| {
        matches!(failure, MigrationError::Mutation { project, .. } if *project == plan.project)
    })
}

//! Candidate discovery for a migration run.
//!
//! Enumerates source billing accounts and the projects linked to them. A
//! failure to enumerate one source is recorded and that source is skipped.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::plan::Candidate;
use crate::core::types::{BillingAccountRef, ProjectRef};
use crate::error::MigrationError;
use crate::io::cloud::Cloud;

/// Result of discovery: eligible candidates plus the sources that failed.
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub failed_sources: Vec<MigrationError>,
}

impl Discovery {
    pub fn has_failures(&self) -> bool {
        !self.failed_sources.is_empty()
    }
}

/// Build the candidate list for migrating to `target`.
///
/// With `source`, only projects on that account are considered. Without it,
/// every accessible account except `target` is a source. Projects already on
/// `target` are never candidates, and a project reported by several sources
/// is kept once (first source wins).
#[instrument(skip_all, fields(target = %target, source = ?source.map(BillingAccountRef::as_str)))]
pub fn discover_candidates<C: Cloud>(
    cloud: &C,
    target: &BillingAccountRef,
    source: Option<&BillingAccountRef>,
) -> Result<Discovery> {
    let sources = match source {
        Some(source) => {
            info!(%source, "processing specified source billing account");
            vec![source.clone()]
        }
        None => {
            info!("discovering all accessible source billing accounts");
            cloud
                .list_billing_accounts()
                .context("list billing accounts")?
        }
    };

    let mut discovery = Discovery::default();
    let mut seen: BTreeSet<ProjectRef> = BTreeSet::new();

    for account in sources {
        if account == *target {
            if source.is_some() {
                warn!(%account, "source billing account is the target; nothing to migrate");
            } else {
                debug!(%account, "skipping target billing account as a source");
            }
            continue;
        }

        let projects = match cloud.list_projects(&account) {
            Ok(projects) => projects,
            Err(err) => {
                warn!(%account, error = %format!("{err:#}"), "could not list projects; skipping source");
                discovery.failed_sources.push(MigrationError::Discovery {
                    account,
                    message: format!("{err:#}"),
                });
                continue;
            }
        };

        if projects.is_empty() {
            info!(%account, "no projects linked to billing account");
        }
        for project in projects {
            if !seen.insert(project.clone()) {
                debug!(%project, %account, "project already discovered; skipping duplicate");
                continue;
            }
            debug!(%project, %account, "candidate discovered");
            discovery.candidates.push(Candidate {
                project,
                current: account.clone(),
            });
        }
    }

    info!(
        candidates = discovery.candidates.len(),
        failed_sources = discovery.failed_sources.len(),
        "discovery finished"
    );
    Ok(discovery)
}

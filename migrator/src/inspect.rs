//! Read-only inspection commands: `--audit` and `--describe-project`.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{BillingAccountRef, Labels, ProjectRef};
use crate::error::MigrationError;
use crate::io::cloud::Cloud;

/// A project whose billing info could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InaccessibleProject {
    pub project: ProjectRef,
    /// Account the project was listed under.
    pub listed_under: BillingAccountRef,
    pub message: String,
}

/// Result of a billing info audit.
#[derive(Debug, Default)]
pub struct AuditReport {
    pub accounts_scanned: usize,
    pub projects_scanned: usize,
    pub inaccessible: Vec<InaccessibleProject>,
    pub failed_sources: Vec<MigrationError>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.inaccessible.is_empty() && self.failed_sources.is_empty()
    }
}

/// Find projects whose billing info cannot be retrieved.
///
/// Scans `source` only, or every accessible account. Accounts whose projects
/// cannot be listed are reported and skipped.
#[instrument(skip_all, fields(source = ?source.map(BillingAccountRef::as_str)))]
pub fn audit_billing_info<C: Cloud>(
    cloud: &C,
    source: Option<&BillingAccountRef>,
) -> Result<AuditReport> {
    let accounts = match source {
        Some(source) => vec![source.clone()],
        None => cloud
            .list_billing_accounts()
            .context("list billing accounts")?,
    };

    let mut report = AuditReport::default();
    for account in accounts {
        report.accounts_scanned += 1;
        let projects = match cloud.list_projects(&account) {
            Ok(projects) => projects,
            Err(err) => {
                warn!(%account, error = %format!("{err:#}"), "could not list projects");
                report.failed_sources.push(MigrationError::Discovery {
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
            report.projects_scanned += 1;
            match cloud.current_billing(&project) {
                Ok(current) => debug!(%project, %current, "billing info accessible"),
                Err(err) => {
                    warn!(%project, "unable to get billing info");
                    report.inaccessible.push(InaccessibleProject {
                        project,
                        listed_under: account.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }
    }
    Ok(report)
}

/// Billing and label details for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDetails {
    pub project: ProjectRef,
    pub billing_account: BillingAccountRef,
    pub labels: Labels,
}

impl ProjectDetails {
    /// Human-readable multi-line rendering.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&format!("project: {}\n", self.project));
        buf.push_str(&format!("billing_account: {}\n", self.billing_account));
        if self.labels.is_empty() {
            buf.push_str("labels: (none)\n");
        } else {
            buf.push_str("labels:\n");
            for (key, value) in &self.labels {
                buf.push_str(&format!("- {key}: {value}\n"));
            }
        }
        buf
    }
}

pub fn describe_project<C: Cloud>(cloud: &C, project: &ProjectRef) -> Result<ProjectDetails> {
    let billing_account = cloud
        .current_billing(project)
        .with_context(|| format!("get billing info for {project}"))?;
    let labels = cloud
        .labels(project)
        .with_context(|| format!("get labels for {project}"))?;
    Ok(ProjectDetails {
        project: project.clone(),
        billing_account,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCloud, account, project};

    #[test]
    fn audit_reports_inaccessible_projects() {
        let cloud = FakeCloud::new()
            .with_account("111-AAA")
            .with_account("222-BBB")
            .with_project("proj-1", "111-AAA")
            .with_project("proj-2", "111-AAA")
            .with_project("proj-3", "222-BBB")
            .fail_current_billing("proj-2")
            .fail_list_projects("222-BBB");

        let report = audit_billing_info(&cloud, None).expect("audit");

        assert_eq!(report.accounts_scanned, 2);
        assert_eq!(report.projects_scanned, 2);
        assert_eq!(report.inaccessible.len(), 1);
        assert_eq!(report.inaccessible[0].project, project("proj-2"));
        assert_eq!(report.inaccessible[0].listed_under, account("111-AAA"));
        assert_eq!(report.failed_sources.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn audit_with_source_scans_only_that_account() {
        let cloud = FakeCloud::new()
            .with_account("111-AAA")
            .with_account("222-BBB")
            .with_project("proj-1", "111-AAA")
            .with_project("proj-3", "222-BBB");

        let report = audit_billing_info(&cloud, Some(&account("222-BBB"))).expect("audit");

        assert_eq!(report.accounts_scanned, 1);
        assert_eq!(report.projects_scanned, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn describe_renders_sorted_labels() {
        let cloud = FakeCloud::new()
            .with_account("111-AAA")
            .with_project("proj-1", "111-AAA")
            .with_label("proj-1", "team", "data")
            .with_label("proj-1", "env", "prod");

        let details = describe_project(&cloud, &project("proj-1")).expect("describe");

        assert_eq!(
            details.render(),
            "project: proj-1\nbilling_account: billingAccounts/111-AAA\nlabels:\n- env: prod\n- team: data\n"
        );
    }

    #[test]
    fn describe_unknown_project_errors() {
        let cloud = FakeCloud::new();
        let err = describe_project(&cloud, &project("missing")).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }
}

//! Cloud collaborator abstraction.
//!
//! The [`Cloud`] trait decouples the migration engine from the billing and
//! resource-manager backends. Every mutating call is an idempotent set
//! operation. Tests use the in-memory fake in `test_support`; the CLI uses
//! [`StateFileCloud`], which keeps the whole account/project state in a JSON
//! document on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{BillingAccountRef, Labels, ProjectRef};

/// Abstraction over the billing and project APIs.
pub trait Cloud {
    /// All billing accounts visible to the caller.
    fn list_billing_accounts(&self) -> Result<Vec<BillingAccountRef>>;

    /// Projects currently linked to `account`.
    fn list_projects(&self, account: &BillingAccountRef) -> Result<Vec<ProjectRef>>;

    /// Billing account `project` is linked to.
    fn current_billing(&self, project: &ProjectRef) -> Result<BillingAccountRef>;

    /// Link `project` to `account`.
    fn set_billing(&self, project: &ProjectRef, account: &BillingAccountRef) -> Result<()>;

    /// Labels currently attached to `project`.
    fn labels(&self, project: &ProjectRef) -> Result<Labels>;

    /// Replace the full label map of `project`.
    fn set_labels(&self, project: &ProjectRef, labels: &Labels) -> Result<()>;
}

/// Persisted cloud state used by [`StateFileCloud`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudState {
    pub billing_accounts: Vec<BillingAccountRef>,
    pub projects: BTreeMap<ProjectRef, ProjectState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub billing_account: Option<BillingAccountRef>,
    #[serde(default)]
    pub labels: Labels,
    /// Billing info for this project cannot be read (permission or API issue).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub billing_info_inaccessible: bool,
}

impl CloudState {
    pub(crate) fn project(&self, project: &ProjectRef) -> Result<&ProjectState> {
        self.projects
            .get(project)
            .ok_or_else(|| anyhow!("project {project} not found"))
    }

    pub(crate) fn project_mut(&mut self, project: &ProjectRef) -> Result<&mut ProjectState> {
        self.projects
            .get_mut(project)
            .ok_or_else(|| anyhow!("project {project} not found"))
    }

    pub(crate) fn ensure_account(&self, account: &BillingAccountRef) -> Result<()> {
        if self.billing_accounts.contains(account) {
            return Ok(());
        }
        Err(anyhow!("billing account {account} not found"))
    }
}

/// [`Cloud`] backed by a JSON state document.
///
/// Each call re-reads the document; each mutation rewrites it atomically.
#[derive(Debug, Clone)]
pub struct StateFileCloud {
    path: PathBuf,
}

impl StateFileCloud {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CloudState> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read cloud state {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse cloud state {}", self.path.display()))
    }

    pub fn store(&self, state: &CloudState) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(state).context("serialize cloud state")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    fn update(&self, apply: impl FnOnce(&mut CloudState) -> Result<()>) -> Result<()> {
        let mut state = self.load()?;
        apply(&mut state)?;
        self.store(&state)
    }
}

impl Cloud for StateFileCloud {
    fn list_billing_accounts(&self) -> Result<Vec<BillingAccountRef>> {
        Ok(self.load()?.billing_accounts)
    }

    fn list_projects(&self, account: &BillingAccountRef) -> Result<Vec<ProjectRef>> {
        let state = self.load()?;
        state.ensure_account(account)?;
        Ok(state
            .projects
            .iter()
            .filter(|(_, project)| project.billing_account.as_ref() == Some(account))
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn current_billing(&self, project: &ProjectRef) -> Result<BillingAccountRef> {
        let state = self.load()?;
        let entry = state.project(project)?;
        if entry.billing_info_inaccessible {
            return Err(anyhow!("billing info for project {project} is not accessible"));
        }
        entry
            .billing_account
            .clone()
            .ok_or_else(|| anyhow!("project {project} has billing disabled"))
    }

    fn set_billing(&self, project: &ProjectRef, account: &BillingAccountRef) -> Result<()> {
        debug!(%project, %account, "set billing");
        self.update(|state| {
            state.ensure_account(account)?;
            state.project_mut(project)?.billing_account = Some(account.clone());
            Ok(())
        })
    }

    fn labels(&self, project: &ProjectRef) -> Result<Labels> {
        Ok(self.load()?.project(project)?.labels.clone())
    }

    fn set_labels(&self, project: &ProjectRef, labels: &Labels) -> Result<()> {
        debug!(%project, count = labels.len(), "set labels");
        self.update(|state| {
            state.project_mut(project)?.labels = labels.clone();
            Ok(())
        })
    }
}

/// Atomically write `contents` to `path` (temp file + rename).
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

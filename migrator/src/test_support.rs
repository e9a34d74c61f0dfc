//! Test-only helpers: an in-memory [`Cloud`] with failure injection and a
//! scratch workspace for CLI tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{BillingAccountRef, Labels, ProjectRef};
use crate::io::cloud::{Cloud, CloudState, ProjectState, StateFileCloud};

/// Shorthand for a billing account ref.
pub fn account(id: &str) -> BillingAccountRef {
    BillingAccountRef::new(id)
}

/// Shorthand for a project ref.
pub fn project(id: &str) -> ProjectRef {
    ProjectRef::new(id)
}

/// Calls that can be made to fail on demand.
#[derive(Debug, Default)]
struct Failures {
    list_accounts: bool,
    list_projects: BTreeSet<BillingAccountRef>,
    current_billing: BTreeSet<ProjectRef>,
    set_billing: BTreeSet<ProjectRef>,
    get_labels: BTreeSet<ProjectRef>,
    set_labels: BTreeSet<ProjectRef>,
}

/// In-memory [`Cloud`] that records how many mutating calls were made.
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: RefCell<CloudState>,
    failures: RefCell<Failures>,
    mutation_calls: Cell<usize>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, id: &str) -> Self {
        self.state.borrow_mut().billing_accounts.push(account(id));
        self
    }

    pub fn with_project(self, id: &str, billing: &str) -> Self {
        self.state.borrow_mut().projects.insert(
            project(id),
            ProjectState {
                billing_account: Some(account(billing)),
                ..ProjectState::default()
            },
        );
        self
    }

    pub fn with_label(self, id: &str, key: &str, value: &str) -> Self {
        if let Some(entry) = self.state.borrow_mut().projects.get_mut(&project(id)) {
            entry.labels.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn fail_list_accounts(self) -> Self {
        self.failures.borrow_mut().list_accounts = true;
        self
    }

    pub fn fail_list_projects(self, account_id: &str) -> Self {
        self.failures
            .borrow_mut()
            .list_projects
            .insert(account(account_id));
        self
    }

    pub fn fail_current_billing(self, id: &str) -> Self {
        self.failures.borrow_mut().current_billing.insert(project(id));
        self
    }

    pub fn fail_set_billing(self, id: &str) -> Self {
        self.failures.borrow_mut().set_billing.insert(project(id));
        self
    }

    pub fn fail_get_labels(self, id: &str) -> Self {
        self.failures.borrow_mut().get_labels.insert(project(id));
        self
    }

    pub fn fail_set_labels(self, id: &str) -> Self {
        self.failures.borrow_mut().set_labels.insert(project(id));
        self
    }

    /// Stop injecting any failures.
    pub fn heal(&self) {
        *self.failures.borrow_mut() = Failures::default();
    }

    pub fn snapshot(&self) -> CloudState {
        self.state.borrow().clone()
    }

    pub fn billing_of(&self, id: &str) -> Option<BillingAccountRef> {
        self.state
            .borrow()
            .projects
            .get(&project(id))
            .and_then(|entry| entry.billing_account.clone())
    }

    pub fn labels_of(&self, id: &str) -> Labels {
        self.state
            .borrow()
            .projects
            .get(&project(id))
            .map(|entry| entry.labels.clone())
            .unwrap_or_default()
    }

    /// Number of `set_billing` + `set_labels` calls attempted so far.
    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.get()
    }

    fn count_mutation(&self) {
        self.mutation_calls.set(self.mutation_calls.get() + 1);
    }
}

impl Cloud for FakeCloud {
    fn list_billing_accounts(&self) -> Result<Vec<BillingAccountRef>> {
        if self.failures.borrow().list_accounts {
            return Err(anyhow!("injected list_billing_accounts failure"));
        }
        Ok(self.state.borrow().billing_accounts.clone())
    }

    fn list_projects(&self, account: &BillingAccountRef) -> Result<Vec<ProjectRef>> {
        if self.failures.borrow().list_projects.contains(account) {
            return Err(anyhow!("injected list_projects failure for {account}"));
        }
        let state = self.state.borrow();
        state.ensure_account(account)?;
        Ok(state
            .projects
            .iter()
            .filter(|(_, entry)| entry.billing_account.as_ref() == Some(account))
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn current_billing(&self, project: &ProjectRef) -> Result<BillingAccountRef> {
        if self.failures.borrow().current_billing.contains(project) {
            return Err(anyhow!("injected current_billing failure for {project}"));
        }
        self.state
            .borrow()
            .project(project)?
            .billing_account
            .clone()
            .ok_or_else(|| anyhow!("project {project} has billing disabled"))
    }

    fn set_billing(&self, project: &ProjectRef, account: &BillingAccountRef) -> Result<()> {
        self.count_mutation();
        if self.failures.borrow().set_billing.contains(project) {
            return Err(anyhow!("injected set_billing failure for {project}"));
        }
        let mut state = self.state.borrow_mut();
        state.ensure_account(account)?;
        state.project_mut(project)?.billing_account = Some(account.clone());
        Ok(())
    }

    fn labels(&self, project: &ProjectRef) -> Result<Labels> {
        if self.failures.borrow().get_labels.contains(project) {
            return Err(anyhow!("injected labels failure for {project}"));
        }
        Ok(self.state.borrow().project(project)?.labels.clone())
    }

    fn set_labels(&self, project: &ProjectRef, labels: &Labels) -> Result<()> {
        self.count_mutation();
        if self.failures.borrow().set_labels.contains(project) {
            return Err(anyhow!("injected set_labels failure for {project}"));
        }
        self.state.borrow_mut().project_mut(project)?.labels = labels.clone();
        Ok(())
    }
}

/// Scratch directory holding a state file and a log directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create a workspace whose state file contains `state`.
    pub fn new(state: &CloudState) -> Result<Self> {
        let workspace = Self {
            dir: tempfile::tempdir()?,
        };
        workspace.cloud().store(state)?;
        std::fs::create_dir_all(workspace.log_dir())?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_path(&self) -> PathBuf {
        self.path().join("cloud.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.path().join("logs")
    }

    pub fn cloud(&self) -> StateFileCloud {
        StateFileCloud::new(self.state_path())
    }

    /// Operation log files written so far, sorted by name.
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.log_dir())? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

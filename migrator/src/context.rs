//! Explicit run state threaded through migration and revert.
//!
//! Holds the dry-run switch, the operation log being written (live migration
//! only), and the per-project failures collected along the way.

use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

use crate::core::types::Operation;
use crate::error::MigrationError;
use crate::io::oplog::OperationLog;

#[derive(Debug)]
pub struct RunContext {
    dry_run: bool,
    log: Option<OperationLog>,
    failures: Vec<MigrationError>,
    applied: usize,
}

impl RunContext {
    /// Context for a run that records nothing (dry runs and reverts).
    pub fn unlogged(dry_run: bool) -> Self {
        Self {
            dry_run,
            log: None,
            failures: Vec::new(),
            applied: 0,
        }
    }

    /// Context for a live migration that appends to `log`.
    pub fn logged(log: OperationLog) -> Self {
        Self {
            dry_run: false,
            log: Some(log),
            failures: Vec::new(),
            applied: 0,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Note a mutation confirmed by the cloud.
    ///
    /// Appends it to the operation log when one is attached. A log write
    /// failure is returned and must abort the run.
    pub fn confirm(&mut self, operation: Operation) -> Result<()> {
        self.note_applied();
        match self.log.as_mut() {
            Some(log) => log.append(operation),
            None => Ok(()),
        }
    }

    /// Count a confirmed mutation that is not recorded in any log.
    pub fn note_applied(&mut self) {
        self.applied += 1;
    }

    /// Record a recoverable per-project or per-source failure.
    pub fn fail(&mut self, error: MigrationError) {
        warn!(error = %error, "operation failed");
        self.failures.push(error);
    }

    pub fn failures(&self) -> &[MigrationError] {
        &self.failures
    }

    /// Number of confirmed mutations.
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn into_parts(self) -> (Option<PathBuf>, usize, Vec<MigrationError>) {
        let log_path = self.log.map(|log| log.path().to_path_buf());
        (log_path, self.applied, self.failures)
    }
}

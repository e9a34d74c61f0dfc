//! Error taxonomy for migration and revert runs.
//!
//! Per-project failures (`Discovery`, `Mutation`) are recovered locally and
//! aggregated into the run summary. Log integrity failures (`LogIo`,
//! `LogFormat`) are fatal for the action being attempted; they travel inside
//! `anyhow::Error` and can be recovered with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{BillingAccountRef, ProjectRef};

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Enumerating projects under a source account failed.
    #[error("discovery failed for {account}: {message}")]
    Discovery {
        account: BillingAccountRef,
        message: String,
    },

    /// A label or billing call failed for one project.
    #[error("{operation} failed for project {project}: {message}")]
    Mutation {
        project: ProjectRef,
        operation: &'static str,
        message: String,
    },

    /// The operation log could not be read or written.
    #[error("operation log {}: {message}", .path.display())]
    LogIo { path: PathBuf, message: String },

    /// The operation log is malformed. `index` is `None` when the document
    /// itself is not a JSON array.
    #[error("operation log {}{}: {message}", .path.display(), record_suffix(.index))]
    LogFormat {
        path: PathBuf,
        index: Option<usize>,
        message: String,
    },
}

fn record_suffix(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!(" record {index}"),
        None => String::new(),
    }
}

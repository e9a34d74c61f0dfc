//! I/O helpers for migrator commands.

pub mod cloud;
pub mod config;
pub mod oplog;

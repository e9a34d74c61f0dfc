//! Stable exit codes for the billing-migrator CLI.

/// Every operation succeeded (or a dry run completed).
pub const OK: i32 = 0;
/// Invalid arguments/config, or a fatal error such as an unwritable operation log.
pub const INVALID: i32 = 1;
/// The run completed but at least one source or project failed.
pub const PARTIAL_FAILURE: i32 = 2;

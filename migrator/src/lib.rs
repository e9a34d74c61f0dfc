//! Billing account migration engine with a replayable operation log.
//!
//! Projects are moved from their current billing accounts onto one target
//! account. Each project is first labeled with the id of the account it came
//! from, then moved. Live runs record every confirmed change so a later revert
//! can undo them in reverse order. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, label rules, planning,
//!   inversion). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (cloud calls, operation log files,
//!   configuration). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`discover`], [`migrate`], [`revert`], [`inspect`])
//! coordinate core logic with I/O to implement CLI actions.

pub mod context;
pub mod core;
pub mod discover;
pub mod error;
pub mod exit_codes;
pub mod inspect;
pub mod io;
pub mod logging;
pub mod migrate;
pub mod revert;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

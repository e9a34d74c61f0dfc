//! Deterministic, pure logic shared by the migration engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod label;
pub mod plan;
pub mod types;

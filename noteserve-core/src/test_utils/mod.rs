//! Test utilities shared by unit tests, integration tests and benches
//!
//! Fixtures build a store, recorder and protocol handler over an in-memory
//! database driven by a manual clock. Assertions check the sequence-number
//! invariants directly against the stored rows.

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

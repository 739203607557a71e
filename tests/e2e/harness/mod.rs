//! E2E test harness for capmap.
//!
//! This module contains test infrastructure with builders, variants, and
//! helpers that not every scenario uses.

#![allow(dead_code)]

pub mod assertions;
pub mod runner;
pub mod steps;
pub mod workspace;

// Re-export commonly used types
pub use assertions::{Assertion, LockStateMatch};
pub use runner::Names;
pub use scenario::Scenario;

//! Test infrastructure for the persistence layer.
//!
//! Shared resource types, fixtures and the [`contract_test!`] macro that runs
//! one test body against every backend.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;

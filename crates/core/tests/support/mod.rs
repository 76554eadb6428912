//! Shared test helpers for `worktrack-core` integration tests.
//!
//! An in-memory store with real transaction semantics, a settable clock and
//! a handful of fixtures, so the scenario tests read as scenarios.
#![allow(dead_code)]

pub mod fixtures;
pub mod memory;

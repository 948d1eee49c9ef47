//! Test utilities for the slive benchmark harness.
//!
//! This crate provides utilities to facilitate testing of the slive crates. See the modules for
//! all available utilities.

pub mod storage;
pub mod tracing;

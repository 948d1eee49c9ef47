//! The `slive` benchmark binary.
//!
//! A run launches a number of workers from [`slive_service`], each cycling through a list of
//! storage operations. Every operation yields a metric record, which the orchestrator in [`run`]
//! collects, groups by operation type and reduces into per-operation summaries. The result is
//! written as a [`report::Report`] and printed to the console.
//!
//! Configuration is layered from defaults, a YAML file, `SLIVE__` environment variables and
//! command line flags. See [`config`] for details. The [`plan`] module writes the schedule of a
//! run to a file without executing it.

pub mod cli;
pub mod config;
pub mod observability;
pub mod plan;
pub mod report;
pub mod run;

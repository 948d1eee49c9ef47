//! Shared types for the slive benchmark harness.
//!
//! Every storage operation executed by a worker produces a [`MetricRecord`]: a single typed
//! measurement tagged with the operation it belongs to (`write`, `read`, ...) and the kind of
//! value it captured (`duration`, `error`, ...). Records are identified by a [`MetricKey`] with
//! the textual grammar `DATATYPE:operationType*measurementType`, for example
//! `LONG:write*duration`.
//!
//! Records sharing an operation and measurement type can be combined with
//! [`MetricRecord::merge`], which follows a type-directed promotion ladder. The reducer consumes
//! records in their [`Sample`] form, `measurementType:value`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod error;
mod merge;
mod record;
mod sample;

pub use error::{Error, FormatError, Result};
pub use record::{DataType, MetricKey, MetricRecord, MetricValue, check_name};
pub use sample::Sample;

/// Measurement type of a successful operation, carrying its elapsed milliseconds.
pub const DURATION: &str = "duration";
/// Measurement type of a failed operation, carrying its elapsed milliseconds.
pub const ERROR: &str = "error";
/// Measurement type of an operation that was deliberately not performed.
pub const SKIPPED: &str = "skipped";
/// Operation type recorded for names that cannot appear in a key.
pub const INVALID_OPERATION: &str = "invalid_operation";

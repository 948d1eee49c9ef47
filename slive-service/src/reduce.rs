//! Per-operation statistics over worker samples.
//!
//! The aggregator consumes the reducer entry form of records, `measurementType:value`, for a
//! single operation type and produces a [`Summary`]. Every sample counts towards the timing
//! statistics, failures included. Error samples additionally count towards `errorCount`.
//! Skipped samples describe operations that never ran and are ignored. Malformed entries are
//! logged and skipped without affecting any statistic.

use std::fmt;

use serde::{Deserialize, Serialize};
use slive_types::{MetricRecord, Sample};

/// Timing statistics of one operation type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// The summarized operation type.
    pub operation: String,
    /// Number of samples.
    pub count: u64,
    /// Number of failed samples.
    pub error_count: u64,
    /// Sum of all values in milliseconds.
    pub total_time: i64,
    /// `total_time / count`, rounded towards zero.
    pub avg_time: i64,
    /// Smallest value.
    pub min_time: i64,
    /// Largest value.
    pub max_time: i64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation={}, Count={}, errorCount={}, totalTime={}, avgTime={}, minTime={}, maxTime={}",
            self.operation,
            self.count,
            self.error_count,
            self.total_time,
            self.avg_time,
            self.min_time,
            self.max_time
        )
    }
}

/// Accumulates samples of one operation type.
#[derive(Clone, Debug)]
pub struct Aggregator {
    operation: String,
    count: u64,
    error_count: u64,
    total_time: i64,
    min_time: i64,
    max_time: i64,
    malformed: u64,
    skipped: u64,
}

impl Aggregator {
    /// Creates an empty aggregator for `operation`.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            count: 0,
            error_count: 0,
            total_time: 0,
            min_time: i64::MAX,
            max_time: i64::MIN,
            malformed: 0,
            skipped: 0,
        }
    }

    /// Adds a sample in `measurementType:value` form.
    pub fn consume(&mut self, entry: &str) {
        let sample = match Sample::parse(entry) {
            Ok(sample) => sample,
            Err(error) => {
                self.malformed += 1;
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    operation = self.operation,
                    entry,
                    "skipping malformed sample"
                );
                return;
            }
        };

        if sample.is_skipped() {
            self.skipped += 1;
            tracing::debug!(operation = self.operation, "ignoring skipped sample");
            return;
        }

        if sample.is_error() {
            self.error_count += 1;
        }

        self.count += 1;
        self.total_time = self.total_time.saturating_add(sample.value);
        self.min_time = self.min_time.min(sample.value);
        self.max_time = self.max_time.max(sample.value);
    }

    /// Adds a single, unmerged record.
    pub fn consume_record(&mut self, record: &MetricRecord) {
        self.consume(&record.to_sample());
    }

    /// Returns the number of entries rejected so far.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Returns the number of skipped samples seen so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Produces the summary, or `None` if no valid sample was consumed.
    pub fn finish(&self) -> Option<Summary> {
        if self.count == 0 {
            tracing::debug!(operation = self.operation, "no valid samples");
            return None;
        }

        Some(Summary {
            operation: self.operation.clone(),
            count: self.count,
            error_count: self.error_count,
            total_time: self.total_time,
            avg_time: self.total_time / self.count as i64,
            min_time: self.min_time,
            max_time: self.max_time,
        })
    }
}

/// Summarizes all `entries` of one operation type.
pub fn reduce<I>(operation: &str, entries: I) -> Option<Summary>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut aggregator = Aggregator::new(operation);
    for entry in entries {
        aggregator.consume(entry.as_ref());
    }
    aggregator.finish()
}

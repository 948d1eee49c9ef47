//! The artifact written at the end of a run.
//!
//! A report is plain text in three sections:
//!
//! ```text
//! # slive report
//! run_id: 0190c5a4-9d7e-7c12-8a4f-3e1b2c9d0f11
//! storage: memory
//! ...
//!
//! # summary
//! operation	count	total_ms	avg_ms	min_ms	max_ms	errors
//! write	2	30	15	10	20	0
//!
//! # totals
//! LONG:write*duration	30	2
//! ```
//!
//! Totals lines carry the record key, the merged value and the number of merged records.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use bytesize::ByteSize;
use slive_service::ExecutionMode;
use slive_service::reduce::Summary;
use slive_types::MetricRecord;
use thiserror::Error;
use uuid::Uuid;
use yansi::Paint;

const REPORT_HEADER: &str = "# slive report";
const SUMMARY_HEADER: &str = "# summary";
const TOTALS_HEADER: &str = "# totals";
const SUMMARY_COLUMNS: &str = "operation\tcount\ttotal_ms\tavg_ms\tmin_ms\tmax_ms\terrors";

/// Errors produced when reading a report back.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The text does not start with the report header.
    #[error("not a slive report")]
    MissingHeader,
    /// A required header field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A header field has an unparsable value.
    #[error("invalid value `{value}` for field `{field}`")]
    InvalidField {
        /// Name of the field.
        field: &'static str,
        /// The offending value.
        value: String,
    },
    /// A line does not belong to any known section or has the wrong shape.
    #[error("malformed line {line}: `{text}`")]
    MalformedLine {
        /// One-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },
    /// A totals line contains an invalid record.
    #[error("invalid record on line {line}")]
    InvalidRecord {
        /// One-based line number.
        line: usize,
        /// The parse failure.
        #[source]
        source: slive_types::Error,
    },
}

/// The settings a run was started with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
    /// The storage description, such as `memory` or `filesystem:data`.
    pub storage: String,
    /// Directory under which all benchmark paths were created.
    pub base_dir: String,
    /// Operation mix every worker cycled through.
    pub operations: Vec<String>,
    /// Number of workers.
    pub workers: u32,
    /// Operations per worker.
    pub ops_per_worker: u64,
    /// Size of written files in mebibytes.
    pub file_size_mb: u64,
    /// Concurrent operations per worker.
    pub pool_size: usize,
    /// How workers invoked their executors.
    pub mode: ExecutionMode,
    /// Wall clock time of the run in milliseconds.
    pub elapsed_ms: u64,
}

/// The outcome of one benchmark run.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Settings of the run.
    pub parameters: Parameters,
    /// One summary per operation type, sorted by operation.
    pub summaries: Vec<Summary>,
    /// Merged records per operation and measurement type.
    pub totals: Vec<MetricRecord>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = &self.parameters;
        writeln!(f, "{REPORT_HEADER}")?;
        writeln!(f, "run_id: {}", self.run_id)?;
        writeln!(f, "storage: {}", params.storage)?;
        writeln!(f, "base_dir: {}", params.base_dir)?;
        writeln!(f, "operations: {}", params.operations.join(","))?;
        writeln!(f, "workers: {}", params.workers)?;
        writeln!(f, "ops_per_worker: {}", params.ops_per_worker)?;
        writeln!(f, "file_size_mb: {}", params.file_size_mb)?;
        writeln!(f, "pool_size: {}", params.pool_size)?;
        writeln!(f, "mode: {}", params.mode)?;
        writeln!(f, "elapsed_ms: {}", params.elapsed_ms)?;

        writeln!(f)?;
        writeln!(f, "{SUMMARY_HEADER}")?;
        writeln!(f, "{SUMMARY_COLUMNS}")?;
        for s in &self.summaries {
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                s.operation,
                s.count,
                s.total_time,
                s.avg_time,
                s.min_time,
                s.max_time,
                s.error_count
            )?;
        }

        writeln!(f)?;
        writeln!(f, "{TOTALS_HEADER}")?;
        for record in &self.totals {
            writeln!(
                f,
                "{}\t{}\t{}",
                record.key_string(),
                record.output_value(),
                record.count()
            )?;
        }

        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Summary,
    Totals,
}

#[derive(Default)]
struct HeaderFields<'a> {
    run_id: Option<&'a str>,
    storage: Option<&'a str>,
    base_dir: Option<&'a str>,
    operations: Option<&'a str>,
    workers: Option<&'a str>,
    ops_per_worker: Option<&'a str>,
    file_size_mb: Option<&'a str>,
    pool_size: Option<&'a str>,
    mode: Option<&'a str>,
    elapsed_ms: Option<&'a str>,
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ReportError> {
    value.ok_or(ReportError::MissingField(field))
}

fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    value: Option<&str>,
) -> Result<T, ReportError> {
    let value = required(field, value)?;
    value.parse().map_err(|_| ReportError::InvalidField {
        field,
        value: value.to_owned(),
    })
}

impl Report {
    /// Parses a report from its textual form.
    pub fn parse(text: &str) -> Result<Self, ReportError> {
        let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));
        match lines.next() {
            Some((_, REPORT_HEADER)) => (),
            _ => return Err(ReportError::MissingHeader),
        }

        let mut section = Section::Header;
        let mut header = HeaderFields::default();
        let mut summaries = Vec::new();
        let mut totals = Vec::new();

        for (number, line) in lines {
            let malformed = || ReportError::MalformedLine {
                line: number,
                text: line.to_owned(),
            };

            match line {
                "" => continue,
                SUMMARY_HEADER => {
                    section = Section::Summary;
                    continue;
                }
                TOTALS_HEADER => {
                    section = Section::Totals;
                    continue;
                }
                SUMMARY_COLUMNS if section == Section::Summary => continue,
                _ => (),
            }

            match section {
                Section::Header => {
                    let (name, value) = line.split_once(": ").ok_or_else(malformed)?;
                    let slot = match name {
                        "run_id" => &mut header.run_id,
                        "storage" => &mut header.storage,
                        "base_dir" => &mut header.base_dir,
                        "operations" => &mut header.operations,
                        "workers" => &mut header.workers,
                        "ops_per_worker" => &mut header.ops_per_worker,
                        "file_size_mb" => &mut header.file_size_mb,
                        "pool_size" => &mut header.pool_size,
                        "mode" => &mut header.mode,
                        "elapsed_ms" => &mut header.elapsed_ms,
                        _ => return Err(malformed()),
                    };
                    *slot = Some(value);
                }
                Section::Summary => {
                    summaries.push(parse_summary(line).ok_or_else(malformed)?);
                }
                Section::Totals => {
                    let (key, rest) = line.split_once('\t').ok_or_else(malformed)?;
                    let (value, count) = rest.rsplit_once('\t').ok_or_else(malformed)?;
                    let count = count.parse().map_err(|_| malformed())?;
                    let record = MetricRecord::parse(key, value)
                        .and_then(|record| record.with_count(count))
                        .map_err(|source| ReportError::InvalidRecord {
                            line: number,
                            source,
                        })?;
                    totals.push(record);
                }
            }
        }

        let parameters = Parameters {
            storage: required("storage", header.storage)?.to_owned(),
            base_dir: required("base_dir", header.base_dir)?.to_owned(),
            operations: required("operations", header.operations)?
                .split(',')
                .filter(|op| !op.is_empty())
                .map(String::from)
                .collect(),
            workers: parse_field("workers", header.workers)?,
            ops_per_worker: parse_field("ops_per_worker", header.ops_per_worker)?,
            file_size_mb: parse_field("file_size_mb", header.file_size_mb)?,
            pool_size: parse_field("pool_size", header.pool_size)?,
            mode: parse_field("mode", header.mode)?,
            elapsed_ms: parse_field("elapsed_ms", header.elapsed_ms)?,
        };

        Ok(Self {
            run_id: parse_field("run_id", header.run_id)?,
            parameters,
            summaries,
            totals,
        })
    }

    /// Returns the wall clock time of the run.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.parameters.elapsed_ms)
    }
}

fn parse_summary(line: &str) -> Option<Summary> {
    let mut columns = line.split('\t');
    let operation = columns.next()?.to_owned();
    let mut next = || columns.next()?.parse::<i64>().ok();

    let count = next()?;
    let total_time = next()?;
    let avg_time = next()?;
    let min_time = next()?;
    let max_time = next()?;
    let error_count = next()?;
    if columns.next().is_some() {
        return None;
    }

    Some(Summary {
        operation,
        count: count.try_into().ok()?,
        error_count: error_count.try_into().ok()?,
        total_time,
        avg_time,
        min_time,
        max_time,
    })
}

/// Writes `report` to `path`, replacing any existing file.
pub async fn write_report(report: &Report, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    tokio::fs::write(path, report.to_string())
        .await
        .with_context(|| format!("failed to write report to {}", path.display()))?;

    tracing::info!(path = %path.display(), "report written");
    Ok(())
}

/// Reads a report previously written by [`write_report`].
pub async fn read_report(path: &Path) -> anyhow::Result<Report> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read report from {}", path.display()))?;

    Report::parse(&text).with_context(|| format!("failed to parse report {}", path.display()))
}

/// Prints a human readable rendition of `report` to stdout.
pub fn print_report(report: &Report) {
    let params = &report.parameters;
    let elapsed = report.elapsed();

    println!();
    println!("{} {}", "## Run".bold(), report.run_id.bold().blue());
    println!(
        "  storage: {}; workers: {}; ops/worker: {}; pool: {}; mode: {}",
        params.storage,
        params.workers.bold(),
        params.ops_per_worker.bold(),
        params.pool_size,
        params.mode
    );
    println!(
        "  file size: {}; operations: {}; elapsed: {:.2?}",
        ByteSize::mib(params.file_size_mb),
        params.operations.join(","),
        elapsed.bold()
    );

    for summary in &report.summaries {
        println!();
        print_summary(summary, elapsed);
    }

    if !report.totals.is_empty() {
        println!();
        println!("{}", "## TOTALS".bold());
        for record in &report.totals {
            println!(
                "  {}: {} ({} records)",
                record.key_string(),
                record.output_value().bold(),
                record.count()
            );
        }
    }
    println!();
}

fn print_summary(summary: &Summary, elapsed: Duration) {
    let label = format!("{}:", summary.operation.to_uppercase());
    print!("{} ({} ops", label.bold().green(), summary.count.bold());
    if summary.error_count > 0 {
        print!(
            ", {}",
            format!("{} FAILURES", summary.error_count).bold().red()
        );
    }
    println!(")");

    if !elapsed.is_zero() {
        let ops_ps = summary.count as f64 / elapsed.as_secs_f64();
        println!("  {:.2} operations/s", ops_ps.bold());
    }
    println!(
        "  avg: {}ms; min: {}ms; max: {}ms; total: {}ms",
        summary.avg_time.bold(),
        summary.min_time,
        summary.max_time,
        summary.total_time
    );
}

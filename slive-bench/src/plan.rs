//! Operation plans: the schedule of a run written out ahead of time.
//!
//! A plan has one `operation:key` line per scheduled operation, worker after worker, in the
//! order the workers of a run with the same configuration execute them. Every line carries a
//! fresh key.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use slive_service::{PROGRESS_INTERVAL, round_robin};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::Config;

/// One scheduled operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanEntry {
    /// The worker running the operation.
    pub task_id: u32,
    /// Position in the worker's schedule.
    pub index: u64,
    /// Name of the operation.
    pub operation: String,
    /// Unique key of this entry.
    pub key: Uuid,
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.operation, self.key)
    }
}

/// Returns the schedule of every worker of `config`.
pub fn generate_plan(config: &Config) -> impl Iterator<Item = PlanEntry> + '_ {
    (0..config.workers).flat_map(move |task_id| {
        round_robin(&config.operations, config.ops_per_worker).map(move |(index, op)| PlanEntry {
            task_id,
            index,
            operation: op.to_owned(),
            key: Uuid::now_v7(),
        })
    })
}

/// Validates `config` and writes its plan to `path`. Returns the number of entries written.
pub async fn write_plan(config: &Config, path: &Path) -> anyhow::Result<u64> {
    config.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create plan {}", path.display()))?;
    let mut writer = tokio::io::BufWriter::new(file);

    let mut written = 0;
    for entry in generate_plan(config) {
        writer.write_all(format!("{entry}\n").as_bytes()).await?;
        written += 1;
        if written % PROGRESS_INTERVAL == 0 {
            tracing::debug!(written, "generated plan entries");
        }
    }
    writer.flush().await?;

    tracing::info!(path = %path.display(), entries = written, "plan written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            operations: vec!["write".into(), "read".into(), "delete_file".into()],
            workers: 2,
            ops_per_worker: 4,
            ..Default::default()
        }
    }

    #[test]
    fn follows_worker_schedule() {
        let config = config();
        let plan: Vec<_> = generate_plan(&config).collect();

        assert_eq!(plan.len(), 8);
        let order: Vec<_> = plan
            .iter()
            .map(|e| (e.task_id, e.index, e.operation.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                (0, 0, "write"),
                (0, 1, "read"),
                (0, 2, "delete_file"),
                (0, 3, "write"),
                (1, 0, "write"),
                (1, 1, "read"),
                (1, 2, "delete_file"),
                (1, 3, "write"),
            ]
        );

        let mut keys: Vec<_> = plan.iter().map(|e| e.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 8);
    }

    #[tokio::test]
    async fn writes_one_line_per_operation() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("plan/slive-plan.txt");

        let written = write_plan(&config(), &path).await.unwrap();
        assert_eq!(written, 8);

        let text = std::fs::read_to_string(&path).unwrap();
        let ops: Vec<_> = text
            .lines()
            .map(|line| {
                let (op, key) = line.split_once(':').unwrap();
                assert!(key.parse::<Uuid>().is_ok(), "{line}");
                op
            })
            .collect();
        assert_eq!(
            ops,
            ["write", "read", "delete_file", "write", "write", "read", "delete_file", "write"]
        );
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("plan.txt");
        let config = Config {
            operations: Vec::new(),
            ..config()
        };

        assert!(write_plan(&config, &path).await.is_err());
        assert!(!path.exists());
    }
}

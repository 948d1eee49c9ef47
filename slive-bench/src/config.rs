//! Configuration for the slive benchmark.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags of `slive run`
//! 2. Environment variables (prefixed with `SLIVE__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `SLIVE__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `SLIVE__WORKERS=4` sets the number of workers
//! - `SLIVE__OPERATIONS=[mkdir,write,read]` sets the operation mix
//! - `SLIVE__STORAGE__TYPE=filesystem` sets the storage type
//! - `SLIVE__STORAGE__PATH=/data` sets the storage directory
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! workers: 4
//! operations: [mkdir, write, read]
//!
//! storage:
//!   type: filesystem
//!   path: /data
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use slive_service::{BuiltinOperation, ExecutionMode, MissingReadPolicy, WorkerConfig};
use slive_types::check_name;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "SLIVE__";

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem storage (type `"filesystem"`).
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /data
    /// ```
    FileSystem {
        /// Directory all benchmark paths are resolved against.
        ///
        /// The directory is created if it doesn't exist.
        ///
        /// # Default
        ///
        /// `"data"` (relative to the working directory)
        path: PathBuf,
    },

    /// Volatile in-memory storage (type `"memory"`).
    ///
    /// Measures the harness itself without touching a disk.
    Memory,
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::FileSystem { path } => write!(f, "filesystem:{}", path.display()),
            Storage::Memory => f.write_str("memory"),
        }
    }
}

/// How log lines are rendered on stderr.
///
/// Left on `auto`, the choice depends on whether stderr is a terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogFormat {
    /// [`LogFormat::Pretty`] on a terminal, [`LogFormat::Simplified`] otherwise.
    Auto,

    /// Compact, colored lines.
    ///
    /// ```text
    ///  INFO  slive_service::worker > worker started
    /// ```
    Pretty,

    /// Plain text without colors, suited for log files.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [slive_service::worker] INFO: worker started
    /// ```
    Simplified,

    /// One JSON object per line.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","fields":{"message":"worker started","task_id":0,"total":10000},"target":"slive_service::worker"}
    /// ```
    Json,
}

/// Error returned for an unknown [`LogFormat`] name.
#[derive(Clone, Debug, Error)]
#[error("unknown log format `{0}`, expected `auto`, `pretty`, `simplified` or `json`")]
pub struct FormatParseError(String);

impl LogFormat {
    const NAMES: [(&'static str, LogFormat); 4] = [
        ("auto", LogFormat::Auto),
        ("pretty", LogFormat::Pretty),
        ("simplified", LogFormat::Simplified),
        ("json", LogFormat::Json),
    ];
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::NAMES
            .iter()
            .find(|(_, format)| format == self)
            .map_or("auto", |(name, _)| name);
        f.write_str(name)
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(LogFormat::Auto);
        }

        Self::NAMES
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, format)| format)
            .ok_or_else(|| FormatParseError(s.to_owned()))
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Verbosity and format of the log output on stderr.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Most verbose level that is printed: one of TRACE, DEBUG, INFO, WARN, ERROR or OFF.
    ///
    /// A `RUST_LOG` variable, when set, replaces this with its own level or filter directives.
    ///
    /// **Important**: `DEBUG` and `TRACE` log every operation and distort the measurements.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `SLIVE__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options and examples.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `SLIVE__LOGGING__FORMAT`
    #[serde(with = "display_fromstr")]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for a benchmark run.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Storage the benchmark runs against.
    ///
    /// # Default
    ///
    /// Filesystem storage in the `data` directory.
    pub storage: Storage,

    /// Directory inside the storage under which all benchmark paths are created.
    ///
    /// # Default
    ///
    /// `slive`
    pub base_dir: String,

    /// Operations every worker cycles through in order.
    ///
    /// Listing an operation more than once increases its share of the mix. Unknown names are
    /// accepted and reported as failures with value `-1`.
    ///
    /// # Default
    ///
    /// `[mkdir, write, read, delete_dir, delete_file, ls]`
    pub operations: Vec<String>,

    /// Number of workers running in parallel.
    ///
    /// # Default
    ///
    /// `10`
    pub workers: u32,

    /// Number of operations each worker runs.
    ///
    /// # Default
    ///
    /// `10000`
    pub ops_per_worker: u64,

    /// Size of files created by `write`, in mebibytes.
    ///
    /// # Default
    ///
    /// `10`
    pub file_size_mb: u64,

    /// Maximum number of concurrently running operations per worker.
    ///
    /// # Default
    ///
    /// `10`
    pub pool_size: usize,

    /// Whether workers run their operations one by one or concurrently.
    ///
    /// # Default
    ///
    /// `concurrent`
    pub mode: ExecutionMode,

    /// What `read` records when its file was never written.
    ///
    /// # Default
    ///
    /// `error`
    pub missing_read: MissingReadPolicy,

    /// Seed for generated file contents. Each worker derives its own seed from it.
    ///
    /// # Default
    ///
    /// `None` (random)
    pub seed: Option<u64>,

    /// Path of the report written at the end of a run.
    ///
    /// # Default
    ///
    /// `slive-report.txt`
    pub output: PathBuf,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: Storage::FileSystem {
                path: PathBuf::from("data"),
            },
            base_dir: "slive".into(),
            operations: ["mkdir", "write", "read", "delete_dir", "delete_file", "ls"]
                .map(String::from)
                .into(),
            workers: 10,
            ops_per_worker: 10_000,
            file_size_mb: 10,
            pool_size: slive_service::DEFAULT_POOL_SIZE,
            mode: ExecutionMode::default(),
            missing_read: MissingReadPolicy::default(),
            seed: None,
            output: PathBuf::from("slive-report.txt"),
            logging: Logging::default(),
        }
    }
}

/// Values given on the command line, overriding all other sources.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Overrides {
    /// Overrides [`Config::workers`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,
    /// Overrides [`Config::ops_per_worker`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ops_per_worker: Option<u64>,
    /// Overrides [`Config::operations`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<String>>,
    /// Overrides [`Config::file_size_mb`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<u64>,
    /// Overrides [`Config::pool_size`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
    /// Overrides [`Config::mode`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    /// Overrides [`Config::base_dir`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,
    /// Overrides [`Config::output`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// A configuration that cannot be run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No operations were configured.
    #[error("at least one operation must be configured")]
    NoOperations,
    /// An operation name is empty or whitespace.
    #[error("operation at position {0} has an empty name")]
    BlankOperation(usize),
    /// An operation name contains a character reserved by the record key format.
    #[error("operation at position {0} contains `:` or `*`")]
    ReservedCharacter(usize),
    /// The worker count is zero.
    #[error("`workers` must be at least 1")]
    NoWorkers,
    /// The pool size is zero.
    #[error("`pool_size` must be at least 1")]
    NoPoolCapacity,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, &Overrides::default())
    }

    /// Loads configuration like [`load`](Self::load) and applies command line `overrides` last.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    pub fn load_with(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// Rejects configurations that cannot run, before any storage is touched.
    ///
    /// Unknown operation names only produce a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operations.is_empty() {
            return Err(ConfigError::NoOperations);
        }
        if let Some(position) = self.operations.iter().position(|op| op.trim().is_empty()) {
            return Err(ConfigError::BlankOperation(position));
        }
        if let Some(position) = self.operations.iter().position(|op| check_name(op).is_err()) {
            return Err(ConfigError::ReservedCharacter(position));
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.pool_size == 0 {
            return Err(ConfigError::NoPoolCapacity);
        }

        for op in &self.operations {
            if op.parse::<BuiltinOperation>().is_err() {
                tracing::warn!(operation = op, "unknown operation will be recorded as failed");
            }
        }

        Ok(())
    }

    /// Returns the settings of the worker with the given id.
    pub fn worker_config(&self, task_id: u32) -> WorkerConfig {
        WorkerConfig {
            task_id,
            operations: self.operations.clone(),
            ops_per_worker: self.ops_per_worker,
            base_dir: self.base_dir.clone(),
            file_size_mb: self.file_size_mb,
            pool_size: self.pool_size,
            mode: self.mode,
            missing_read: self.missing_read,
            seed: self.seed.map(|seed| seed.wrapping_add(task_id.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(
                config.storage,
                Storage::FileSystem {
                    path: PathBuf::from("data")
                }
            );
            assert_eq!(config.base_dir, "slive");
            assert_eq!(
                config.operations,
                ["mkdir", "write", "read", "delete_dir", "delete_file", "ls"]
            );
            assert_eq!(config.workers, 10);
            assert_eq!(config.ops_per_worker, 10_000);
            assert_eq!(config.file_size_mb, 10);
            assert_eq!(config.pool_size, 10);
            assert_eq!(config.mode, ExecutionMode::Concurrent);
            assert_eq!(config.missing_read, MissingReadPolicy::Error);
            assert_eq!(config.seed, None);
            assert_eq!(config.logging.level, LevelFilter::INFO);
            assert_eq!(config.logging.format, LogFormat::Auto);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SLIVE__STORAGE__TYPE", "memory");
            jail.set_env("SLIVE__WORKERS", "4");
            jail.set_env("SLIVE__OPERATIONS", "[write,read]");
            jail.set_env("SLIVE__MODE", "sequential");
            jail.set_env("SLIVE__MISSING_READ", "skip");
            jail.set_env("SLIVE__LOGGING__LEVEL", "debug");
            jail.set_env("SLIVE__LOGGING__FORMAT", "json");

            let config = Config::load(None).unwrap();

            assert_eq!(config.storage, Storage::Memory);
            assert_eq!(config.workers, 4);
            assert_eq!(config.operations, ["write", "read"]);
            assert_eq!(config.mode, ExecutionMode::Sequential);
            assert_eq!(config.missing_read, MissingReadPolicy::Skip);
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            storage:
                type: filesystem
                path: /tmp/slive
            operations: [mkdir, append_truncate]
            ops_per_worker: 50
            file_size_mb: 1
            seed: 42
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(
                config.storage,
                Storage::FileSystem {
                    path: PathBuf::from("/tmp/slive")
                }
            );
            assert_eq!(config.operations, ["mkdir", "append_truncate"]);
            assert_eq!(config.ops_per_worker, 50);
            assert_eq!(config.file_size_mb, 1);
            assert_eq!(config.seed, Some(42));

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml_and_flags_override_env() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            workers: 2
            pool_size: 3
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("SLIVE__WORKERS", "5");
            jail.set_env("SLIVE__POOL_SIZE", "6");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.workers, 5);
            assert_eq!(config.pool_size, 6);

            let overrides = Overrides {
                pool_size: Some(8),
                ..Default::default()
            };
            let config = Config::load_with(Some(tempfile.path()), &overrides).unwrap();
            assert_eq!(config.workers, 5);
            assert_eq!(config.pool_size, 8);

            Ok(())
        });
    }

    #[test]
    fn log_format_ignores_case() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SLIVE__LOGGING__FORMAT", "JSON");
            assert_eq!(Config::load(None).unwrap().logging.format, LogFormat::Json);

            jail.set_env("SLIVE__LOGGING__FORMAT", "Simplified");
            assert_eq!(
                Config::load(None).unwrap().logging.format,
                LogFormat::Simplified
            );

            Ok(())
        });

        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Auto);
    }

    #[test]
    fn rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SLIVE__MODE", "parallel");
            assert!(Config::load(None).is_err());

            jail.set_env("SLIVE__MODE", "concurrent");
            jail.set_env("SLIVE__LOGGING__FORMAT", "fancy");
            assert!(Config::load(None).is_err());

            Ok(())
        });
    }

    #[test]
    fn validation() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));

        let config = Config {
            operations: vec![],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoOperations));

        let config = Config {
            operations: vec!["write".into(), "  ".into()],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::BlankOperation(1)));

        let config = Config {
            operations: vec!["write".into(), "read".into(), "read:write".into()],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ReservedCharacter(2)));

        let config = Config {
            workers: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));

        let config = Config {
            pool_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoPoolCapacity));

        let config = Config {
            operations: vec!["write".into(), "explode".into()],
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn worker_seeds_differ() {
        let config = Config {
            seed: Some(10),
            ..Default::default()
        };

        assert_eq!(config.worker_config(0).seed, Some(10));
        assert_eq!(config.worker_config(3).seed, Some(13));
        assert_eq!(config.worker_config(3).task_id, 3);
        assert_eq!(Config::default().worker_config(1).seed, None);
    }
}

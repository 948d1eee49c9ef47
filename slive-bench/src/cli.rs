use std::path::{Path, PathBuf};

use anyhow::Result;
use argh::FromArgs;
use slive_service::ExecutionMode;

use crate::config::{Config, Overrides};
use crate::{observability, plan, report, run};

/// Concurrent benchmark harness for hierarchical storage.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Generate(GenerateCommand),
    Report(ReportCommand),
    Version(VersionCommand),
}

/// run a benchmark and write its report
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// number of parallel workers
    #[argh(option)]
    workers: Option<u32>,

    /// number of operations each worker runs
    #[argh(option)]
    ops_per_worker: Option<u64>,

    /// comma separated list of operations, cycled through in order
    #[argh(option)]
    operations: Option<String>,

    /// size of written files in MiB
    #[argh(option)]
    file_size: Option<u64>,

    /// maximum number of concurrent operations per worker
    #[argh(option)]
    pool_size: Option<usize>,

    /// directory under which all benchmark paths are created
    #[argh(option)]
    base_dir: Option<String>,

    /// path of the report file
    #[argh(option)]
    output: Option<PathBuf>,

    /// execution mode, `sequential` or `concurrent`
    #[argh(option)]
    mode: Option<ExecutionMode>,
}

impl RunCommand {
    fn overrides(&self) -> Overrides {
        Overrides {
            workers: self.workers,
            ops_per_worker: self.ops_per_worker,
            operations: self.operations.as_deref().map(split_operations),
            file_size_mb: self.file_size,
            pool_size: self.pool_size,
            mode: self.mode,
            base_dir: self.base_dir.clone(),
            output: self.output.clone(),
        }
    }
}

/// write the operation plan of a benchmark without running it
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "generate")]
struct GenerateCommand {
    /// number of parallel workers
    #[argh(option)]
    workers: Option<u32>,

    /// number of operations each worker runs
    #[argh(option)]
    ops_per_worker: Option<u64>,

    /// comma separated list of operations, cycled through in order
    #[argh(option)]
    operations: Option<String>,

    /// path of the plan file
    #[argh(option, default = "PathBuf::from(DEFAULT_PLAN_PATH)")]
    output: PathBuf,
}

const DEFAULT_PLAN_PATH: &str = "slive-plan.txt";

impl GenerateCommand {
    fn overrides(&self) -> Overrides {
        Overrides {
            workers: self.workers,
            ops_per_worker: self.ops_per_worker,
            operations: self.operations.as_deref().map(split_operations),
            ..Default::default()
        }
    }
}

/// print a previously written report
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "report")]
struct ReportCommand {
    /// path of the report file, defaults to the configured output
    #[argh(positional)]
    path: Option<PathBuf>,
}

/// print the slive version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn split_operations(list: &str) -> Vec<String> {
    list.split(',').map(|op| op.trim().to_owned()).collect()
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let overrides = match &args.command {
        Command::Run(command) => command.overrides(),
        Command::Generate(command) => command.overrides(),
        _ => Overrides::default(),
    };
    let config = Config::load_with(args.config.as_deref(), &overrides)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::initialize_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(_) => run_benchmark(&config).await,
            Command::Generate(GenerateCommand { output, .. }) => {
                generate_plan(&config, &output).await
            }
            Command::Report(ReportCommand { path }) => {
                show_report(&path.unwrap_or(config.output)).await
            }
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

async fn run_benchmark(config: &Config) -> Result<()> {
    let report = run::run(config).await?;
    report::print_report(&report);
    Ok(())
}

async fn generate_plan(config: &Config, path: &Path) -> Result<()> {
    let written = plan::write_plan(config, path).await?;
    println!("wrote {written} operations to {}", path.display());
    Ok(())
}

async fn show_report(path: &Path) -> Result<()> {
    let report = report::read_report(path).await?;
    report::print_report(&report);
    Ok(())
}

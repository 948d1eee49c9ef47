use std::env;
use std::io::IsTerminal;

use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

pub fn initialize_tracing(config: &Config) {
    let (level, env_filter) = parse_rust_log(config.logging.level);
    let format = format_layer(config.logging.format);

    tracing_subscriber::registry()
        .with(format.with_filter(level))
        .with(env_filter)
        .init();
}

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    match format {
        LogFormat::Pretty => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
        _ => layer.with_ansi(false).boxed(),
    }
}

/// Returns the maximum level to print and the per-crate filter.
///
/// `RUST_LOG` takes precedence over the configured `default` level. If it is not a plain level,
/// it is used literally as filter directive.
pub fn parse_rust_log(default: LevelFilter) -> (LevelFilter, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => default,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        slive=TRACE,\
        slive_bench=TRACE,\
        slive_service=TRACE,\
        slive_types=TRACE,\
        ",
    );

    (level, env_filter)
}

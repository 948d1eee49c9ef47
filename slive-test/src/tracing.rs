use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{Directive, LevelFilter};

const CRATE_NAMES: &[&str] = &["slive", "slive_bench", "slive_service", "slive_types"];

/// Overrides the level of the slive crates in tests, for example `SLIVE_TEST_LOG=trace`.
const LEVEL_ENV: &str = "SLIVE_TEST_LOG";

/// Initialize the logger for testing.
///
/// Logs go to the stdout captured by the Rust test runner. Other crates only log errors. The
/// slive crates log at `DEBUG`, since `TRACE` emits one event per benchmark operation.
///
/// # Example
///
/// ```
/// slive_test::tracing::init();
/// ```
pub fn init() {
    let level = std::env::var(LEVEL_ENV)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::DEBUG);

    let env_filter = CRATE_NAMES
        .iter()
        .filter_map(|name| format!("{name}={level}").parse::<Directive>().ok())
        .fold(EnvFilter::new("ERROR"), EnvFilter::add_directive);

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

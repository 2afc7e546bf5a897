//! Process-wide tracing setup for the `fieldsurvey` binary.
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Environment variable whose filter directive overrides `logging.level`.
pub const LOG_ENV: &str = "FIELDSURVEY_LOG";

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Installs the global subscriber. Output goes to stderr so command output on
/// stdout stays machine-readable. Fails if a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), InitError> {
    let filter = filter_for(config, std::env::var(LOG_ENV).ok().as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

fn filter_for(config: &LoggingConfig, env_override: Option<&str>) -> EnvFilter {
    env_override
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(&config.level))
}

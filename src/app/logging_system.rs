use super::config::{LogFormat, LogLevel};
use parking_lot::RwLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Logging initialization failed: {0}")]
    InitFailed(String),
}

/// Filter directives on top of the configured default level.
pub struct LoggingSystem {
    directives: RwLock<Vec<String>>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: RwLock::new(Vec::new()),
        }
    }

    /// HTTP client internals are noisy at debug level.
    pub fn add_default_directives(&self) {
        let mut directives = self.directives.write();
        for target in ["hyper", "reqwest", "h2"] {
            directives.push(format!("{target}=warn"));
        }
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut filter_parts = Vec::with_capacity(directives.len() + 1);
        // Default level first
        filter_parts.push(level_name(default_level).to_string());
        filter_parts.extend(directives.iter().cloned());
        filter_parts.join(",")
    }

    /// Installs the global subscriber. `RUST_LOG` wins over the built filter.
    pub fn initialize_tracing(
        &self,
        default_level: LogLevel,
        format: LogFormat,
    ) -> Result<(), LoggingError> {
        let filter_string = self.build_filter_string(default_level);
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&filter_string).map_err(|e| {
                LoggingError::InitFailed(format!("Failed to create EnvFilter with '{filter_string}': {e}"))
            })?,
        };

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        result.map_err(|e| LoggingError::InitFailed(format!("Failed to set global subscriber: {e}")))
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

pub fn setup_logging(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    let logging_system = LoggingSystem::new();
    logging_system.add_default_directives();
    logging_system.initialize_tracing(level, format)
}

use super::serde_helpers::{load_env_choice, load_env_opt, load_env_var};
use super::{BackendKind, ConfigError, LogFormat, LogLevel};
use crate::identity::{KeystoneCredentials, UrlType};
use crate::reliability::{RetryPolicy, RetryStrategy};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Remote service samples are forwarded to
    #[arg(long, env = "OS_BACKEND", default_value = "metric")]
    pub backend: BackendKind,

    /// Identity service URL
    #[arg(long, env = "OS_AUTH_URL")]
    pub os_auth_url: Option<String>,

    #[arg(long, env = "OS_USERNAME")]
    pub os_username: Option<String>,

    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub os_password: Option<String>,

    #[arg(long, env = "OS_TENANT_NAME")]
    pub os_tenant_name: Option<String>,

    /// Region used to pick catalog endpoints
    #[arg(long, env = "OS_REGION_NAME")]
    pub os_region: Option<String>,

    /// Catalog URL type of the backend endpoint
    #[arg(long, env = "OS_URL_TYPE", default_value = "internalURL")]
    pub url_type: UrlType,

    /// Number of samples per batch
    #[arg(long, env = "BATCH_SIZE", default_value = "1")]
    pub batch_size: usize,

    /// Request timeout in milliseconds
    #[arg(long, env = "OS_TIMEOUT_MS", default_value = "1000")]
    pub timeout_ms: u64,

    /// How many times a timed out request is sent again
    #[arg(long, env = "TIMEOUT_RETRIES", default_value = "0")]
    pub timeout_retries: u32,

    /// Delay before a timed out request is sent again, in milliseconds
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value = "1000")]
    pub retry_backoff_ms: u64,

    #[arg(long, env = "RETRY_STRATEGY", default_value = "fixed_delay")]
    pub retry_strategy: RetryStrategy,

    #[arg(long, env = "RETRY_JITTER")]
    pub retry_jitter: bool,

    /// Archive policy given to newly created metrics
    #[arg(long, env = "ARCHIVE_POLICY")]
    pub archive_policy: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Units by `plugin.type` or `plugin` (config file only)
    #[arg(skip)]
    pub units: HashMap<String, String>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub retry_policy: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Metric,
            os_auth_url: None,
            os_username: None,
            os_password: None,
            os_tenant_name: None,
            os_region: None,
            url_type: UrlType::Internal,
            batch_size: 1,
            timeout_ms: 1000,
            timeout_retries: 0,
            retry_backoff_ms: 1000,
            retry_strategy: RetryStrategy::FixedDelay,
            retry_jitter: false,
            archive_policy: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Pretty,
            config_file: None,
            units: HashMap::new(),
            timeout: Duration::from_millis(1000),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("os_auth_url", &self.os_auth_url)
            .field("os_username", &self.os_username)
            .field("os_password", &self.os_password.as_ref().map(|_| "*****"))
            .field("os_tenant_name", &self.os_tenant_name)
            .field("os_region", &self.os_region)
            .field("url_type", &self.url_type)
            .field("batch_size", &self.batch_size)
            .field("timeout_ms", &self.timeout_ms)
            .field("timeout_retries", &self.timeout_retries)
            .field("retry_policy", &self.retry_policy)
            .field("archive_policy", &self.archive_policy)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("units", &self.units.len())
            .finish()
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment only, no CLI parsing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_choice("OS_BACKEND", &mut config.backend, true)?;
        load_env_opt("OS_AUTH_URL", &mut config.os_auth_url);
        load_env_opt("OS_USERNAME", &mut config.os_username);
        load_env_opt("OS_PASSWORD", &mut config.os_password);
        load_env_opt("OS_TENANT_NAME", &mut config.os_tenant_name);
        load_env_opt("OS_REGION_NAME", &mut config.os_region);
        // Catalog keys are case sensitive.
        load_env_choice("OS_URL_TYPE", &mut config.url_type, false)?;
        load_env_var("BATCH_SIZE", &mut config.batch_size)?;
        load_env_var("OS_TIMEOUT_MS", &mut config.timeout_ms)?;
        load_env_var("TIMEOUT_RETRIES", &mut config.timeout_retries)?;
        load_env_var("RETRY_BACKOFF_MS", &mut config.retry_backoff_ms)?;
        load_env_choice("RETRY_STRATEGY", &mut config.retry_strategy, true)?;
        load_env_var("RETRY_JITTER", &mut config.retry_jitter)?;
        load_env_opt("ARCHIVE_POLICY", &mut config.archive_policy);
        load_env_choice("LOG_LEVEL", &mut config.log_level, true)?;
        load_env_choice("LOG_FORMAT", &mut config.log_format, true)?;
        load_env_opt("CONFIG_FILE", &mut config.config_file);

        if let Some(path) = config.config_file.clone() {
            config.merge_file(&path)?;
        }

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// CLI arguments and environment, with an optional TOML file filling
    /// in whatever neither of them set.
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        // Parse CLI args (which automatically includes env vars due to clap's env feature)
        let mut config = Config::parse_from(args);

        if let Some(path) = config.config_file.clone() {
            config.merge_file(&path)?;
        }

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Takes values from the TOML file at `path` for every field still at
    /// its default. The unit table always comes from the file.
    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: Config = toml::from_str(&content)?;
        let defaults = Config::default();

        fn fill<T>(target: &mut Option<T>, from: Option<T>) {
            if target.is_none() {
                *target = from;
            }
        }
        fn fill_default<T: PartialEq>(target: &mut T, default: &T, from: T) {
            if target == default {
                *target = from;
            }
        }

        fill_default(&mut self.backend, &defaults.backend, file.backend);
        fill(&mut self.os_auth_url, file.os_auth_url);
        fill(&mut self.os_username, file.os_username);
        fill(&mut self.os_password, file.os_password);
        fill(&mut self.os_tenant_name, file.os_tenant_name);
        fill(&mut self.os_region, file.os_region);
        fill(&mut self.archive_policy, file.archive_policy);
        fill_default(&mut self.url_type, &defaults.url_type, file.url_type);
        fill_default(&mut self.batch_size, &defaults.batch_size, file.batch_size);
        fill_default(&mut self.timeout_ms, &defaults.timeout_ms, file.timeout_ms);
        fill_default(
            &mut self.timeout_retries,
            &defaults.timeout_retries,
            file.timeout_retries,
        );
        fill_default(
            &mut self.retry_backoff_ms,
            &defaults.retry_backoff_ms,
            file.retry_backoff_ms,
        );
        fill_default(
            &mut self.retry_strategy,
            &defaults.retry_strategy,
            file.retry_strategy,
        );
        fill_default(&mut self.retry_jitter, &defaults.retry_jitter, file.retry_jitter);
        fill_default(&mut self.log_level, &defaults.log_level, file.log_level);
        fill_default(&mut self.log_format, &defaults.log_format, file.log_format);
        self.units = file.units;

        Ok(())
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        // Convert milliseconds to Duration
        self.timeout = Duration::from_millis(self.timeout_ms);
        self.retry_policy = RetryPolicy {
            base_delay: Duration::from_millis(self.retry_backoff_ms),
            strategy: self.retry_strategy,
            jitter: self.retry_jitter,
            ..RetryPolicy::default()
        };

        // Keystone URLs are joined with "/tokens".
        if let Some(url) = &mut self.os_auth_url {
            let trimmed = url.trim_end_matches('/').len();
            url.truncate(trimmed);
        }
        Ok(())
    }

    /// Identity credentials. Only fails when `validate` would.
    pub fn credentials(&self) -> Result<KeystoneCredentials, ConfigError> {
        let required = |value: &Option<String>, name: &str| {
            value.clone().ok_or_else(|| ConfigError::MissingRequiredConfig {
                field_names: vec![name.to_string()],
            })
        };

        Ok(KeystoneCredentials {
            auth_url: required(&self.os_auth_url, "os_auth_url")?,
            username: required(&self.os_username, "os_username")?,
            password: required(&self.os_password, "os_password")?,
            tenant_name: required(&self.os_tenant_name, "os_tenant_name")?,
            region: self.os_region.clone(),
        })
    }
}

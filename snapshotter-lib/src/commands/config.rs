use crate::Result;
use crate::snapshot::{BodyField, HostLimits, LinkHeader, PageMetadata, RateLimiter, RetryPolicy};
use camino::Utf8Path;
use core::time::Duration;
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// File looked up in the current directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "snapshotter.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Maximum number of entities fetched at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay between the starts of consecutive entities
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Timeout of a single HTTP request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Time budget of one field, including retries
    #[serde(default = "default_field_timeout", with = "humantime_serde")]
    pub field_timeout: Duration,

    /// Retries on top of the first attempt
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// First retry delay, doubled with every further retry
    #[serde(default = "default_retry_base_delay", with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Longest rate-limit pause to wait out
    #[serde(default = "default_max_rate_limit_wait", with = "humantime_serde")]
    pub max_rate_limit_wait: Duration,

    /// JSON body field holding the last page number, instead of the `Link` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_page_field: Option<String>,

    /// Pacing for hosts without an override
    #[serde(default)]
    pub default_host: HostLimits,

    /// Per-host pacing overrides
    #[serde(default)]
    pub hosts: HashMap<String, HostLimits>,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

const fn default_concurrency() -> usize {
    5
}

const fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_field_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_retry_attempts() -> u32 {
    3
}

const fn default_retry_base_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_rate_limit_wait() -> Duration {
    Duration::from_hours(1)
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `snapshotter.toml` in the current directory is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading snapshotter configuration file '{path}'"))?;
            (path, text)
        } else {
            let path = Utf8Path::new(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading snapshotter configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is zero or a timeout is empty
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than zero");
        }

        if self.field_timeout.is_zero() {
            bail!("field_timeout must be greater than zero");
        }

        if self.default_host.max_concurrent == 0 {
            bail!("default_host.max_concurrent must be at least 1");
        }

        for (host, limits) in &self.hosts {
            if limits.max_concurrent == 0 {
                bail!("hosts.\"{host}\".max_concurrent must be at least 1");
            }
        }

        if self.last_page_field.as_deref().is_some_and(str::is_empty) {
            bail!("last_page_field must not be empty");
        }

        Ok(())
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            request_timeout: self.request_timeout,
            max_retry_attempts: self.max_retry_attempts,
            retry_base_delay: self.retry_base_delay,
            max_rate_limit_wait: self.max_rate_limit_wait,
        }
    }

    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.default_host, self.hosts.clone())
    }

    #[must_use]
    pub fn page_metadata(&self) -> Box<dyn PageMetadata> {
        match &self.last_page_field {
            Some(path) => Box::new(BodyField::new(path.clone())),
            None => Box::new(LinkHeader),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}

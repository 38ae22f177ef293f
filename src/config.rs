//! Application configuration.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file,
//! environment variables. Every field has a default so an empty file, or no
//! file at all, is valid.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    encoder::{EncoderCommand, EncoderSettings, StreamSource},
    error::ConfigError,
    facade::DEFAULT_LOG_CAPACITY,
    filter::{Disposition, LineFilter},
    supervisor::RestartPolicy,
};

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "stream-supervisor.toml";

pub const STREAM_KEY_VARS: &[&str] = &["STREAM_KEY", "YOUTUBE_KEY"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub encoder: EncoderSettings,
    pub restart: RestartConfig,
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub ingest_url: String,
    /// Usually left out of the file and provided through the environment.
    pub key: Option<String>,
    pub source: StreamSource,
    pub log_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ingest_url: "rtmp://a.rtmp.youtube.com/live2".into(),
            key: None,
            source: StreamSource::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl StreamConfig {
    /// Blank keys count as missing.
    pub fn stream_key(&self) -> Option<&str> {
        self.key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub delay_secs: u64,
    pub asset_retry_delay_secs: u64,
    pub max_backoff_exponent: u32,
    pub max_delay_secs: u64,
    pub jitter: bool,
    pub max_attempts: Option<u32>,
    pub stable_after_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        let policy = RestartPolicy::default();
        Self {
            delay_secs: policy.base_delay.as_secs(),
            asset_retry_delay_secs: policy.asset_retry_delay.as_secs(),
            max_backoff_exponent: policy.max_backoff_exponent,
            max_delay_secs: policy.max_delay.as_secs(),
            jitter: policy.jitter,
            max_attempts: policy.max_attempts,
            stable_after_secs: policy.stable_after.as_secs(),
        }
    }
}

impl RestartConfig {
    pub fn policy(&self) -> RestartPolicy {
        RestartPolicy {
            base_delay: Duration::from_secs(self.delay_secs),
            asset_retry_delay: Duration::from_secs(self.asset_retry_delay_secs),
            max_backoff_exponent: self.max_backoff_exponent,
            max_delay: Duration::from_secs(self.max_delay_secs),
            jitter: self.jitter,
            max_attempts: self.max_attempts,
            stable_after: Duration::from_secs(self.stable_after_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Start from the built-in vocabulary.
    pub use_defaults: bool,
    pub suppress: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            suppress: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Configured error and warning patterns take precedence over the
    /// built-in vocabulary.
    pub fn line_filter(&self) -> LineFilter {
        let mut filter = if self.use_defaults {
            LineFilter::default()
        } else {
            LineFilter::empty()
        };
        for pattern in self.warnings.iter().rev() {
            filter = filter.with_priority_rule(pattern, Disposition::Warning);
        }
        for pattern in self.errors.iter().rev() {
            filter = filter.with_priority_rule(pattern, Disposition::Error);
        }
        filter.with_suppressed(&self.suppress)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl AppConfig {
    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        cfg.apply_env(|var| std::env::var(var).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: PathBuf::from(path),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(path),
            source,
        })
    }

    /// `lookup` is `std::env::var` outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = STREAM_KEY_VARS
            .iter()
            .find_map(|var| lookup(var).filter(|key| !key.trim().is_empty()))
        {
            self.stream.key = Some(key);
        }
        if let Some(url) = lookup("INGEST_URL") {
            self.stream.ingest_url = url;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "PORT",
                    value: port,
                })?;
        }
        Ok(())
    }

    /// `None` when no stream key is configured.
    pub fn encoder_command(&self) -> Option<EncoderCommand> {
        let key = self.stream.stream_key()?;
        Some(EncoderCommand::build(
            &self.encoder,
            &self.stream.source,
            &self.stream.ingest_url,
            key,
        ))
    }
}

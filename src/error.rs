use std::path::PathBuf;

use thiserror::Error;

/// Why a start attempt did not produce a live child.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("stream key is not set")]
    MissingStreamKey,
    #[error("media asset not found: {}", .0.display())]
    MissingAsset(PathBuf),
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("encoder launcher panicked: {0}")]
    LauncherPanicked(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

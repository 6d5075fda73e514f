use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "lifecycle.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    /// Wait after the installer reports completion before settling. The installer can report
    /// done slightly before its files are visible on disk.
    pub install_grace_delay: Duration,
    /// Substring of a launch failure meaning the installed version is outdated.
    pub version_mismatch_sentinel: String,
    pub install_dir_token: String,
    pub confirm_install_cancel: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            install_grace_delay: Duration::from_millis(1500),
            version_mismatch_sentinel: "ERROR: Game is out of date".into(),
            install_dir_token: "{InstallDir}".into(),
            confirm_install_cancel: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    poll_interval_ms: Option<u64>,
    install_grace_delay_ms: Option<u64>,
    version_mismatch_sentinel: Option<String>,
    install_dir_token: Option<String>,
    confirm_install_cancel: Option<bool>,
}

/// Loads `path` (or `lifecycle.toml` in the working directory when present), then applies
/// `APP__*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

pub(crate) fn load_config_with_env(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ControllerConfig, ConfigError> {
    let mut config = ControllerConfig::default();

    let file = match path {
        Some(path) => Some(read_file_config(path)?),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                Some(read_file_config(fallback)?)
            } else {
                None
            }
        }
    };

    if let Some(file) = file {
        if let Some(ms) = file.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.install_grace_delay_ms {
            config.install_grace_delay = Duration::from_millis(ms);
        }
        if let Some(v) = file.version_mismatch_sentinel {
            config.version_mismatch_sentinel = v;
        }
        if let Some(v) = file.install_dir_token {
            config.install_dir_token = v;
        }
        if let Some(v) = file.confirm_install_cancel {
            config.confirm_install_cancel = v;
        }
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        config.poll_interval = Duration::from_millis(parse_env("APP__POLL_INTERVAL_MS", v)?);
    }
    if let Some(v) = env("APP__INSTALL_GRACE_DELAY_MS") {
        config.install_grace_delay =
            Duration::from_millis(parse_env("APP__INSTALL_GRACE_DELAY_MS", v)?);
    }
    if let Some(v) = env("APP__VERSION_MISMATCH_SENTINEL") {
        config.version_mismatch_sentinel = v;
    }
    if let Some(v) = env("APP__CONFIRM_INSTALL_CANCEL") {
        config.confirm_install_cancel = parse_env("APP__CONFIRM_INSTALL_CANCEL", v)?;
    }

    if config.poll_interval.is_zero() {
        return Err(ConfigError::ZeroPollInterval);
    }

    Ok(config)
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

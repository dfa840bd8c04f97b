//! `~/.docview/config.toml` loading.
//!
//! Every section and key is optional; accessors fill in defaults. String
//! values may reference environment variables as `${VAR}`.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use toml::de::Error as TomlError;

pub const DEFAULT_PORT: u16 = 0;
pub const DEFAULT_TITLE: &str = "Documentation";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: TomlError,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocviewConfig {
    pub server: Option<ServerConfig>,
    pub viewer: Option<ViewerConfig>,
    pub bundle: Option<BundleConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// `0` picks an ephemeral port.
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerMode {
    #[default]
    Server,
    Bundle,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewerConfig {
    pub mode: Option<ViewerMode>,
    pub title: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleConfig {
    pub dir: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    pub file: Option<String>,
    pub level: Option<String>,
}

/// Replace `${VAR}` with the variable's value. Unset variables expand to
/// nothing; an unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl DocviewConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
            tracing::debug!("No home directory; using default config");
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found; using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, TomlError> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_PORT)
    }

    #[must_use]
    pub fn mode(&self) -> ViewerMode {
        self.viewer.as_ref().and_then(|v| v.mode).unwrap_or_default()
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.viewer
            .as_ref()
            .and_then(|v| v.title.as_deref())
            .map_or_else(|| DEFAULT_TITLE.to_string(), expand_env_vars)
    }

    #[must_use]
    pub fn bundle_dir(&self) -> Option<PathBuf> {
        self.bundle
            .as_ref()
            .and_then(|b| b.dir.as_deref())
            .map(|dir| PathBuf::from(expand_env_vars(dir)))
    }

    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging
            .as_ref()
            .and_then(|l| l.file.as_deref())
            .map(|file| PathBuf::from(expand_env_vars(file)))
    }

    #[must_use]
    pub fn log_level(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .map_or_else(|| DEFAULT_LOG_LEVEL.to_string(), expand_env_vars)
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".docview").join("config.toml"))
}

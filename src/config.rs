//! Runtime settings.
//!
//! Precedence: defaults < TOML file < `CASCADE_*` environment < CLI flags.
//! The file is `--config <FILE>` when given, else
//! `<config_dir>/location-cascade/config.toml` if it exists.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::location::{HttpLocationService, DEFAULT_BASE_URL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid base URL '{0}': expected an absolute http(s) URL")]
    InvalidBaseUrl(String),
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 10,
            user_agent: format!("LocationCascade/{}", env!("CARGO_PKG_VERSION")),
            server_host: "127.0.0.1".into(),
            server_port: 3000,
        }
    }
}

impl Settings {
    /// Load from file and environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("location-cascade").join("config.toml"))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("CASCADE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("CASCADE_TIMEOUT_SECS") {
            self.timeout_secs = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CASCADE_TIMEOUT_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("CASCADE_HOST") {
            self.server_host = v;
        }
        if let Some(v) = lookup("CASCADE_PORT") {
            self.server_port = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CASCADE_PORT",
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// The validated service base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn location_service(&self) -> Result<HttpLocationService, ConfigError> {
        Ok(HttpLocationService::new(
            self.base_url()?,
            self.timeout(),
            &self.user_agent,
        ))
    }
}

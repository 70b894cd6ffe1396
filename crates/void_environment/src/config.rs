//! Environment configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `VOID_ENV_PROTOCOL_VERSION=1.2.0`
//! 2. Config file: `$VOID_ENV_CONFIG`, else the first of
//!    `void_environment.toml` and `config/void_environment.toml`
//! 3. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! protocol_version = "1.0.0"
//!
//! [cache]
//! retry_attempts = 3
//! authorization = "Bearer token"
//! library_root = "/var/cache/void/libraries"
//!
//! [sync]
//! process_noise = 0.05
//! measurement_noise = 0.01
//! rate_smoothing = 0.25
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use void_core::Version;
use void_sync::SyncConfig;

use crate::error::{EnvironmentError, EnvironmentResult};

/// Config files probed by [`EnvironmentConfig::load`]
pub const CONFIG_FILES: &[&str] = &["void_environment.toml", "config/void_environment.toml"];

/// Resource cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fetch attempts on authorization expiry; 0 or 1 disables retries
    pub retry_attempts: u32,
    /// Sent as the `Authorization` header of network fetches
    pub authorization: Option<String>,
    /// Root for library-relative resource paths
    pub library_root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            authorization: None,
            library_root: None,
        }
    }
}

/// Complete environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Protocol version the server speaks
    pub protocol_version: String,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    /// File this config was loaded from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            protocol_version: Version::default().to_string(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            config_path: None,
        }
    }
}

impl EnvironmentConfig {
    /// Load configuration from all sources. Unreadable files are logged and
    /// skipped.
    pub fn load() -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(path) = std::env::var("VOID_ENV_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        candidates.extend(CONFIG_FILES.iter().map(PathBuf::from));

        let mut config = Self::default();
        for path in candidates {
            if !path.is_file() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(loaded) => {
                    log::info!("Loaded environment config from {}", path.display());
                    config = loaded;
                    break;
                }
                Err(e) => log::warn!("{}", e),
            }
        }

        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> EnvironmentResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EnvironmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text).map_err(|source| EnvironmentError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from `VOID_ENV_*` variables as returned by `lookup`.
    /// Values that do not parse are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(version) = lookup("VOID_ENV_PROTOCOL_VERSION") {
            log::info!("Protocol version from env: {}", version);
            self.protocol_version = version;
        }

        if let Some(attempts) = parsed(&lookup, "VOID_ENV_RETRY_ATTEMPTS") {
            self.cache.retry_attempts = attempts;
        }

        if let Some(authorization) = lookup("VOID_ENV_AUTHORIZATION") {
            self.cache.authorization = (!authorization.is_empty()).then_some(authorization);
        }

        if let Some(root) = lookup("VOID_ENV_LIBRARY_ROOT") {
            self.cache.library_root = (!root.is_empty()).then(|| PathBuf::from(root));
        }

        if let Some(noise) = parsed(&lookup, "VOID_ENV_PROCESS_NOISE") {
            self.sync.process_noise = noise;
        }
        if let Some(noise) = parsed(&lookup, "VOID_ENV_MEASUREMENT_NOISE") {
            self.sync.measurement_noise = noise;
        }
        if let Some(smoothing) = parsed(&lookup, "VOID_ENV_RATE_SMOOTHING") {
            self.sync.rate_smoothing = smoothing;
        }
    }

    /// Parsed protocol version
    pub fn protocol(&self) -> EnvironmentResult<Version> {
        Version::parse(&self.protocol_version)
            .ok_or_else(|| EnvironmentError::InvalidVersion(self.protocol_version.clone()))
    }

    /// Print configuration summary
    pub fn log_summary(&self) {
        log::info!("=== Environment Configuration ===");
        log::info!("  Protocol: {}", self.protocol_version);
        log::info!("  Retry attempts: {}", self.cache.retry_attempts);
        log::info!(
            "  Authorization: {}",
            if self.cache.authorization.is_some() { "set" } else { "none" }
        );
        if let Some(root) = &self.cache.library_root {
            log::info!("  Library root: {}", root.display());
        }
        log::info!(
            "  Filter noise: process {} / measurement {}",
            self.sync.process_noise,
            self.sync.measurement_noise
        );
        if let Some(path) = &self.config_path {
            log::info!("  Config file: {}", path.display());
        }
        log::info!("=================================");
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={}: not a valid value", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.protocol().unwrap(), Version::default());
        assert_eq!(config.cache.retry_attempts, 3);
        assert!(config.cache.authorization.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EnvironmentConfig::from_toml(
            r#"
            protocol_version = "2.1.0"

            [sync]
            measurement_noise = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.protocol().unwrap(), Version::new(2, 1, 0));
        assert_eq!(config.sync.measurement_noise, 0.5);
        assert_eq!(config.sync.process_noise, SyncConfig::default().process_noise);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VOID_ENV_PROTOCOL_VERSION", "1.4.2"),
            ("VOID_ENV_RETRY_ATTEMPTS", "not-a-number"),
            ("VOID_ENV_AUTHORIZATION", "Bearer abc"),
            ("VOID_ENV_RATE_SMOOTHING", "0.5"),
        ]
        .into_iter()
        .collect();

        let mut config = EnvironmentConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.protocol().unwrap(), Version::new(1, 4, 2));
        assert_eq!(config.cache.retry_attempts, 3);
        assert_eq!(config.cache.authorization.as_deref(), Some("Bearer abc"));
        assert_eq!(config.sync.rate_smoothing, 0.5);
    }

    #[test]
    fn test_invalid_version() {
        let config = EnvironmentConfig {
            protocol_version: "one".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.protocol(),
            Err(EnvironmentError::InvalidVersion(v)) if v == "one"
        ));
    }
}

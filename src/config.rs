//! Configuration types for the image-editing engine

use crate::error::{ImagingError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Hard cap on output width and height
pub const DEFAULT_MAX_DIMENSION: u32 = 10_000;

/// Remote calls wait this long to tolerate accelerator cold starts
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 60;

/// Seed of the inpainting grain generator
pub const DEFAULT_GRAIN_SEED: u64 = 0x00d1_6a1e_5eed;

/// Remote accelerator endpoints and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Full URL of the upscaling service
    pub upscale_url: Option<String>,

    /// Full URL of the background-removal service
    pub remover_url: Option<String>,

    /// Legacy monolithic service; the service path is appended to it
    pub base_url: Option<String>,

    /// Shared secret sent as `x-api-key`
    pub secret: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            upscale_url: None,
            remover_url: None,
            base_url: None,
            secret: None,
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

impl RemoteConfig {
    /// Read endpoints from `GPU_UPSCALE_URL`, `GPU_REMOVER_URL`,
    /// `GPU_SERVICE_URL` and `GPU_SERVICE_SECRET`
    #[must_use]
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            upscale_url: read("GPU_UPSCALE_URL"),
            remover_url: read("GPU_REMOVER_URL"),
            base_url: read("GPU_SERVICE_URL"),
            secret: read("GPU_SERVICE_SECRET"),
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }

    /// Whether any endpoint is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.upscale_url.is_some() || self.remover_url.is_some() || self.base_url.is_some()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the remote configuration
    ///
    /// # Errors
    /// - Timeout of zero or above ten minutes
    /// - Endpoint that is not an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > 600 {
            return Err(ImagingError::config_value_error(
                "timeout_secs",
                self.timeout_secs,
                "1-600",
                Some(DEFAULT_REMOTE_TIMEOUT_SECS),
            ));
        }

        for url in [&self.upscale_url, &self.remover_url, &self.base_url]
            .into_iter()
            .flatten()
        {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ImagingError::invalid_config(format!(
                    "Remote endpoint must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// Configuration for the image-editing engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Remote accelerator settings
    pub remote: RemoteConfig,

    /// Maximum output width/height in pixels
    pub max_dimension: u32,

    /// Seed for the inpainting grain
    pub grain_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            grain_seed: DEFAULT_GRAIN_SEED,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dimo_imaging::EngineConfig;
    ///
    /// let config = EngineConfig::builder()
    ///     .max_dimension(4096)
    ///     .remover_url("https://gpu.example.com/remove-background")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_dimension, 4096);
    /// ```
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Default configuration with remote endpoints taken from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            remote: RemoteConfig::from_env(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON does not describe an `EngineConfig`
    /// - Loaded values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ImagingError::invalid_config(format!(
                "Failed to parse '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `max_dimension` of zero
    /// - Invalid remote settings
    pub fn validate(&self) -> Result<()> {
        if self.max_dimension == 0 {
            return Err(ImagingError::config_value_error(
                "max_dimension",
                self.max_dimension,
                "1-4294967295",
                Some(DEFAULT_MAX_DIMENSION),
            ));
        }
        self.remote.validate()
    }
}

/// Builder for `EngineConfig`
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.config.remote = remote;
        self
    }

    #[must_use]
    pub fn upscale_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.remote.upscale_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn remover_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.remote.remover_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.remote.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.config.remote.secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    #[must_use]
    pub fn grain_seed(mut self, seed: u64) -> Self {
        self.config.grain_seed = seed;
        self
    }

    /// Build the engine configuration
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_dimension, 10_000);
        assert_eq!(config.remote.timeout(), Duration::from_secs(60));
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(EngineConfig::builder().timeout_secs(0).build().is_err());
        assert!(EngineConfig::builder().max_dimension(0).build().is_err());
        assert!(EngineConfig::builder()
            .upscale_url("ftp://nowhere")
            .build()
            .is_err());
    }

    #[test]
    fn test_json_round_trip_with_partial_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"remote": {"secret": "s3cret"}, "max_dimension": 2048}"#)
                .unwrap();
        assert_eq!(config.max_dimension, 2048);
        assert_eq!(config.remote.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.remote.timeout_secs, DEFAULT_REMOTE_TIMEOUT_SECS);
        assert_eq!(config.grain_seed, DEFAULT_GRAIN_SEED);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"remote": {"timeout_secs": 5}}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.remote.timeout_secs, 5);

        std::fs::write(&path, "{not json").unwrap();
        assert!(EngineConfig::from_json_file(&path).is_err());
    }
}

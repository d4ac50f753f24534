//! Acceleration backends for background removal and upscaling
//!
//! This module provides the backends behind the accelerated operations:
//! - Remote backend (HTTP accelerator service, optional)
//! - Local backend (deterministic CPU implementation, always available)
//!
//! `Accelerator` combines them: the remote backend is tried first and any
//! failure falls through to the local one.

pub mod local;
pub mod remote;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::local::LocalBackend;
pub use self::remote::RemoteBackend;

use crate::{
    config::EngineConfig,
    editing::UpscaleOptions,
    error::{ImagingError, Result},
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability offered by an acceleration backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Upscale,
    RemoveBackground,
}

impl ServiceType {
    /// Path segment of the service on a monolithic accelerator
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Upscale => "upscale",
            Self::RemoveBackground => "remove-background",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Byte-in/byte-out accelerated capabilities
///
/// Implementations are long-lived handles shared across concurrent calls.
#[async_trait]
pub trait AccelerationBackend: Send + Sync {
    /// Short name reported in processing metadata
    fn name(&self) -> &str;

    /// Whether the backend can serve the given capability at all
    fn supports(&self, service: ServiceType) -> bool {
        let _ = service;
        true
    }

    /// Cut out the foreground; returns an RGBA PNG
    ///
    /// # Errors
    /// - Backend failure of any kind
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>>;

    /// Upscale the image; returns a PNG
    ///
    /// # Errors
    /// - Backend failure of any kind
    async fn upscale(&self, image: &[u8], options: &UpscaleOptions) -> Result<Vec<u8>>;
}

/// Encoded output of an accelerated call and the backend that produced it
#[derive(Debug, Clone)]
pub struct AcceleratedOutput {
    pub bytes: Vec<u8>,
    pub backend: String,
}

/// Remote-first dispatcher with a local fallback
#[derive(Clone)]
pub struct Accelerator {
    primary: Option<Arc<dyn AccelerationBackend>>,
    fallback: Arc<dyn AccelerationBackend>,
}

impl fmt::Debug for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accelerator")
            .field("primary", &self.primary.as_ref().map(|b| b.name().to_string()))
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl Accelerator {
    /// Local backend only
    #[must_use]
    pub fn local_only(max_dimension: u32) -> Self {
        Self {
            primary: None,
            fallback: Arc::new(LocalBackend::new(max_dimension)),
        }
    }

    /// Build from configuration; the remote backend exists only when an
    /// endpoint is configured
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut accelerator = Self::local_only(config.max_dimension);
        if config.remote.is_configured() {
            accelerator.primary = Some(Arc::new(RemoteBackend::new(config.remote.clone())?));
        }
        debug!(?accelerator, "Accelerator configured");
        Ok(accelerator)
    }

    /// Replace the primary backend
    #[must_use]
    pub fn with_primary(mut self, backend: Arc<dyn AccelerationBackend>) -> Self {
        self.primary = Some(backend);
        self
    }

    /// Replace the fallback backend
    #[must_use]
    pub fn with_fallback(mut self, backend: Arc<dyn AccelerationBackend>) -> Self {
        self.fallback = backend;
        self
    }

    /// Automatic background removal
    ///
    /// # Errors
    /// - Both the primary and the fallback backend failed (`Processing`)
    pub async fn remove_background(&self, image: &[u8]) -> Result<AcceleratedOutput> {
        if let Some(primary) = self.usable_primary(ServiceType::RemoveBackground) {
            match primary.remove_background(image).await {
                Ok(bytes) => return Ok(Self::served_by(bytes, primary.as_ref())),
                Err(remote_error) => {
                    warn!(
                        backend = primary.name(),
                        error = %remote_error,
                        "Background removal failed remotely, falling back to local"
                    );
                    return self
                        .fallback
                        .remove_background(image)
                        .await
                        .map(|bytes| Self::served_by(bytes, self.fallback.as_ref()))
                        .map_err(|local_error| {
                            Self::both_failed(ServiceType::RemoveBackground, &remote_error, &local_error)
                        });
                },
            }
        }

        let bytes = self.fallback.remove_background(image).await?;
        Ok(Self::served_by(bytes, self.fallback.as_ref()))
    }

    /// Upscaling
    ///
    /// # Errors
    /// - Both the primary and the fallback backend failed (`Processing`)
    /// - Local upscale rejected the options when no primary is configured
    pub async fn upscale(&self, image: &[u8], options: &UpscaleOptions) -> Result<AcceleratedOutput> {
        if let Some(primary) = self.usable_primary(ServiceType::Upscale) {
            match primary.upscale(image, options).await {
                Ok(bytes) => return Ok(Self::served_by(bytes, primary.as_ref())),
                Err(remote_error) => {
                    warn!(
                        backend = primary.name(),
                        error = %remote_error,
                        "Upscale failed remotely, falling back to local"
                    );
                    return self
                        .fallback
                        .upscale(image, options)
                        .await
                        .map(|bytes| Self::served_by(bytes, self.fallback.as_ref()))
                        .map_err(|local_error| {
                            Self::both_failed(ServiceType::Upscale, &remote_error, &local_error)
                        });
                },
            }
        }

        let bytes = self.fallback.upscale(image, options).await?;
        Ok(Self::served_by(bytes, self.fallback.as_ref()))
    }

    fn usable_primary(&self, service: ServiceType) -> Option<&Arc<dyn AccelerationBackend>> {
        let primary = self.primary.as_ref()?;
        if primary.supports(service) {
            Some(primary)
        } else {
            debug!(backend = primary.name(), %service, "No endpoint for service, using local");
            None
        }
    }

    fn served_by(bytes: Vec<u8>, backend: &dyn AccelerationBackend) -> AcceleratedOutput {
        AcceleratedOutput {
            bytes,
            backend: backend.name().to_string(),
        }
    }

    fn both_failed(service: ServiceType, remote: &ImagingError, local: &ImagingError) -> ImagingError {
        ImagingError::processing(format!(
            "{} failed remotely ({}) and locally ({})",
            service, remote, local
        ))
    }
}

//! Test utilities and mock backends for testing accelerated operations
//!
//! This module provides a mock implementation of the `AccelerationBackend`
//! trait so the fallback policy can be tested without a running accelerator.

use super::{AccelerationBackend, ServiceType};
use crate::{
    editing::UpscaleOptions,
    error::{ImagingError, Result},
    services::ImageCodec,
    types::RasterImage,
};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};

/// Small RGB gradient encoded as PNG
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 40 % 256) as u8, (y * 40 % 256) as u8, 128])
    });
    ImageCodec::encode_png(RasterImage::from_rgb(image)).unwrap()
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    /// Whether to simulate a failure on every call
    should_fail: bool,
    unsupported: Vec<ServiceType>,
}

impl MockBackend {
    /// Mock that echoes its input back
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
            unsupported: Vec::new(),
        }
    }

    /// Mock that fails every call with a remote service error
    #[must_use]
    pub fn new_failing(name: &str) -> Self {
        let mut backend = Self::new(name);
        backend.should_fail = true;
        backend
    }

    /// Report the service as unsupported
    #[must_use]
    pub fn without(mut self, service: ServiceType) -> Self {
        self.unsupported.push(service);
        self
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) -> Result<()> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
        if self.should_fail {
            return Err(ImagingError::remote(format!(
                "Mock {} failure in {}",
                self.name, method
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccelerationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, service: ServiceType) -> bool {
        !self.unsupported.contains(&service)
    }

    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>> {
        self.record_call("remove_background")?;
        Ok(image.to_vec())
    }

    async fn upscale(&self, image: &[u8], _options: &UpscaleOptions) -> Result<Vec<u8>> {
        self.record_call("upscale")?;
        Ok(image.to_vec())
    }
}

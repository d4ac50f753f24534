//! Deterministic CPU backend
//!
//! Always available; serves as the fallback for every accelerated capability.

use super::AccelerationBackend;
use crate::{
    editing::{
        contour::{border_cutout, CUTOUT_WORKING_SIDE},
        enhance::upscale_local,
        UpscaleOptions,
    },
    error::{ImagingError, Result},
    services::ImageCodec,
    types::RasterImage,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Local backend running the CPU implementations on the blocking pool
#[derive(Debug, Clone)]
pub struct LocalBackend {
    max_dimension: u32,
}

impl LocalBackend {
    #[must_use]
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    async fn run_blocking<F>(&self, stage: &'static str, image: &[u8], work: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&RasterImage) -> Result<RasterImage> + Send + 'static,
    {
        let bytes = image.to_vec();
        tokio::task::spawn_blocking(move || {
            let decoded = ImageCodec::decode(&bytes)?;
            let output = work(&decoded)?;
            ImageCodec::encode_png(output)
        })
        .await
        .map_err(|e| ImagingError::processing_stage_error(stage, &format!("worker failed: {}", e), None))?
    }
}

#[async_trait]
impl AccelerationBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>> {
        debug!("Running local border-seeded cutout");
        self.run_blocking("local-cutout", image, |decoded| {
            border_cutout(decoded, CUTOUT_WORKING_SIDE)
        })
        .await
    }

    #[instrument(skip(self, image, options), fields(bytes = image.len(), factor = options.factor))]
    async fn upscale(&self, image: &[u8], options: &UpscaleOptions) -> Result<Vec<u8>> {
        let options = *options;
        let max_dimension = self.max_dimension;
        self.run_blocking("local-upscale", image, move |decoded| {
            upscale_local(decoded, &options, max_dimension)
        })
        .await
    }
}

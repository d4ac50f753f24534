#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Dimo Imaging
//!
//! Image-editing engine behind a print-shop backend: object removal,
//! magic-wand masks, background keying, contour clipping, halftone
//! separation, watermarks and upscaling.
//!
//! ## Features
//!
//! - **Object removal**: adaptive dilation, ring-median prefill, diffusion
//!   inpainting, film grain and soft blending
//! - **Magic wand**: seeded flood fill with a per-channel tolerance
//! - **Background keying**: by mask (optionally feathered), by color list or
//!   through the accelerator
//! - **Contour clip**: GrabCut-style segmentation over color mixtures and a
//!   min-cut solver
//! - **Halftone**: anti-aliased dots with ink reconstruction over a garment
//!   color
//! - **Watermark**: shape crops, Lanczos resize, alpha compositing
//! - **Acceleration**: optional remote service with a deterministic local
//!   fallback for background removal and upscaling
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dimo_imaging::{EngineConfig, ImagingEngine, ObjectSelection};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = ImagingEngine::new(EngineConfig::from_env())?;
//! let image = std::fs::read("photo.jpg")?;
//! let result = engine
//!     .remove_objects(&image, ObjectSelection::Point { x: 120, y: 80, tolerance: 30 })
//!     .await?;
//! result.save("photo-clean.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): command-line interface and tracing subscribers
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`, `tracing-files`: structured and file log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod editing;
pub mod error;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use tokio::io::AsyncRead;

// Public API exports
pub use backends::{AccelerationBackend, Accelerator, LocalBackend, RemoteBackend, ServiceType};
pub use config::{EngineConfig, EngineConfigBuilder, RemoteConfig};
pub use editing::{
    ClipSeed, ColorKey, EnhanceOptions, HalftoneOptions, LabelMap, SegmentationLabel,
    UpscaleOptions, WandSeed, WatermarkOptions, WatermarkShape,
};
pub use error::{ErrorKind, ImagingError, Result};
pub use processor::{BackgroundMode, ClipMode, ClipRequest, ImagingEngine, ObjectSelection};
pub use services::ImageCodec;
pub use types::{
    ChannelLayout, ColorSample, Mask, ProcessingMetadata, ProcessingResult, ProcessingTimings,
    RasterImage,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};

/// Remove the background of an encoded image with a one-off engine
///
/// Long-running services should build one `ImagingEngine` and share it;
/// this helper is meant for scripts and tests.
///
/// # Examples
///
/// ```rust,no_run
/// use dimo_imaging::{remove_background_from_bytes, BackgroundMode, ColorSample, EngineConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let mode = BackgroundMode::ColorKey {
///     colors: vec![ColorSample::new(0, 255, 0)],
///     threshold: 40.0,
/// };
/// let result = remove_background_from_bytes(&upload, mode, &EngineConfig::default()).await?;
/// assert_eq!(result.media_type, "image/png");
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    mode: BackgroundMode,
    config: &EngineConfig,
) -> Result<ProcessingResult> {
    let engine = ImagingEngine::new(config.clone())?;
    engine.remove_background(image_bytes, mode).await
}

/// Remove the background of an image read from an async stream
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    mode: BackgroundMode,
    config: &EngineConfig,
) -> Result<ProcessingResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| ImagingError::processing(format!("Failed to read from stream: {}", e)))?;
    remove_background_from_bytes(&buffer, mode, config).await
}

/// Upscale an encoded image with a one-off engine
pub async fn upscale_from_bytes(
    image_bytes: &[u8],
    options: UpscaleOptions,
    config: &EngineConfig,
) -> Result<ProcessingResult> {
    let engine = ImagingEngine::new(config.clone())?;
    engine.upscale(image_bytes, options).await
}

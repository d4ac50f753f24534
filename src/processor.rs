//! Imaging engine
//!
//! `ImagingEngine` is built once at startup and shared by reference. Every
//! operation is decode → transform → encode over its own buffers; CPU-bound
//! transforms run on the blocking pool, accelerated capabilities go through
//! the `Accelerator` with its local fallback.

use crate::{
    backends::{AcceleratedOutput, Accelerator},
    config::EngineConfig,
    editing::{
        contour::{self, manual_selection, ClipSeed},
        enhance, halftone, inpaint, keying,
        magic_wand::{self, WandSeed},
        watermark, ColorKey, EnhanceOptions, HalftoneOptions, UpscaleOptions, WatermarkOptions,
    },
    error::{ImagingError, Result},
    services::ImageCodec,
    types::{ColorSample, Mask, ProcessingMetadata, ProcessingResult, ProcessingTimings, RasterImage},
};
use instant::Instant;
use tracing::{debug, info, instrument, warn};

/// Which pixels remove-objects should erase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSelection {
    /// Encoded mask; any value above the removal threshold is erased
    Mask(Vec<u8>),
    /// Magic-wand selection around a seed point
    Point { x: i64, y: i64, tolerance: u8 },
}

/// How remove-background decides what to keep
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundMode {
    /// Encoded keep-mask
    Mask { mask: Vec<u8>, refine: bool },
    /// Make pixels near any listed color transparent
    ColorKey {
        colors: Vec<ColorSample>,
        threshold: f32,
    },
    /// Delegate to the accelerator
    Automatic,
}

/// Seed of a contour clip
#[derive(Debug, Clone, PartialEq)]
pub enum ClipMode {
    /// User strokes; a missing or empty mask falls back to the automatic cutout
    Manual { mask: Option<Vec<u8>> },
    /// Coarse automatic cutout refined by segmentation
    Automatic { hints: Option<ColorKey> },
}

/// Contour clip request
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub mode: ClipMode,
    pub refine: bool,
}

/// Per-call timing collector
struct OperationTimer {
    started: Instant,
    timings: ProcessingTimings,
}

impl OperationTimer {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            timings: ProcessingTimings::default(),
        }
    }

    fn elapsed_ms(since: Instant) -> u64 {
        u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Long-lived engine shared across calls
#[derive(Debug, Clone)]
pub struct ImagingEngine {
    config: EngineConfig,
    accelerator: Accelerator,
}

impl ImagingEngine {
    /// Create an engine; the remote backend is attached when configured
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client construction failure
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let accelerator = Accelerator::from_config(&config)?;
        info!(
            max_dimension = config.max_dimension,
            remote = config.remote.is_configured(),
            "Imaging engine initialized"
        );
        Ok(Self { config, accelerator })
    }

    /// Create an engine around an injected accelerator
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_accelerator(config: EngineConfig, accelerator: Accelerator) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, accelerator })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn accelerator(&self) -> &Accelerator {
        &self.accelerator
    }

    /// Erase the selected pixels and reconstruct the background
    ///
    /// # Errors
    /// - Seed point outside the image (`Input`)
    /// - Undecodable image or mask (`Processing`)
    #[instrument(skip(self, image, selection), fields(bytes = image.len()))]
    pub async fn remove_objects(
        &self,
        image: &[u8],
        selection: ObjectSelection,
    ) -> Result<ProcessingResult> {
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let raster = ImageCodec::decode(image)?;
        let mask = match &selection {
            ObjectSelection::Mask(bytes) => Some(ImageCodec::decode_mask_for(bytes, &raster)?),
            ObjectSelection::Point { .. } => None,
        };
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let grain_seed = self.config.grain_seed;
        let stage = Instant::now();
        let output = run_blocking("remove-objects", move || {
            let mask = match (mask, selection) {
                (Some(mask), _) => mask,
                (None, ObjectSelection::Point { x, y, tolerance }) => {
                    magic_wand::create_mask_from_point(&raster, WandSeed::new(x, y, tolerance))?
                },
                (None, ObjectSelection::Mask(_)) => Mask::empty(raster.width(), raster.height()),
            };
            inpaint::remove_objects(&raster, &mask, grain_seed)
        })
        .await?;
        timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);

        finish_raster("remove-objects", output, timer)
    }

    /// Magic-wand mask as a grayscale PNG
    ///
    /// # Errors
    /// - Seed point outside the image (`Input`)
    /// - Undecodable image (`Processing`)
    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn mask_from_point(
        &self,
        image: &[u8],
        x: i64,
        y: i64,
        tolerance: u8,
    ) -> Result<ProcessingResult> {
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let raster = ImageCodec::decode(image)?;
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let stage = Instant::now();
        let mask = run_blocking("mask-from-point", move || {
            magic_wand::create_mask_from_point(&raster, WandSeed::new(x, y, tolerance))
        })
        .await?;
        timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);

        let stage = Instant::now();
        let bytes = ImageCodec::encode_mask_png(&mask)?;
        timer.timings.encode_ms = OperationTimer::elapsed_ms(stage);
        Ok(finish(
            "mask-from-point",
            bytes,
            mask.dimensions,
            timer,
            None,
        ))
    }

    /// Cut the background away
    ///
    /// # Errors
    /// - Malformed color key (`Input`)
    /// - Undecodable image or mask (`Processing`)
    /// - Automatic path failed remotely and locally (`Processing`)
    #[instrument(skip(self, image, mode), fields(bytes = image.len()))]
    pub async fn remove_background(
        &self,
        image: &[u8],
        mode: BackgroundMode,
    ) -> Result<ProcessingResult> {
        match mode {
            BackgroundMode::Automatic => {
                let mut timer = OperationTimer::start();
                let stage = Instant::now();
                let output = self.accelerator.remove_background(image).await?;
                timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
                finish_accelerated("remove-background", output, timer)
            },
            BackgroundMode::Mask { mask, refine } => {
                let mut timer = OperationTimer::start();
                let stage = Instant::now();
                let raster = ImageCodec::decode(image)?;
                let mask = ImageCodec::decode_mask(&mask)?;
                timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

                let stage = Instant::now();
                let output = run_blocking("remove-background", move || {
                    Ok(keying::key_by_mask(&raster, &mask, refine))
                })
                .await?;
                timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
                finish_raster("remove-background", output, timer)
            },
            BackgroundMode::ColorKey { colors, threshold } => {
                let key = ColorKey::new(colors, threshold)?;
                let mut timer = OperationTimer::start();
                let stage = Instant::now();
                let raster = ImageCodec::decode(image)?;
                timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

                let stage = Instant::now();
                let output = run_blocking("remove-background", move || {
                    Ok(keying::key_by_colors(&raster, &key))
                })
                .await?;
                timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
                finish_raster("remove-background", output, timer)
            },
        }
    }

    /// Contour clip via segmentation
    ///
    /// An empty manual selection or a solver failure returns the automatic
    /// cutout instead of an error.
    ///
    /// # Errors
    /// - Undecodable image or mask (`Processing`)
    /// - Automatic cutout failed remotely and locally (`Processing`)
    #[instrument(skip(self, image, request), fields(bytes = image.len(), refine = request.refine))]
    pub async fn contour_clip(&self, image: &[u8], request: ClipRequest) -> Result<ProcessingResult> {
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let raster = ImageCodec::decode(image)?;
        let (width, height) = raster.dimensions();

        let mut cutout: Option<AcceleratedOutput> = None;
        let seed = match request.mode {
            ClipMode::Manual { mask: Some(bytes) } => {
                let mask = ImageCodec::decode_mask_for(&bytes, &raster)?;
                manual_selection(&mask, width, height).map(ClipSeed::Manual)
            },
            ClipMode::Manual { mask: None } => None,
            ClipMode::Automatic { hints } => {
                let output = self.accelerator.remove_background(image).await?;
                let coarse = alpha_of(&ImageCodec::decode(&output.bytes)?).fit_to(width, height);
                cutout = Some(output);
                Some(ClipSeed::Automatic { coarse, hints })
            },
        };
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let Some(seed) = seed else {
            debug!("Empty manual selection, using the automatic cutout");
            return self.clip_fallback(image, cutout, timer).await;
        };

        let stage = Instant::now();
        let refine = request.refine;
        match run_blocking("contour-clip", move || contour::clip(&raster, &seed, refine)).await {
            Ok(output) => {
                timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
                finish_raster("contour-clip", output, timer)
            },
            Err(e) => {
                warn!(error = %e, "Segmentation failed, using the automatic cutout");
                self.clip_fallback(image, cutout, timer).await
            },
        }
    }

    async fn clip_fallback(
        &self,
        image: &[u8],
        cutout: Option<AcceleratedOutput>,
        mut timer: OperationTimer,
    ) -> Result<ProcessingResult> {
        let stage = Instant::now();
        let output = match cutout {
            Some(output) => output,
            None => self.accelerator.remove_background(image).await?,
        };
        timer.timings.transform_ms += OperationTimer::elapsed_ms(stage);
        finish_accelerated("contour-clip", output, timer)
    }

    /// Halftone dot pattern for print separation
    ///
    /// # Errors
    /// - Invalid options (`Input`)
    /// - Undecodable image (`Processing`)
    #[instrument(skip(self, image, options), fields(bytes = image.len(), dot_size = options.dot_size))]
    pub async fn halftone(&self, image: &[u8], options: HalftoneOptions) -> Result<ProcessingResult> {
        options.validate()?;
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let raster = ImageCodec::decode(image)?;
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let stage = Instant::now();
        let output = run_blocking("halftone", move || halftone::rasterize(&raster, &options)).await?;
        timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
        finish_raster("halftone", output, timer)
    }

    /// Composite an overlay onto a base image
    ///
    /// # Errors
    /// - Invalid options or an overlay scaled beyond `max_dimension` (`Input`)
    /// - Undecodable base or overlay (`Processing`)
    #[instrument(skip(self, base, overlay, options), fields(shape = %options.shape))]
    pub async fn watermark(
        &self,
        base: &[u8],
        overlay: &[u8],
        options: WatermarkOptions,
    ) -> Result<ProcessingResult> {
        options.validate()?;
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let base = ImageCodec::decode(base)?;
        let overlay = ImageCodec::decode(overlay)?;
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let max_dimension = self.config.max_dimension;
        let stage = Instant::now();
        let output = run_blocking("watermark", move || {
            watermark::composite(&base, &overlay, &options, max_dimension)
        })
        .await?;
        timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
        finish_raster("watermark", output, timer)
    }

    /// Upscale through the accelerator
    ///
    /// Options and output size are checked before any backend is called.
    ///
    /// # Errors
    /// - Non-positive factor or oversized output (`Input`)
    /// - Undecodable image (`Processing`)
    /// - Failed remotely and locally (`Processing`)
    #[instrument(skip(self, image, options), fields(bytes = image.len(), factor = options.factor))]
    pub async fn upscale(&self, image: &[u8], options: UpscaleOptions) -> Result<ProcessingResult> {
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let (width, height) = ImageCodec::probe_dimensions(image)?;
        options.target_dimensions(width, height, self.config.max_dimension)?;
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let stage = Instant::now();
        let output = self.accelerator.upscale(image, &options).await?;
        timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
        finish_accelerated("upscale", output, timer)
    }

    /// Contrast, brightness and sharpness enhancement
    ///
    /// # Errors
    /// - Invalid factors (`Input`)
    /// - Undecodable image (`Processing`)
    #[instrument(skip(self, image, options), fields(bytes = image.len()))]
    pub async fn enhance_quality(
        &self,
        image: &[u8],
        options: EnhanceOptions,
    ) -> Result<ProcessingResult> {
        options.validate()?;
        let mut timer = OperationTimer::start();
        let stage = Instant::now();
        let raster = ImageCodec::decode(image)?;
        timer.timings.decode_ms = OperationTimer::elapsed_ms(stage);

        let stage = Instant::now();
        let output = run_blocking("enhance-quality", move || {
            enhance::enhance_quality(&raster, &options)
        })
        .await?;
        timer.timings.transform_ms = OperationTimer::elapsed_ms(stage);
        finish_raster("enhance-quality", output, timer)
    }
}

/// Alpha channel of a cutout; opaque when the cutout has none
fn alpha_of(image: &RasterImage) -> Mask {
    let (width, height) = image.dimensions();
    if !image.has_alpha() {
        return Mask::filled(width, height, 255);
    }
    Mask {
        data: image.as_raw().chunks_exact(4).map(|px| px[3]).collect(),
        dimensions: (width, height),
    }
}

async fn run_blocking<T, F>(stage: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        ImagingError::processing_stage_error(stage, &format!("worker failed: {}", e), None)
    })?
}

fn finish(
    operation: &str,
    bytes: Vec<u8>,
    dimensions: (u32, u32),
    mut timer: OperationTimer,
    backend: Option<String>,
) -> ProcessingResult {
    timer.timings.total_ms = OperationTimer::elapsed_ms(timer.started);
    let mut metadata = ProcessingMetadata::new(operation, dimensions);
    metadata.backend = backend;
    metadata.timings = timer.timings;
    let result = ProcessingResult::png(bytes, metadata);
    debug!(summary = %result.timing_summary(), "Operation complete");
    result
}

fn finish_raster(
    operation: &str,
    output: RasterImage,
    mut timer: OperationTimer,
) -> Result<ProcessingResult> {
    let dimensions = output.dimensions();
    let stage = Instant::now();
    let bytes = ImageCodec::encode_png(output)?;
    timer.timings.encode_ms = OperationTimer::elapsed_ms(stage);
    Ok(finish(operation, bytes, dimensions, timer, None))
}

fn finish_accelerated(
    operation: &str,
    output: AcceleratedOutput,
    timer: OperationTimer,
) -> Result<ProcessingResult> {
    let dimensions = ImageCodec::probe_dimensions(&output.bytes)?;
    Ok(finish(
        operation,
        output.bytes,
        dimensions,
        timer,
        Some(output.backend),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{sample_png, MockBackend};
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    fn engine() -> ImagingEngine {
        ImagingEngine::new(EngineConfig::default()).unwrap()
    }

    fn red_png(size: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(size, size, Rgb([255, 0, 0]));
        ImageCodec::encode_png(RasterImage::from_rgb(image)).unwrap()
    }

    #[tokio::test]
    async fn test_mask_from_point_on_solid_image() {
        let result = engine().mask_from_point(&red_png(100), 50, 50, 10).await.unwrap();
        let mask = ImageCodec::decode_mask(&result.bytes).unwrap();
        assert_eq!(mask.count_set(), 100 * 100);
        assert_eq!(result.metadata.operation, "mask-from-point");
        assert_eq!(result.media_type, "image/png");
    }

    #[tokio::test]
    async fn test_point_outside_image_is_input_error() {
        let err = engine()
            .remove_objects(&red_png(10), ObjectSelection::Point { x: 10, y: 0, tolerance: 5 })
            .await
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_remove_objects_keeps_dimensions() {
        let mask = ImageCodec::encode_mask_png(&Mask::filled(5, 5, 255)).unwrap();
        let result = engine()
            .remove_objects(&sample_png(20, 12), ObjectSelection::Mask(mask))
            .await
            .unwrap();
        assert_eq!(result.metadata.dimensions, (20, 12));
        assert!(result.metadata.backend.is_none());
    }

    #[tokio::test]
    async fn test_automatic_background_reports_backend() {
        let mock = MockBackend::new("mock-remote");
        let accelerator = Accelerator::local_only(10_000).with_primary(Arc::new(mock.clone()));
        let engine = ImagingEngine::with_accelerator(EngineConfig::default(), accelerator).unwrap();
        let result = engine
            .remove_background(&sample_png(8, 8), BackgroundMode::Automatic)
            .await
            .unwrap();
        assert_eq!(result.metadata.backend.as_deref(), Some("mock-remote"));
        assert_eq!(mock.get_call_history(), vec!["remove_background"]);
    }

    #[tokio::test]
    async fn test_empty_manual_clip_falls_back_to_cutout() {
        let mock = MockBackend::new("mock-remote");
        let accelerator = Accelerator::local_only(10_000).with_primary(Arc::new(mock.clone()));
        let engine = ImagingEngine::with_accelerator(EngineConfig::default(), accelerator).unwrap();
        let empty = ImageCodec::encode_mask_png(&Mask::empty(8, 8)).unwrap();
        let request = ClipRequest {
            mode: ClipMode::Manual { mask: Some(empty) },
            refine: false,
        };
        let result = engine.contour_clip(&sample_png(8, 8), request).await.unwrap();
        assert_eq!(result.metadata.backend.as_deref(), Some("mock-remote"));
    }

    #[tokio::test]
    async fn test_upscale_is_validated_before_backends() {
        let mock = MockBackend::new("mock-remote");
        let accelerator = Accelerator::local_only(10_000).with_primary(Arc::new(mock.clone()));
        let engine = ImagingEngine::with_accelerator(EngineConfig::default(), accelerator).unwrap();
        let options = UpscaleOptions {
            factor: 0.0,
            ..UpscaleOptions::default()
        };
        let err = engine.upscale(&sample_png(4, 4), options).await.unwrap_err();
        assert!(err.is_input_error());
        assert!(mock.get_call_history().is_empty());
    }

    #[test]
    fn test_alpha_of_rgb_is_opaque() {
        let rgb = RasterImage::from_rgb(RgbImage::new(3, 2));
        assert_eq!(alpha_of(&rgb).count_set(), 6);
    }
}

//! Engine behaviour with injected acceleration backends

use async_trait::async_trait;
use dimo_imaging::{
    AccelerationBackend, Accelerator, BackgroundMode, ClipMode, ClipRequest, EngineConfig,
    ErrorKind, ImageCodec, ImagingEngine, ImagingError, RasterImage, Result, ServiceType,
    UpscaleOptions,
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::sync::{Arc, Mutex};

/// Backend that answers every cutout with a fixed PNG
#[derive(Debug, Clone)]
struct FixedCutout {
    name: &'static str,
    cutout: Option<Vec<u8>>,
    calls: Arc<Mutex<Vec<ServiceType>>>,
}

impl FixedCutout {
    fn serving(name: &'static str, cutout: Vec<u8>) -> Self {
        Self {
            name,
            cutout: Some(cutout),
            calls: Arc::default(),
        }
    }

    fn broken(name: &'static str) -> Self {
        Self {
            name,
            cutout: None,
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<ServiceType> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, service: ServiceType) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(service);
        self.cutout
            .clone()
            .ok_or_else(|| ImagingError::remote(format!("{} is down", self.name)))
    }
}

#[async_trait]
impl AccelerationBackend for FixedCutout {
    fn name(&self) -> &str {
        self.name
    }

    async fn remove_background(&self, _image: &[u8]) -> Result<Vec<u8>> {
        self.answer(ServiceType::RemoveBackground)
    }

    async fn upscale(&self, _image: &[u8], _options: &UpscaleOptions) -> Result<Vec<u8>> {
        self.answer(ServiceType::Upscale)
    }
}

const SIDE: u32 = 40;

/// Blue product on a pale backdrop
fn product_photo() -> Vec<u8> {
    let image = RgbImage::from_fn(SIDE, SIDE, |x, y| {
        if (12..28).contains(&x) && (12..28).contains(&y) {
            Rgb([30, 60, 200])
        } else {
            Rgb([235, 230, 220])
        }
    });
    ImageCodec::encode_png(RasterImage::from_rgb(image)).unwrap()
}

/// Cutout whose alpha covers the product square
fn product_cutout() -> Vec<u8> {
    let image = RgbaImage::from_fn(SIDE, SIDE, |x, y| {
        let inside = (12..28).contains(&x) && (12..28).contains(&y);
        Rgba([30, 60, 200, if inside { 255 } else { 0 }])
    });
    ImageCodec::encode_png(RasterImage::from_rgba(image)).unwrap()
}

fn engine_with(primary: FixedCutout) -> ImagingEngine {
    let config = EngineConfig::default();
    let accelerator = Accelerator::local_only(config.max_dimension).with_primary(Arc::new(primary));
    ImagingEngine::with_accelerator(config, accelerator).unwrap()
}

#[tokio::test]
async fn test_automatic_removal_reports_backend() {
    let backend = FixedCutout::serving("studio-gpu", product_cutout());
    let engine = engine_with(backend.clone());

    let result = engine
        .remove_background(&product_photo(), BackgroundMode::Automatic)
        .await
        .unwrap();

    assert_eq!(result.bytes, product_cutout());
    assert_eq!(result.metadata.backend.as_deref(), Some("studio-gpu"));
    assert_eq!(result.metadata.dimensions, (SIDE, SIDE));
    assert_eq!(backend.calls(), vec![ServiceType::RemoveBackground]);
}

#[tokio::test]
async fn test_automatic_clip_seeds_from_cutout() {
    let backend = FixedCutout::serving("studio-gpu", product_cutout());
    let engine = engine_with(backend.clone());

    let request = ClipRequest {
        mode: ClipMode::Automatic { hints: None },
        refine: false,
    };
    let result = engine.contour_clip(&product_photo(), request).await.unwrap();

    // Segmentation ran locally on top of the cutout
    assert_eq!(result.metadata.backend, None);
    let rgba = ImageCodec::decode(&result.bytes).unwrap().to_rgba_image();
    assert_eq!(rgba.get_pixel(2, 2)[3], 0);
    assert_eq!(rgba.get_pixel(20, 20)[3], 255);
    assert_eq!(rgba.get_pixel(20, 20).0[..3], [30, 60, 200]);
    assert_eq!(backend.calls(), vec![ServiceType::RemoveBackground]);
}

#[tokio::test]
async fn test_empty_manual_mask_returns_cutout() {
    let backend = FixedCutout::serving("studio-gpu", product_cutout());
    let engine = engine_with(backend.clone());

    let blank = ImageCodec::encode_png(RasterImage::from_rgb(RgbImage::new(SIDE, SIDE))).unwrap();
    for mask in [None, Some(blank)] {
        let request = ClipRequest {
            mode: ClipMode::Manual { mask },
            refine: false,
        };
        let result = engine.contour_clip(&product_photo(), request).await.unwrap();
        assert_eq!(result.bytes, product_cutout());
        assert_eq!(result.metadata.backend.as_deref(), Some("studio-gpu"));
    }
    assert_eq!(backend.calls().len(), 2);
}

#[tokio::test]
async fn test_manual_clip_never_calls_accelerator() {
    let backend = FixedCutout::broken("studio-gpu");
    let engine = engine_with(backend.clone());

    let mask = RgbImage::from_fn(SIDE, SIDE, |x, y| {
        let inside = (10..30).contains(&x) && (10..30).contains(&y);
        if inside {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    let mask = ImageCodec::encode_png(RasterImage::from_rgb(mask)).unwrap();
    let request = ClipRequest {
        mode: ClipMode::Manual { mask: Some(mask) },
        refine: false,
    };
    let result = engine.contour_clip(&product_photo(), request).await.unwrap();

    let rgba = ImageCodec::decode(&result.bytes).unwrap().to_rgba_image();
    assert_eq!(rgba.get_pixel(0, 0)[3], 0);
    assert_eq!(rgba.get_pixel(20, 20)[3], 255);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_broken_primary_falls_back_to_local_cutout() {
    let backend = FixedCutout::broken("studio-gpu");
    let engine = engine_with(backend.clone());

    let result = engine
        .remove_background(&product_photo(), BackgroundMode::Automatic)
        .await
        .unwrap();

    assert_eq!(result.metadata.backend.as_deref(), Some("local"));
    let rgba = ImageCodec::decode(&result.bytes).unwrap().to_rgba_image();
    assert_eq!(rgba.dimensions(), (SIDE, SIDE));
    assert_eq!(rgba.get_pixel(0, 0)[3], 0);
    assert_eq!(backend.calls(), vec![ServiceType::RemoveBackground]);
}

#[tokio::test]
async fn test_both_backends_failing_is_processing_error() {
    let config = EngineConfig::default();
    let accelerator = Accelerator::local_only(config.max_dimension)
        .with_primary(Arc::new(FixedCutout::broken("studio-gpu")))
        .with_fallback(Arc::new(FixedCutout::broken("spare")));
    let engine = ImagingEngine::with_accelerator(config, accelerator).unwrap();

    let err = engine
        .upscale(&product_photo(), UpscaleOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Processing);
    let message = err.to_string();
    assert!(message.contains("failed remotely"), "{message}");
    assert!(message.contains("studio-gpu is down"), "{message}");
    assert!(message.contains("spare is down"), "{message}");
}

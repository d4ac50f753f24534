//! Watermark compositing
//!
//! The overlay is cropped to a shape, resized with Lanczos3, pasted onto a
//! transparent layer using its own alpha as paste mask and finally composited
//! over the base image.

use crate::{
    error::{ImagingError, Result},
    services::ImageCodec,
    types::RasterImage,
};
use image::{imageops, imageops::FilterType, RgbaImage};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, instrument};

/// Crop applied to the overlay before resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkShape {
    #[default]
    Original,
    Circle,
    Square,
    #[serde(rename = "rect-4-3")]
    Rect4x3,
    #[serde(rename = "rect-3-4")]
    Rect3x4,
}

impl WatermarkShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Circle => "circle",
            Self::Square => "square",
            Self::Rect4x3 => "rect-4-3",
            Self::Rect3x4 => "rect-3-4",
        }
    }
}

impl fmt::Display for WatermarkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatermarkShape {
    type Err = ImagingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" | "" => Ok(Self::Original),
            "circle" => Ok(Self::Circle),
            "square" => Ok(Self::Square),
            "rect-4-3" => Ok(Self::Rect4x3),
            "rect-3-4" => Ok(Self::Rect3x4),
            other => Err(ImagingError::input(format!(
                "Unknown watermark shape '{}' (expected original, circle, square, rect-4-3 or rect-3-4)",
                other
            ))),
        }
    }
}

/// Placement of the overlay on the base image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatermarkOptions {
    /// Left edge of the overlay; may lie outside the base
    pub x: i64,
    /// Top edge of the overlay; may lie outside the base
    pub y: i64,
    /// Resize factor of the shaped overlay
    pub scale: f32,
    pub shape: WatermarkShape,
}

impl WatermarkOptions {
    #[must_use]
    pub fn at(x: i64, y: i64) -> Self {
        Self {
            x,
            y,
            scale: 1.0,
            shape: WatermarkShape::Original,
        }
    }

    /// # Errors
    /// - Scale is not a positive finite number
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ImagingError::input_value_error("scale", self.scale, "> 0"));
        }
        Ok(())
    }
}

fn center_crop(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let left = (image.width() - width) / 2;
    let top = (image.height() - height) / 2;
    imageops::crop_imm(image, left, top, width, height).to_image()
}

fn crop_to_aspect(image: &RgbaImage, target: f64) -> RgbaImage {
    let (w, h) = image.dimensions();
    let current = f64::from(w) / f64::from(h);
    if current > target {
        let new_w = ((f64::from(h) * target) as u32).clamp(1, w);
        center_crop(image, new_w, h)
    } else {
        let new_h = ((f64::from(w) / target) as u32).clamp(1, h);
        center_crop(image, w, new_h)
    }
}

/// Apply the shape crop (and circular alpha) to the overlay
#[must_use]
pub fn apply_shape(image: &RgbaImage, shape: WatermarkShape) -> RgbaImage {
    let (w, h) = image.dimensions();
    match shape {
        WatermarkShape::Original => image.clone(),
        WatermarkShape::Square => center_crop(image, w.min(h), w.min(h)),
        WatermarkShape::Circle => {
            let size = w.min(h);
            let mut square = center_crop(image, size, size);
            let radius = f64::from(size) / 2.0;
            for (x, y, px) in square.enumerate_pixels_mut() {
                let dx = f64::from(x) + 0.5 - radius;
                let dy = f64::from(y) + 0.5 - radius;
                if dx * dx + dy * dy > radius * radius {
                    px[3] = 0;
                }
            }
            square
        },
        WatermarkShape::Rect4x3 => crop_to_aspect(image, 4.0 / 3.0),
        WatermarkShape::Rect3x4 => crop_to_aspect(image, 3.0 / 4.0),
    }
}

/// Resize by `scale` with Lanczos3; every dimension stays at least 1
///
/// # Errors
/// - Scaled overlay would exceed `max_dimension`
pub fn scale_overlay(image: RgbaImage, scale: f32, max_dimension: u32) -> Result<RgbaImage> {
    if (scale - 1.0).abs() < f32::EPSILON {
        return Ok(image);
    }
    let (w, h) = image.dimensions();
    let scaled = |v: u32| {
        let v = (f64::from(v) * f64::from(scale)).max(1.0);
        u32::try_from(v as u64).unwrap_or(u32::MAX)
    };
    let (new_w, new_h) = (scaled(w), scaled(h));
    ImageCodec::validate_dimensions(new_w, new_h, max_dimension)?;
    Ok(imageops::resize(&image, new_w, new_h, FilterType::Lanczos3))
}

/// Straight-alpha "over" of one pixel
fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 0 {
        return dst;
    }
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (f32::from(src[c]) * sa + f32::from(dst[c]) * da * (1.0 - sa)) / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Composite the overlay onto the base
///
/// Pasting with the overlay's own alpha as mask scales every channel of the
/// layer by that alpha (alpha included) before the "over" step. Parts of the
/// overlay outside the base are dropped. The result is RGBA.
///
/// # Errors
/// - Invalid options
/// - Scaled overlay larger than `max_dimension`
#[instrument(skip(base, overlay), fields(base = ?base.dimensions(), overlay = ?overlay.dimensions()))]
pub fn composite(
    base: &RasterImage,
    overlay: &RasterImage,
    options: &WatermarkOptions,
    max_dimension: u32,
) -> Result<RasterImage> {
    options.validate()?;
    let shaped = apply_shape(&overlay.to_rgba_image(), options.shape);
    let layer = scale_overlay(shaped, options.scale, max_dimension)?;

    let mut out = base.to_rgba_image();
    let (bw, bh) = (i64::from(out.width()), i64::from(out.height()));
    let (lw, lh) = (i64::from(layer.width()), i64::from(layer.height()));

    let x0 = options.x.max(0);
    let y0 = options.y.max(0);
    let x1 = options.x.saturating_add(lw).min(bw);
    let y1 = options.y.saturating_add(lh).min(bh);
    let mut touched = 0usize;

    for y in y0..y1 {
        for x in x0..x1 {
            let src = layer.get_pixel((x - options.x) as u32, (y - options.y) as u32).0;
            let mask = u16::from(src[3]);
            let pasted = src.map(|v| ((u16::from(v) * mask + 127) / 255) as u8);
            let dst = out.get_pixel_mut(x as u32, y as u32);
            dst.0 = over(dst.0, pasted);
            touched += 1;
        }
    }

    debug!(
        shape = %options.shape,
        layer = %format!("{}x{}", lw, lh),
        touched,
        "Watermark composited"
    );
    Ok(RasterImage::from_rgba(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn base() -> RasterImage {
        RasterImage::from_rgba(RgbaImage::from_pixel(40, 30, Rgba([10, 20, 30, 255])))
    }

    const LIMIT: u32 = 10_000;

    fn opaque_overlay(w: u32, h: u32) -> RasterImage {
        RasterImage::from_rgba(RgbaImage::from_pixel(w, h, Rgba([250, 250, 250, 255])))
    }

    #[test]
    fn test_shape_parsing() {
        assert_eq!("circle".parse::<WatermarkShape>().unwrap(), WatermarkShape::Circle);
        assert_eq!("rect-4-3".parse::<WatermarkShape>().unwrap(), WatermarkShape::Rect4x3);
        assert_eq!("Rect-3-4".parse::<WatermarkShape>().unwrap(), WatermarkShape::Rect3x4);
        assert_eq!(WatermarkShape::Square.to_string(), "square");
        assert!("hexagon".parse::<WatermarkShape>().unwrap_err().is_input_error());
    }

    #[test]
    fn test_outside_canvas_is_identity() {
        let base = base();
        for (x, y) in [(140, 0), (0, 130), (-500, -500), (-20, 5)] {
            let out = composite(&base, &opaque_overlay(10, 10), &WatermarkOptions::at(x, y), LIMIT).unwrap();
            assert_eq!(out, base, "offset ({x}, {y})");
        }
    }

    #[test]
    fn test_partial_overlap_is_clipped() {
        let out = composite(&base(), &opaque_overlay(10, 10), &WatermarkOptions::at(35, -5), LIMIT)
            .unwrap()
            .to_rgba_image();
        assert_eq!(out.get_pixel(39, 0).0, [250, 250, 250, 255]);
        assert_eq!(out.get_pixel(34, 0).0, [10, 20, 30, 255]);
        assert_eq!(out.get_pixel(39, 5).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_shape_crops() {
        let wide = RgbaImage::new(80, 40);
        assert_eq!(apply_shape(&wide, WatermarkShape::Square).dimensions(), (40, 40));
        assert_eq!(apply_shape(&wide, WatermarkShape::Rect4x3).dimensions(), (53, 40));
        assert_eq!(apply_shape(&wide, WatermarkShape::Rect3x4).dimensions(), (30, 40));
        let tall = RgbaImage::new(40, 80);
        assert_eq!(apply_shape(&tall, WatermarkShape::Rect4x3).dimensions(), (40, 30));
        assert_eq!(apply_shape(&tall, WatermarkShape::Original).dimensions(), (40, 80));
    }

    #[test]
    fn test_circle_clears_corners() {
        let overlay = RgbaImage::from_pixel(20, 20, Rgba([1, 2, 3, 200]));
        let circle = apply_shape(&overlay, WatermarkShape::Circle);
        assert_eq!(circle.get_pixel(0, 0)[3], 0);
        // Existing alpha is kept inside the circle
        assert_eq!(circle.get_pixel(10, 10)[3], 200);
    }

    #[test]
    fn test_scale_resizes_overlay() {
        let scaled = scale_overlay(RgbaImage::new(10, 20), 0.5, LIMIT).unwrap();
        assert_eq!(scaled.dimensions(), (5, 10));
        let tiny = scale_overlay(RgbaImage::new(10, 20), 0.01, LIMIT).unwrap();
        assert_eq!(tiny.dimensions(), (1, 1));
    }

    #[test]
    fn test_oversized_scale_rejected_before_resize() {
        let err = scale_overlay(RgbaImage::new(10, 10), 1.0e9, LIMIT).unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("exceed"), "{err}");

        let mut options = WatermarkOptions::at(0, 0);
        options.scale = 1001.0;
        assert!(composite(&base(), &opaque_overlay(10, 10), &options, LIMIT)
            .unwrap_err()
            .is_input_error());
    }

    #[test]
    fn test_extreme_offsets_do_not_overflow() {
        for (x, y) in [(i64::MAX, 0), (0, i64::MAX), (i64::MAX - 3, i64::MAX - 3), (i64::MIN, i64::MIN)] {
            let out = composite(&base(), &opaque_overlay(10, 10), &WatermarkOptions::at(x, y), LIMIT)
                .unwrap();
            assert_eq!(out, base(), "offset ({x}, {y})");
        }
    }

    #[test]
    fn test_non_positive_scale_rejected() {
        let mut options = WatermarkOptions::at(0, 0);
        options.scale = 0.0;
        assert!(composite(&base(), &opaque_overlay(4, 4), &options, LIMIT)
            .unwrap_err()
            .is_input_error());
    }

    #[test]
    fn test_transparent_overlay_changes_nothing() {
        let overlay = RasterImage::from_rgba(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 0])));
        let out = composite(&base(), &overlay, &WatermarkOptions::at(2, 2), LIMIT).unwrap();
        assert_eq!(out, base());
    }
}

//! Local upscaling and quality enhancement
//!
//! The upscaler is the deterministic fallback of the remote accelerator:
//! optional median pre-filter, Lanczos3 resize and an unsharp mask whose
//! strength follows the requested detail boost.

use crate::{
    error::{ImagingError, Result},
    services::ImageCodec,
    types::{ChannelLayout, RasterImage},
};
use image::{imageops, imageops::FilterType, ImageBuffer, Pixel};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Inputs narrower than this get a 3×3 median pre-filter
pub const MEDIAN_PREFILTER_BELOW_WIDTH: u32 = 1000;

/// Unsharp mask leaves differences up to this value alone
pub const UNSHARP_THRESHOLD: i16 = 3;

/// Upscale parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleOptions {
    /// Size multiplier
    pub factor: f32,
    /// Unsharp-mask strength; 0 disables sharpening
    pub detail_boost: f32,
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self {
            factor: 2.0,
            detail_boost: 1.5,
        }
    }
}

impl UpscaleOptions {
    /// # Errors
    /// - Non-positive factor or negative detail boost
    pub fn validate(&self) -> Result<()> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(ImagingError::input_value_error("factor", self.factor, "> 0"));
        }
        if !self.detail_boost.is_finite() || self.detail_boost < 0.0 {
            return Err(ImagingError::input_value_error(
                "detail_boost",
                self.detail_boost,
                ">= 0",
            ));
        }
        Ok(())
    }

    /// Output dimensions for an input, checked against the hard maximum
    ///
    /// # Errors
    /// - Invalid options
    /// - Output would be empty or exceed `max_dimension`
    pub fn target_dimensions(&self, width: u32, height: u32, max_dimension: u32) -> Result<(u32, u32)> {
        self.validate()?;
        let new_w = (f64::from(width) * f64::from(self.factor)) as u64;
        let new_h = (f64::from(height) * f64::from(self.factor)) as u64;
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        let (new_w, new_h) = (clamp(new_w), clamp(new_h));
        ImageCodec::validate_dimensions(new_w, new_h, max_dimension)?;
        Ok((new_w, new_h))
    }
}

/// Enhancement factors; 1.0 leaves a property unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceOptions {
    pub contrast: f32,
    pub brightness: f32,
    pub sharpness: f32,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            contrast: 1.2,
            brightness: 1.1,
            sharpness: 1.3,
        }
    }
}

impl EnhanceOptions {
    /// # Errors
    /// - Any factor negative or not finite
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("contrast", self.contrast),
            ("brightness", self.brightness),
            ("sharpness", self.sharpness),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ImagingError::input_value_error(name, value, ">= 0"));
            }
        }
        Ok(())
    }
}

/// Add `percent`% of the high-pass detail where it exceeds the threshold
fn unsharp_mask<P>(image: &ImageBuffer<P, Vec<u8>>, sigma: f32, percent: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let blurred = gaussian_blur_f32(image, sigma);
    let color_channels = 3usize;
    let channels = usize::from(P::CHANNEL_COUNT);
    let mut out = image.clone();
    for ((dst, orig), blur) in out
        .chunks_exact_mut(channels)
        .zip(image.chunks_exact(channels))
        .zip(blurred.chunks_exact(channels))
    {
        for c in 0..color_channels.min(channels) {
            let diff = i16::from(orig[c]) - i16::from(blur[c]);
            if diff.abs() > UNSHARP_THRESHOLD {
                let value = f32::from(orig[c]) + f32::from(diff) * percent / 100.0;
                dst[c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

fn upscale_buffer<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    target: (u32, u32),
    options: &UpscaleOptions,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let filtered;
    let source = if image.width() < MEDIAN_PREFILTER_BELOW_WIDTH {
        filtered = median_filter(image, 1, 1);
        &filtered
    } else {
        image
    };

    let resized = imageops::resize(source, target.0, target.1, FilterType::Lanczos3);
    if options.detail_boost > 0.0 {
        let sigma = 1.0 + options.factor / 4.0;
        unsharp_mask(&resized, sigma, 100.0 * options.detail_boost)
    } else {
        resized
    }
}

/// Deterministic local upscale
///
/// # Errors
/// - Invalid options or an output beyond `max_dimension`
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn upscale_local(
    image: &RasterImage,
    options: &UpscaleOptions,
    max_dimension: u32,
) -> Result<RasterImage> {
    let target = options.target_dimensions(image.width(), image.height(), max_dimension)?;
    let out = match image.layout() {
        ChannelLayout::Rgb => RasterImage::from_rgb(upscale_buffer(&image.to_rgb_image(), target, options)),
        ChannelLayout::Rgba => {
            RasterImage::from_rgba(upscale_buffer(&image.to_rgba_image(), target, options))
        },
    };
    debug!(
        target = %format!("{}x{}", target.0, target.1),
        prefiltered = image.width() < MEDIAN_PREFILTER_BELOW_WIDTH,
        "Local upscale complete"
    );
    Ok(out)
}

/// Interpolate each color channel between a degenerate image and the original
fn blend_toward(data: &mut [u8], degenerate: &[[f32; 3]], channels: usize, factor: f32) {
    for (px, deg) in data.chunks_exact_mut(channels).zip(degenerate) {
        for c in 0..3 {
            let value = deg[c] + (f32::from(px[c]) - deg[c]) * factor;
            px[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn adjust_contrast(data: &mut [u8], channels: usize, factor: f32) {
    let pixels = data.len() / channels;
    if pixels == 0 {
        return;
    }
    let luma_sum: f64 = data
        .chunks_exact(channels)
        .map(|px| {
            (f64::from(px[0]) * 299.0 + f64::from(px[1]) * 587.0 + f64::from(px[2]) * 114.0)
                / 1000.0
        })
        .sum();
    let mean = (luma_sum / pixels as f64 + 0.5).floor() as f32;
    let degenerate = vec![[mean; 3]; pixels];
    blend_toward(data, &degenerate, channels, factor);
}

fn adjust_brightness(data: &mut [u8], channels: usize, factor: f32) {
    let degenerate = vec![[0.0f32; 3]; data.len() / channels];
    blend_toward(data, &degenerate, channels, factor);
}

/// Blend with a 3×3 smoothed copy (center weight 5, border pixels unchanged)
fn adjust_sharpness(data: &mut [u8], width: usize, height: usize, channels: usize, factor: f32) {
    let mut degenerate: Vec<[f32; 3]> = data
        .chunks_exact(channels)
        .map(|px| [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])])
        .collect();
    if width >= 3 && height >= 3 {
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let mut sum = [0.0f32; 3];
                for dy in 0..3 {
                    for dx in 0..3 {
                        let weight = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                        let offset = ((y + dy - 1) * width + (x + dx - 1)) * channels;
                        for c in 0..3 {
                            sum[c] += f32::from(data[offset + c]) * weight;
                        }
                    }
                }
                degenerate[y * width + x] = sum.map(|v| (v / 13.0).round());
            }
        }
    }
    blend_toward(data, &degenerate, channels, factor);
}

/// Contrast, then brightness, then sharpness; alpha is preserved
///
/// # Errors
/// - Invalid factors
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn enhance_quality(image: &RasterImage, options: &EnhanceOptions) -> Result<RasterImage> {
    options.validate()?;
    let channels = image.layout().channels();
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut data = image.as_raw().to_vec();

    adjust_contrast(&mut data, channels, options.contrast);
    adjust_brightness(&mut data, channels, options.brightness);
    adjust_sharpness(&mut data, width, height, channels, options.sharpness);

    RasterImage::new(image.width(), image.height(), image.layout(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_target_dimensions() {
        let options = UpscaleOptions::default();
        assert_eq!(options.target_dimensions(100, 50, 10_000).unwrap(), (200, 100));
        let half = UpscaleOptions {
            factor: 1.5,
            ..UpscaleOptions::default()
        };
        assert_eq!(half.target_dimensions(3, 3, 10_000).unwrap(), (4, 4));
    }

    #[test]
    fn test_upscale_limits() {
        let options = UpscaleOptions {
            factor: 4.0,
            ..UpscaleOptions::default()
        };
        assert!(options
            .target_dimensions(3000, 100, 10_000)
            .unwrap_err()
            .is_input_error());
        for factor in [0.0, -2.0, f32::NAN] {
            let bad = UpscaleOptions {
                factor,
                ..UpscaleOptions::default()
            };
            assert!(bad.validate().unwrap_err().is_input_error());
        }
    }

    #[test]
    fn test_upscale_local_keeps_layout() {
        let rgba = RasterImage::from_rgba(RgbaImage::from_pixel(8, 6, Rgba([100, 150, 200, 77])));
        let out = upscale_local(&rgba, &UpscaleOptions::default(), 10_000).unwrap();
        assert_eq!(out.dimensions(), (16, 12));
        assert_eq!(out.layout(), ChannelLayout::Rgba);

        let rgb = RasterImage::from_rgb(RgbImage::from_pixel(5, 5, Rgb([40, 40, 40])));
        let out = upscale_local(&rgb, &UpscaleOptions::default(), 10_000).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        // A flat image stays flat through median, Lanczos and unsharp mask
        assert!(out.as_raw().iter().all(|&v| v.abs_diff(40) <= 1));
    }

    #[test]
    fn test_unity_enhance_is_identity() {
        let mut img = RgbImage::new(6, 6);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 40) as u8, (y * 40) as u8, 90]);
        }
        let image = RasterImage::from_rgb(img);
        let options = EnhanceOptions {
            contrast: 1.0,
            brightness: 1.0,
            sharpness: 1.0,
        };
        assert_eq!(enhance_quality(&image, &options).unwrap(), image);
    }

    #[test]
    fn test_brightness_zero_is_black_and_alpha_kept() {
        let image = RasterImage::from_rgba(RgbaImage::from_pixel(3, 3, Rgba([200, 100, 50, 123])));
        let options = EnhanceOptions {
            contrast: 1.0,
            brightness: 0.0,
            sharpness: 1.0,
        };
        let out = enhance_quality(&image, &options).unwrap();
        assert!(out.as_raw().chunks_exact(4).all(|px| px == [0, 0, 0, 123]));
    }

    #[test]
    fn test_contrast_spreads_values() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([150, 150, 150]));
        let options = EnhanceOptions {
            contrast: 2.0,
            brightness: 1.0,
            sharpness: 1.0,
        };
        let out = enhance_quality(&RasterImage::from_rgb(img), &options).unwrap();
        // Mean grey 125: 100 → 75, 150 → 175
        assert_eq!(&out.as_raw()[..3], &[75, 75, 75]);
        assert_eq!(&out.as_raw()[3..], &[175, 175, 175]);
    }

    #[test]
    fn test_negative_factor_rejected() {
        let image = RasterImage::from_rgb(RgbImage::new(2, 2));
        let options = EnhanceOptions {
            sharpness: -0.5,
            ..EnhanceOptions::default()
        };
        assert!(enhance_quality(&image, &options).unwrap_err().is_input_error());
    }
}

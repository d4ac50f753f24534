//! Core types for image-editing operations

use crate::error::{ImagingError, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Media type of every encoded result
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// Channel layout of a raster buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Three interleaved channels, no transparency
    Rgb,
    /// Four interleaved channels with straight alpha
    Rgba,
}

impl ChannelLayout {
    /// Number of 8-bit channels per pixel
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// Decoded 8-bit sRGB raster, row-major
///
/// The buffer length always equals `width * height * channels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
}

impl RasterImage {
    /// Create a raster from raw interleaved pixels
    ///
    /// # Errors
    /// - Buffer length does not match the dimensions and layout
    pub fn new(width: u32, height: u32, layout: ChannelLayout, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(ImagingError::processing(format!(
                "Raster buffer has {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                layout
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    #[must_use]
    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            layout: ChannelLayout::Rgb,
            data: image.into_raw(),
        }
    }

    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            layout: ChannelLayout::Rgba,
            data: image.into_raw(),
        }
    }

    /// Normalize any decoded image to RGB, or RGBA when it carries alpha
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        if image.color().has_alpha() {
            Self::from_rgba(image.to_rgba8())
        } else {
            Self::from_rgb(image.to_rgb8())
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.layout == ChannelLayout::Rgba
    }

    /// Raw interleaved pixel bytes
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Copy the color channels into an RGB buffer, dropping alpha
    #[must_use]
    pub fn to_rgb_image(&self) -> RgbImage {
        match self.layout {
            ChannelLayout::Rgb => {
                ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_else(|| RgbImage::new(self.width, self.height))
            },
            ChannelLayout::Rgba => {
                let data = self
                    .data
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect();
                ImageBuffer::from_raw(self.width, self.height, data)
                    .unwrap_or_else(|| RgbImage::new(self.width, self.height))
            },
        }
    }

    /// Copy into an RGBA buffer; RGB input becomes fully opaque
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        match self.layout {
            ChannelLayout::Rgba => {
                ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
            },
            ChannelLayout::Rgb => {
                let data = self
                    .data
                    .chunks_exact(3)
                    .flat_map(|px| [px[0], px[1], px[2], 255])
                    .collect();
                ImageBuffer::from_raw(self.width, self.height, data)
                    .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
            },
        }
    }

    /// Convert into the `image` crate representation for encoding
    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        let (width, height, layout) = (self.width, self.height, self.layout);
        match layout {
            ChannelLayout::Rgb => ImageBuffer::from_raw(width, height, self.data)
                .map_or_else(|| DynamicImage::new_rgb8(width, height), DynamicImage::ImageRgb8),
            ChannelLayout::Rgba => ImageBuffer::from_raw(width, height, self.data)
                .map_or_else(|| DynamicImage::new_rgba8(width, height), DynamicImage::ImageRgba8),
        }
    }
}

/// Single-channel mask associated with a raster
///
/// Values are 0-255; operations decide whether to read them as binary
/// (thresholded) or soft (alpha-style).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl Mask {
    /// Create a new mask, checking the buffer against the dimensions
    ///
    /// # Errors
    /// - Buffer length differs from `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(ImagingError::processing(format!(
                "Mask buffer has {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// All-zero mask
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    /// Mask with every pixel set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_luma(image: GrayImage) -> Self {
        let dimensions = image.dimensions();
        Self {
            data: image.into_raw(),
            dimensions,
        }
    }

    /// Convert mask to a grayscale image
    pub fn to_luma(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, self.data.clone())
            .ok_or_else(|| ImagingError::processing("Failed to create image from mask data"))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Value at (x, y); callers guarantee bounds
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.dimensions.0 as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let width = self.dimensions.0 as usize;
        self.data[y as usize * width + x as usize] = value;
    }

    /// Binary copy: 255 where value > `threshold`, else 0
    #[must_use]
    pub fn binarize(&self, threshold: u8) -> Self {
        Self {
            data: self
                .data
                .iter()
                .map(|&v| if v > threshold { 255 } else { 0 })
                .collect(),
            dimensions: self.dimensions,
        }
    }

    /// Number of non-zero pixels
    #[must_use]
    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }

    /// Whether no pixel is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Match the mask to the target dimensions with nearest-neighbour sampling
    ///
    /// Returns the mask unchanged when the dimensions already agree.
    #[must_use]
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        if self.dimensions == (width, height) {
            return self;
        }
        let (src_w, src_h) = self.dimensions;
        tracing::debug!(
            from = %format!("{}x{}", src_w, src_h),
            to = %format!("{}x{}", width, height),
            "Resizing mask with nearest-neighbour sampling"
        );
        if src_w == 0 || src_h == 0 {
            return Self::empty(width, height);
        }
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let sy = ((u64::from(y) * u64::from(src_h)) / u64::from(height)) as u32;
            for x in 0..width {
                let sx = ((u64::from(x) * u64::from(src_w)) / u64::from(width)) as u32;
                data.push(self.get(sx.min(src_w - 1), sy.min(src_h - 1)));
            }
        }
        Self {
            data,
            dimensions: (width, height),
        }
    }

    /// Foreground/background split at the 127 midpoint
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |n: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                n as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }

}

/// Statistics about a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// An RGB triplet used for keying, halftone base color and segmentation hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorSample(pub [u8; 3]);

impl ColorSample {
    pub const BLACK: Self = Self([0, 0, 0]);

    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    #[must_use]
    pub fn to_f32(self) -> [f32; 3] {
        [
            f32::from(self.0[0]),
            f32::from(self.0[1]),
            f32::from(self.0[2]),
        ]
    }

    /// Euclidean RGB distance to an arbitrary color
    #[must_use]
    pub fn distance_to(self, rgb: [f32; 3]) -> f32 {
        let [r, g, b] = self.to_f32();
        let (dr, dg, db) = (rgb[0] - r, rgb[1] - g, rgb[2] - b);
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Parse a JSON color list such as `[[255, 0, 0], [0, 0, 255]]`
    ///
    /// Every entry must be exactly three integral components in 0-255.
    ///
    /// # Errors
    /// - Malformed JSON or any entry that is not a valid RGB triplet
    pub fn parse_list(json: &str) -> Result<Vec<Self>> {
        let raw: Vec<Vec<f64>> = serde_json::from_str(json)
            .map_err(|e| ImagingError::input(format!("Invalid color format: {}", e)))?;

        raw.iter()
            .enumerate()
            .map(|(index, entry)| Self::from_components(index, entry))
            .collect()
    }

    fn from_components(index: usize, entry: &[f64]) -> Result<Self> {
        if entry.len() != 3 {
            return Err(ImagingError::input(format!(
                "Invalid color format: entry {} has {} components, expected 3",
                index,
                entry.len()
            )));
        }
        let mut rgb = [0u8; 3];
        for (slot, &value) in rgb.iter_mut().zip(entry) {
            if !value.is_finite() || value.fract() != 0.0 || !(0.0..=255.0).contains(&value) {
                return Err(ImagingError::input(format!(
                    "Invalid color format: entry {} component {} is not an integer in 0-255",
                    index, value
                )));
            }
            *slot = value as u8;
        }
        Ok(Self(rgb))
    }
}

/// Timing breakdown of one operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding of all inputs
    pub decode_ms: u64,

    /// The pixel transform itself (including accelerator calls)
    pub transform_ms: u64,

    /// Final PNG encoding
    pub encode_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

/// Metadata about one processing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Operation name, e.g. `remove-objects`
    pub operation: String,

    /// Output dimensions
    pub dimensions: (u32, u32),

    /// Backend that served an accelerated call, if any
    pub backend: Option<String>,

    /// Detailed timing breakdown
    pub timings: ProcessingTimings,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(operation: &str, dimensions: (u32, u32)) -> Self {
        Self {
            operation: operation.to_string(),
            dimensions,
            backend: None,
            timings: ProcessingTimings::default(),
        }
    }
}

/// Encoded output of one operation
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Encoded image bytes
    pub bytes: Vec<u8>,

    /// Declared media type (always PNG)
    pub media_type: &'static str,

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl ProcessingResult {
    #[must_use]
    pub fn png(bytes: Vec<u8>, metadata: ProcessingMetadata) -> Self {
        Self {
            bytes,
            media_type: PNG_MEDIA_TYPE,
            metadata,
        }
    }

    /// Write the encoded bytes to disk
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        format!(
            "{} {}x{} | Total: {}ms | Decode: {}ms | Transform: {}ms | Encode: {}ms",
            self.metadata.operation,
            self.metadata.dimensions.0,
            self.metadata.dimensions.1,
            t.total_ms,
            t.decode_ms,
            t.transform_ms,
            t.encode_ms
        )
    }
}

//! Background keying
//!
//! Two local keyers cut the alpha channel: by a supplied mask, or by distance
//! to a list of key colors. The automatic mode goes through the acceleration
//! backends and is resolved by the engine, not here.

use super::morphology::gaussian_soften;
use crate::{
    error::{ImagingError, Result},
    types::{ColorSample, Mask, RasterImage},
};
use tracing::{debug, instrument};

/// Mask values above this count as foreground when cutting by mask
pub const MASK_CUT_THRESHOLD: u8 = 127;

/// Gaussian kernel used to feather a refined mask cut
pub const REFINE_FEATHER_KSIZE: u32 = 5;

/// Key colors with a Euclidean RGB distance threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ColorKey {
    pub colors: Vec<ColorSample>,
    pub threshold: f32,
}

impl ColorKey {
    /// Build a key, rejecting negative or non-finite thresholds
    ///
    /// # Errors
    /// - Threshold is negative or not finite
    pub fn new(colors: Vec<ColorSample>, threshold: f32) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ImagingError::input_value_error(
                "threshold",
                threshold,
                "finite, >= 0",
            ));
        }
        Ok(Self { colors, threshold })
    }

    /// Parse the JSON color list (`[[r, g, b], ...]`) and build a key
    ///
    /// # Errors
    /// - Malformed color list or invalid threshold
    pub fn parse(colors_json: &str, threshold: f32) -> Result<Self> {
        Self::new(ColorSample::parse_list(colors_json)?, threshold)
    }

    /// Whether `rgb` lies within the threshold of any key color
    #[must_use]
    pub fn matches(&self, rgb: [f32; 3]) -> bool {
        self.colors
            .iter()
            .any(|color| color.distance_to(rgb) <= self.threshold)
    }
}

/// Write `alpha` into the image as `min(existing alpha, alpha)`
///
/// The result is always RGBA; RGB input counts as fully opaque.
#[must_use]
pub fn intersect_alpha(image: &RasterImage, alpha: &Mask) -> RasterImage {
    let mut rgba = image.to_rgba_image();
    for (px, &a) in rgba.pixels_mut().zip(&alpha.data) {
        px[3] = px[3].min(a);
    }
    RasterImage::from_rgba(rgba)
}

/// Cut the background with a supplied mask
///
/// The mask is resized to the image if needed and binarized at 127. With
/// `refine` the cut edge is feathered with a 5×5 Gaussian.
#[instrument(skip(image, mask), fields(width = image.width(), height = image.height()))]
pub fn key_by_mask(image: &RasterImage, mask: &Mask, refine: bool) -> RasterImage {
    let mask = mask
        .clone()
        .fit_to(image.width(), image.height())
        .binarize(MASK_CUT_THRESHOLD);
    let alpha = if refine {
        gaussian_soften(&mask, REFINE_FEATHER_KSIZE)
    } else {
        mask
    };
    debug!(kept = alpha.count_set(), refine, "Cutting background by mask");
    intersect_alpha(image, &alpha)
}

/// Make every pixel within the key distance of a key color transparent
///
/// Pixels outside every key keep their alpha (255 for RGB input).
#[instrument(skip(image, key), fields(width = image.width(), height = image.height(), colors = key.colors.len()))]
pub fn key_by_colors(image: &RasterImage, key: &ColorKey) -> RasterImage {
    let mut rgba = image.to_rgba_image();
    let mut keyed = 0usize;
    for px in rgba.pixels_mut() {
        let rgb = [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])];
        if key.matches(rgb) {
            px[3] = 0;
            keyed += 1;
        }
    }
    debug!(keyed, threshold = key.threshold, "Color key applied");
    RasterImage::from_rgba(rgba)
}

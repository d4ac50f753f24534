//! Magic-wand mask generation
//!
//! Seeded region growing: starting at the clicked pixel, every 4-connected
//! neighbour whose channels all lie within `tolerance` of the seed color joins
//! the region. The result is dilated once with a 3×3 ellipse so anti-aliased
//! boundary pixels are picked up as well.

use super::morphology::{dilate, StructuringElement};
use crate::{
    error::{ImagingError, Result},
    types::{Mask, RasterImage},
};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Seed point and color tolerance for the magic wand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WandSeed {
    pub x: i64,
    pub y: i64,
    /// Maximum per-channel difference from the seed color (0-255)
    pub tolerance: u8,
}

impl WandSeed {
    #[must_use]
    pub fn new(x: i64, y: i64, tolerance: u8) -> Self {
        Self { x, y, tolerance }
    }
}

/// Grow the raw region from the seed without the final dilation
///
/// # Errors
/// - Seed outside the image
pub fn flood_region(image: &RasterImage, seed: WandSeed) -> Result<Mask> {
    let (width, height) = image.dimensions();
    if seed.x < 0 || seed.y < 0 || seed.x >= i64::from(width) || seed.y >= i64::from(height) {
        return Err(ImagingError::input(format!(
            "Coordinates ({}, {}) are out of bounds for image size ({}x{})",
            seed.x, seed.y, width, height
        )));
    }

    let channels = image.layout().channels();
    let pixels = image.as_raw();
    let (w, h) = (width as usize, height as usize);
    let (sx, sy) = (seed.x as usize, seed.y as usize);
    let seed_offset = (sy * w + sx) * channels;
    let seed_rgb = [
        pixels[seed_offset],
        pixels[seed_offset + 1],
        pixels[seed_offset + 2],
    ];
    let tolerance = seed.tolerance;

    let matches = |index: usize| {
        let offset = index * channels;
        (0..3).all(|c| pixels[offset + c].abs_diff(seed_rgb[c]) <= tolerance)
    };

    let mut mask = Mask::empty(width, height);
    let mut queue = VecDeque::new();
    let start = sy * w + sx;
    mask.data[start] = 255;
    queue.push_back(start);

    while let Some(index) = queue.pop_front() {
        let (x, y) = (index % w, index / w);
        let neighbours = [
            (x > 0).then(|| index - 1),
            (x + 1 < w).then(|| index + 1),
            (y > 0).then(|| index - w),
            (y + 1 < h).then(|| index + w),
        ];
        for next in neighbours.into_iter().flatten() {
            if mask.data[next] == 0 && matches(next) {
                mask.data[next] = 255;
                queue.push_back(next);
            }
        }
    }

    Ok(mask)
}

/// Magic-wand selection: grown region plus one 3×3 elliptical dilation
///
/// # Errors
/// - Seed outside the image
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn create_mask_from_point(image: &RasterImage, seed: WandSeed) -> Result<Mask> {
    let region = flood_region(image, seed)?;
    let mask = dilate(&region, &StructuringElement::disk(3), 1);
    debug!(
        region_pixels = region.count_set(),
        mask_pixels = mask.count_set(),
        "Magic wand selection grown"
    );
    Ok(mask)
}

//! Contour clipping over the segmentation solver
//!
//! Builds the four-label seed map from a manual mask or from a coarse
//! automatic cutout, runs the solver and turns its foreground into the alpha
//! channel of an RGBA result.

use super::{
    keying::{intersect_alpha, ColorKey},
    morphology::{dilate, erode, gaussian_soften, open, StructuringElement},
    segmentation::{grabcut, LabelMap, SegmentationLabel},
};
use crate::{
    error::Result,
    types::{Mask, RasterImage},
};
use image::{imageops, imageops::FilterType};
use tracing::{debug, instrument};

/// Manual mask values above this are the user's foreground
pub const MANUAL_MASK_THRESHOLD: u8 = 127;

/// Coarse cutout alpha above this is probable foreground
pub const COARSE_FOREGROUND_THRESHOLD: u8 = 200;

/// Solver iterations for a plain manual clip
pub const MANUAL_ITERATIONS: u32 = 5;

/// Solver iterations for refined and automatic clips
pub const REFINED_ITERATIONS: u32 = 10;

const SEARCH_RING_SIZE: u32 = 40;
const CORE_KERNEL_SIZE: u32 = 7;
const CORE_EROSIONS: u32 = 2;

/// Seed of one contour clip
#[derive(Debug, Clone)]
pub enum ClipSeed {
    /// User strokes, already matched to the image
    Manual(Mask),
    /// Coarse cutout alpha with optional background color hints
    Automatic {
        coarse: Mask,
        hints: Option<ColorKey>,
    },
}

impl ClipSeed {
    /// Solver iterations for this seed
    #[must_use]
    pub fn iterations(&self, refine: bool) -> u32 {
        match self {
            Self::Manual(_) if !refine => MANUAL_ITERATIONS,
            _ => REFINED_ITERATIONS,
        }
    }
}

/// Binarize a manual mask at 127; `None` when nothing is selected
#[must_use]
pub fn manual_selection(mask: &Mask, width: u32, height: u32) -> Option<Mask> {
    let binary = mask
        .clone()
        .fit_to(width, height)
        .binarize(MANUAL_MASK_THRESHOLD);
    (!binary.is_empty()).then_some(binary)
}

/// Label map of a manual clip
///
/// Without `refine` the selection is probable foreground and everything else
/// probable background. With `refine` only a ring around the selection is
/// open to the solver and an eroded core is pinned as foreground.
#[must_use]
pub fn manual_labels(selection: &Mask, refine: bool) -> LabelMap {
    let (width, height) = selection.dimensions;
    if !refine {
        let mut labels = LabelMap::new(width, height, SegmentationLabel::ProbableBackground);
        labels.paint(selection, SegmentationLabel::ProbableForeground);
        return labels;
    }

    let search = dilate(selection, &StructuringElement::disk(SEARCH_RING_SIZE), 1);
    let core = erode(
        selection,
        &StructuringElement::disk(CORE_KERNEL_SIZE),
        CORE_EROSIONS,
    );

    let mut labels = LabelMap::new(width, height, SegmentationLabel::Background);
    labels.paint(&search, SegmentationLabel::ProbableBackground);
    labels.paint(selection, SegmentationLabel::ProbableForeground);
    labels.paint(&core, SegmentationLabel::Foreground);
    labels
}

/// Label map of an automatic clip
///
/// Coarse alpha above 200 is probable foreground, the rest definite
/// background. Pixels near a hint color are forced to definite background.
#[must_use]
pub fn automatic_labels(image: &RasterImage, coarse: &Mask, hints: Option<&ColorKey>) -> LabelMap {
    let (width, height) = image.dimensions();
    let coarse = coarse.clone().fit_to(width, height);
    let mut labels = LabelMap::new(width, height, SegmentationLabel::Background);
    labels.paint(
        &coarse.binarize(COARSE_FOREGROUND_THRESHOLD),
        SegmentationLabel::ProbableForeground,
    );

    if let Some(key) = hints {
        let channels = image.layout().channels();
        let mut forced = 0usize;
        for (index, px) in image.as_raw().chunks_exact(channels).enumerate() {
            let rgb = [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])];
            if key.matches(rgb) {
                labels.set_index(index, SegmentationLabel::Background);
                forced += 1;
            }
        }
        debug!(forced, tolerance = key.threshold, "Color hints applied");
    }

    labels
}

/// Clean up the solver mask when refining
///
/// Opening removes floating islands, one dilation restores thin tips.
#[must_use]
pub fn finish_mask(mask: &Mask, refine: bool) -> Mask {
    if !refine {
        return mask.clone();
    }
    let kernel = StructuringElement::disk(3);
    let opened = open(mask, &kernel, 1);
    dilate(&opened, &kernel, 1)
}

/// Run a full contour clip
///
/// The output is RGBA built from the image's color channels, opaque on the
/// foreground and transparent elsewhere; refined clips get a 3×3 softened edge.
///
/// # Errors
/// - Solver failure, such as a seed without foreground or background
#[instrument(skip(image, seed), fields(width = image.width(), height = image.height(), refine))]
pub fn clip(image: &RasterImage, seed: &ClipSeed, refine: bool) -> Result<RasterImage> {
    let mut labels = match seed {
        ClipSeed::Manual(selection) => manual_labels(selection, refine),
        ClipSeed::Automatic { coarse, hints } => automatic_labels(image, coarse, hints.as_ref()),
    };

    let iterations = seed.iterations(refine);
    grabcut(image, &mut labels, iterations)?;

    let mask = finish_mask(&labels.foreground_mask(), refine);
    let alpha = if refine {
        gaussian_soften(&mask, 3)
    } else {
        mask
    };
    let stats = alpha.statistics();
    debug!(
        iterations,
        foreground = stats.foreground_pixels,
        foreground_ratio = stats.foreground_ratio,
        "Contour clip complete"
    );

    let mut rgba = image.to_rgba_image();
    for (px, &a) in rgba.pixels_mut().zip(&alpha.data) {
        px[3] = a;
    }
    Ok(RasterImage::from_rgba(rgba))
}

/// Working resolution of the border-seeded cutout
pub const CUTOUT_WORKING_SIDE: u32 = 512;

/// Solver iterations of the border-seeded cutout
pub const CUTOUT_ITERATIONS: u32 = 5;

/// Automatic cutout seeded only by the image border
///
/// A band along the border is definite background and everything inside it
/// probable foreground. Segmentation runs on a copy no larger than
/// `working_side`; the mask is scaled back with a triangle filter and
/// intersected with the existing alpha. Images too small to have an interior
/// come back fully opaque.
///
/// # Errors
/// - Solver failure
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn border_cutout(image: &RasterImage, working_side: u32) -> Result<RasterImage> {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    let working = if longest > working_side.max(1) {
        let ratio = f64::from(working_side.max(1)) / f64::from(longest);
        let w = ((f64::from(width) * ratio).round() as u32).max(1);
        let h = ((f64::from(height) * ratio).round() as u32).max(1);
        RasterImage::from_rgb(imageops::resize(&image.to_rgb_image(), w, h, FilterType::Triangle))
    } else {
        RasterImage::from_rgb(image.to_rgb_image())
    };

    let (ww, wh) = working.dimensions();
    let band = (ww.min(wh) / 16).max(1);
    if ww <= 2 * band || wh <= 2 * band {
        debug!(band, "No interior inside the border band");
        return Ok(intersect_alpha(image, &Mask::filled(width, height, 255)));
    }

    let mut labels = LabelMap::new(ww, wh, SegmentationLabel::ProbableForeground);
    for y in 0..wh {
        for x in 0..ww {
            if x < band || y < band || x >= ww - band || y >= wh - band {
                labels.set_index(y as usize * ww as usize + x as usize, SegmentationLabel::Background);
            }
        }
    }
    grabcut(&working, &mut labels, CUTOUT_ITERATIONS)?;

    let mut alpha = labels.foreground_mask();
    if (ww, wh) != (width, height) {
        let luma = alpha.to_luma()?;
        alpha = Mask::from_luma(imageops::resize(&luma, width, height, FilterType::Triangle));
    }
    let stats = alpha.statistics();
    debug!(
        band,
        working = %format!("{}x{}", ww, wh),
        kept = stats.foreground_pixels,
        kept_ratio = stats.foreground_ratio,
        "Border cutout complete"
    );
    Ok(intersect_alpha(image, &alpha))
}

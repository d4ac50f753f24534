//! Halftone rasterization for screen printing
//!
//! The image is sampled on a grid of `dot_size` cells. Each cell becomes one
//! anti-aliased dot whose radius grows with the cell's distance from the base
//! (garment) color, and whose ink is the cell color un-blended from that base.

use crate::{
    error::{ImagingError, Result},
    types::{ColorSample, RasterImage},
};
use image::RgbaImage;
use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Largest possible RGB distance, `sqrt(3 · 255²)`
pub const MAX_RGB_DISTANCE: f32 = 441.672_94;

/// Pixels with alpha above this take part in the cell average
const ACTIVE_ALPHA: f32 = 10.0;

/// Midtone boost applied to the normalized coverage
const COVERAGE_GAMMA: f32 = 0.6;

/// Dots may reach this multiple of the half cell so full coverage closes gaps
const DOT_OVERSIZE: f32 = 1.4;

/// Halftone parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalftoneOptions {
    /// Cell edge length in pixels
    pub dot_size: u32,
    /// Dot size multiplier
    pub scale: f32,
    /// Garment color; cells close to it get no ink
    pub base_color: ColorSample,
    /// Knock-out tolerance (scaled by 1.5)
    pub tolerance: f32,
    /// Gap subtracted from the dot diameter
    pub spacing: f32,
}

impl Default for HalftoneOptions {
    fn default() -> Self {
        Self {
            dot_size: 10,
            scale: 1.0,
            base_color: ColorSample::BLACK,
            tolerance: 30.0,
            spacing: 0.0,
        }
    }
}

impl HalftoneOptions {
    /// Base color from an optional key list: the first entry, black otherwise
    #[must_use]
    pub fn with_base_from(mut self, colors: &[ColorSample]) -> Self {
        self.base_color = colors.first().copied().unwrap_or(ColorSample::BLACK);
        self
    }

    /// # Errors
    /// - Zero dot size, non-positive scale, negative tolerance or spacing
    pub fn validate(&self) -> Result<()> {
        if self.dot_size == 0 {
            return Err(ImagingError::input_value_error("dot_size", self.dot_size, ">= 1"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ImagingError::input_value_error("scale", self.scale, "> 0"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ImagingError::input_value_error(
                "tolerance",
                self.tolerance,
                ">= 0",
            ));
        }
        if !self.spacing.is_finite() || self.spacing < 0.0 {
            return Err(ImagingError::input_value_error("spacing", self.spacing, ">= 0"));
        }
        Ok(())
    }
}

/// One dot decided for a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    pub center: (i64, i64),
    pub radius: u32,
    pub ink: [u8; 3],
}

/// Mean color of a cell, preferring pixels that are not transparent
fn cell_average(cell: ArrayView3<'_, f32>) -> [f32; 3] {
    let mut active = [0.0f32; 4];
    let mut all = [0.0f32; 4];
    for px in cell.rows() {
        let weight_active = px[3] > ACTIVE_ALPHA;
        for c in 0..3 {
            all[c] += px[c];
            if weight_active {
                active[c] += px[c];
            }
        }
        all[3] += 1.0;
        if weight_active {
            active[3] += 1.0;
        }
    }
    let source = if active[3] > 0.0 { active } else { all };
    let n = source[3].max(1.0);
    [source[0] / n, source[1] / n, source[2] / n]
}

/// Dot for a cell of the given average color, if any
#[must_use]
pub fn dot_for_cell(
    average: [f32; 3],
    cell_origin: (u32, u32),
    cell_size: (u32, u32),
    options: &HalftoneOptions,
) -> Option<Dot> {
    let distance = options.base_color.distance_to(average);
    let knockout = options.tolerance * 1.5;
    if distance <= knockout {
        return None;
    }

    let coverage = ((distance - knockout) / (MAX_RGB_DISTANCE - knockout))
        .clamp(0.0, 1.0)
        .powf(COVERAGE_GAMMA);
    let max_radius = (options.dot_size as f32 / 2.0) * DOT_OVERSIZE * options.scale;
    let radius = (coverage * max_radius - options.spacing / 2.0).floor();
    if radius <= 0.0 {
        return None;
    }

    let base = options.base_color.to_f32();
    let ink = if coverage > 0.1 {
        [0, 1, 2].map(|c| {
            ((average[c] - (1.0 - coverage) * base[c]) / coverage).clamp(0.0, 255.0) as u8
        })
    } else {
        average.map(|v| v.clamp(0.0, 255.0) as u8)
    };

    Some(Dot {
        center: (
            i64::from(cell_origin.0 + cell_size.0 / 2),
            i64::from(cell_origin.1 + cell_size.1 / 2),
        ),
        radius: radius as u32,
        ink,
    })
}

/// Draw an anti-aliased filled dot with straight-alpha "over"
fn draw_dot(canvas: &mut Array3<u8>, dot: &Dot) {
    let (height, width) = (canvas.shape()[0] as i64, canvas.shape()[1] as i64);
    let r = dot.radius as i64;
    let rf = dot.radius as f32;
    let (cx, cy) = dot.center;

    for y in (cy - r - 1).max(0)..=(cy + r + 1).min(height - 1) {
        for x in (cx - r - 1).max(0)..=(cx + r + 1).min(width - 1) {
            let d = (((x - cx).pow(2) + (y - cy).pow(2)) as f32).sqrt();
            let coverage = (rf + 0.5 - d).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let (yu, xu) = (y as usize, x as usize);
            let dst_a = f32::from(canvas[[yu, xu, 3]]) / 255.0;
            let out_a = coverage + dst_a * (1.0 - coverage);
            for c in 0..3 {
                let dst = f32::from(canvas[[yu, xu, c]]);
                let src = f32::from(dot.ink[c]);
                let value = (src * coverage + dst * dst_a * (1.0 - coverage)) / out_a;
                canvas[[yu, xu, c]] = value.round().clamp(0.0, 255.0) as u8;
            }
            canvas[[yu, xu, 3]] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Render the halftone as RGBA on a transparent canvas
///
/// Cells are visited row-major from the top-left, so where dots overlap the
/// later one is drawn over the earlier one.
///
/// # Errors
/// - Invalid options
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn rasterize(image: &RasterImage, options: &HalftoneOptions) -> Result<RasterImage> {
    options.validate()?;
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);

    let rgba = image.to_rgba_image();
    let pixels = Array3::from_shape_vec((h, w, 4), rgba.into_raw())
        .map_err(|e| ImagingError::processing_stage_error("halftone", &e.to_string(), None))?
        .mapv(f32::from);
    let mut canvas = Array3::<u8>::zeros((h, w, 4));

    let step = options.dot_size as usize;
    let mut dots = 0usize;
    for y in (0..h).step_by(step) {
        let y_end = (y + step).min(h);
        for x in (0..w).step_by(step) {
            let x_end = (x + step).min(w);
            let cell = pixels.slice(s![y..y_end, x..x_end, ..]);
            let average = cell_average(cell);
            let origin = (x as u32, y as u32);
            let size = ((x_end - x) as u32, (y_end - y) as u32);
            if let Some(dot) = dot_for_cell(average, origin, size, options) {
                draw_dot(&mut canvas, &dot);
                dots += 1;
            }
        }
    }

    debug!(
        dots,
        dot_size = options.dot_size,
        base = ?options.base_color,
        "Halftone rasterized"
    );

    let (raw, _) = canvas.into_raw_vec_and_offset();
    let out = RgbaImage::from_raw(width, height, raw)
        .ok_or_else(|| ImagingError::processing("Halftone canvas has the wrong size"))?;
    Ok(RasterImage::from_rgba(out))
}

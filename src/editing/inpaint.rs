//! Object removal by inpainting
//!
//! The removal region is the thresholded mask grown by a resolution-scaled
//! ellipse. Before diffusion the region is flat-filled with the median color
//! of a ring just outside it, so the object's own colors never bleed into the
//! reconstruction. The reconstruction is then grained and feathered back into
//! the untouched original.

use super::morphology::{dilate, gaussian_soften, subtract, StructuringElement};
use crate::{
    error::Result,
    types::{Mask, RasterImage},
};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Mask values above this count as "remove"
pub const MASK_THRESHOLD: u8 = 50;

/// Standard deviation of the grain added to the reconstruction
pub const GRAIN_SIGMA: f32 = 1.5;

/// Resolution-derived sizes used by the removal pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InpaintParams {
    pub scale_factor: u32,
    /// Edge of the elliptical dilation kernel
    pub kernel_size: u32,
    /// Neighbourhood radius of the diffusion fill
    pub inpaint_radius: u32,
}

impl InpaintParams {
    /// `scale_factor = max(1, min(w, h) / 1000)`, `kernel = 3 + 2·scale`, `radius = 5·scale`
    #[must_use]
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        let scale_factor = (width.min(height) / 1000).max(1);
        Self {
            scale_factor,
            kernel_size: 3 + 2 * scale_factor,
            inpaint_radius: 5 * scale_factor,
        }
    }
}

/// Deterministic Gaussian grain source (SplitMix64 + Box-Muller)
#[derive(Debug, Clone)]
pub struct GrainGenerator {
    state: u64,
    spare: Option<f32>,
}

impl GrainGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed,
            spare: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform sample in (0, 1]
    fn next_unit(&mut self) -> f64 {
        ((self.next_u64() >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }

    /// Zero-mean Gaussian sample with the given standard deviation
    pub fn sample(&mut self, sigma: f32) -> f32 {
        if let Some(spare) = self.spare.take() {
            return spare * sigma;
        }
        let radius = (-2.0 * self.next_unit().ln()).sqrt();
        let theta = std::f64::consts::TAU * self.next_unit();
        self.spare = Some((radius * theta.sin()) as f32);
        (radius * theta.cos()) as f32 * sigma
    }
}

/// Remove the masked object from the image
///
/// A mask whose dimensions differ from the image is resized with
/// nearest-neighbour sampling first. The output keeps the input's dimensions
/// and channel layout; alpha, when present, is carried over unchanged.
///
/// # Errors
/// - Mask cannot be converted for smoothing
#[instrument(skip(image, mask), fields(width = image.width(), height = image.height()))]
pub fn remove_objects(image: &RasterImage, mask: &Mask, grain_seed: u64) -> Result<RasterImage> {
    let (width, height) = image.dimensions();
    let mask = mask.clone().fit_to(width, height);
    let params = InpaintParams::for_dimensions(width, height);

    // 1. Removal region
    let binary = mask.binarize(MASK_THRESHOLD);
    let kernel = StructuringElement::disk(params.kernel_size);
    let region = dilate(&binary, &kernel, 2);
    if region.is_empty() {
        debug!("Empty removal mask, returning original image");
        return Ok(image.clone());
    }

    // 2. Sampling ring just outside the region
    let ring_kernel = StructuringElement::disk(params.kernel_size + 10);
    let ring = subtract(&dilate(&region, &ring_kernel, 1), &region);

    let channels = image.layout().channels();
    let original: Vec<[f32; 3]> = image
        .as_raw()
        .chunks_exact(channels)
        .map(|px| [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])])
        .collect();

    // 3-4. Clean base flat-filled with the ring median
    let mut base = original.clone();
    match ring_median(image, &ring) {
        Some(median) => {
            debug!(?median, ring_pixels = ring.count_set(), "Prefilling removal region");
            for (px, &r) in base.iter_mut().zip(&region.data) {
                if r > 0 {
                    *px = median.map(f32::from);
                }
            }
        },
        None => debug!("Empty sampling ring, diffusing over the original"),
    }

    // 5. Diffusion fill inside the region
    let mut recon = base.clone();
    diffusion_fill(&mut recon, &base, &region, width as usize, params.inpaint_radius);

    // 6-7. Grain, then feather back into the original
    let alpha = gaussian_soften(&region, params.kernel_size * 2 + 1);
    let mut grain = GrainGenerator::new(grain_seed);
    let mut out = image.as_raw().to_vec();

    for (index, px) in out.chunks_exact_mut(channels).enumerate() {
        let a = f32::from(alpha.data[index]) / 255.0;
        if a <= 0.0 {
            continue;
        }
        for c in 0..3 {
            let grained = (recon[index][c] + grain.sample(GRAIN_SIGMA)).clamp(0.0, 255.0);
            let blended = grained * a + original[index][c] * (1.0 - a);
            px[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }

    debug!(
        removed_pixels = region.count_set(),
        kernel = params.kernel_size,
        radius = params.inpaint_radius,
        "Object removal complete"
    );
    RasterImage::new(width, height, image.layout(), out)
}

/// Per-channel median of the ring pixels (upper/lower mean for even counts)
fn ring_median(image: &RasterImage, ring: &Mask) -> Option<[u8; 3]> {
    let channels = image.layout().channels();
    let mut samples: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for (px, &r) in image.as_raw().chunks_exact(channels).zip(&ring.data) {
        if r > 0 {
            for c in 0..3 {
                samples[c].push(px[c]);
            }
        }
    }
    if samples[0].is_empty() {
        return None;
    }

    let mut median = [0u8; 3];
    for (slot, values) in median.iter_mut().zip(samples.iter_mut()) {
        values.sort_unstable();
        let n = values.len();
        *slot = if n % 2 == 1 {
            values[n / 2]
        } else {
            ((u16::from(values[n / 2 - 1]) + u16::from(values[n / 2])) / 2) as u8
        };
    }
    Some(median)
}

/// Fill `region` from its boundary inward, then smooth with edge-stopping diffusion
///
/// Pixels are visited in order of distance from the known area. Each takes the
/// inverse-distance weighted mean of already known pixels within `radius`,
/// biased toward pixels at a similar depth, plus a weak pull toward the
/// prefilled `base` value.
fn diffusion_fill(
    recon: &mut [[f32; 3]],
    base: &[[f32; 3]],
    region: &Mask,
    width: usize,
    radius: u32,
) {
    let height = recon.len() / width.max(1);
    let radius = radius.max(1) as i64;
    let r2 = radius * radius;
    let inside = |i: usize| region.data[i] > 0;

    // Depth of every region pixel, in 8-connected steps from the known area
    let mut depth = vec![0u32; recon.len()];
    let mut known: Vec<bool> = (0..recon.len()).map(|i| !inside(i)).collect();
    let mut queue = VecDeque::new();
    let mut order = Vec::with_capacity(region.count_set());

    for i in 0..recon.len() {
        if inside(i) && neighbours8(i, width, height).any(|n| !inside(n)) {
            depth[i] = 1;
            queue.push_back(i);
        }
    }
    let mut queued: Vec<bool> = vec![false; recon.len()];
    for &i in &queue {
        queued[i] = true;
    }
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for n in neighbours8(i, width, height) {
            if inside(n) && !queued[n] {
                queued[n] = true;
                depth[n] = depth[i] + 1;
                queue.push_back(n);
            }
        }
    }

    // A region with no known surroundings keeps the prefilled base
    if order.is_empty() {
        return;
    }

    let prior_weight = 1.0 / r2 as f32;
    for &p in &order {
        let (px, py) = ((p % width) as i64, (p / width) as i64);
        let mut sum = [0.0f32; 3];
        let mut total = 0.0f32;
        for dy in -radius..=radius {
            let qy = py + dy;
            if qy < 0 || qy >= height as i64 {
                continue;
            }
            for dx in -radius..=radius {
                let qx = px + dx;
                let d2 = dx * dx + dy * dy;
                if d2 == 0 || d2 > r2 || qx < 0 || qx >= width as i64 {
                    continue;
                }
                let q = (qy as usize) * width + qx as usize;
                if !known[q] {
                    continue;
                }
                let level = 1.0 / (1.0 + (depth[q] as f32 - depth[p] as f32).abs());
                let w = level / d2 as f32;
                for c in 0..3 {
                    sum[c] += recon[q][c] * w;
                }
                total += w;
            }
        }
        for c in 0..3 {
            sum[c] += base[p][c] * prior_weight;
        }
        total += prior_weight;
        recon[p] = sum.map(|s| s / total);
        known[p] = true;
    }

    // Edge-stopping (Perona-Malik) smoothing of the filled pixels
    const KAPPA: f32 = 12.0;
    const STEP: f32 = 0.2;
    let iterations = (2 * radius).clamp(4, 40);
    for _ in 0..iterations {
        let snapshot = recon.to_vec();
        for &p in &order {
            let mut delta = [0.0f32; 3];
            for n in neighbours4(p, width, height) {
                let grad = [
                    snapshot[n][0] - snapshot[p][0],
                    snapshot[n][1] - snapshot[p][1],
                    snapshot[n][2] - snapshot[p][2],
                ];
                let magnitude = (grad[0].abs() + grad[1].abs() + grad[2].abs()) / 3.0;
                let conduction = 1.0 / (1.0 + (magnitude / KAPPA).powi(2));
                for c in 0..3 {
                    delta[c] += conduction * grad[c];
                }
            }
            for c in 0..3 {
                recon[p][c] = (snapshot[p][c] + STEP * delta[c]).clamp(0.0, 255.0);
            }
        }
    }
}

fn neighbours4(i: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let (x, y) = (i % width, i / width);
    [
        (x > 0).then(|| i - 1),
        (x + 1 < width).then(|| i + 1),
        (y > 0).then(|| i - width),
        (y + 1 < height).then(|| i + width),
    ]
    .into_iter()
    .flatten()
}

fn neighbours8(i: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let (x, y) = ((i % width) as i64, (i / width) as i64);
    let (w, h) = (width as i64, height as i64);
    (-1i64..=1)
        .flat_map(move |dy| (-1i64..=1).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx != 0 || dy != 0)
        .filter_map(move |(dx, dy)| {
            let (nx, ny) = (x + dx, y + dy);
            (nx >= 0 && ny >= 0 && nx < w && ny < h).then(|| (ny * w + nx) as usize)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelLayout;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn striped_with_square() -> (RasterImage, Mask) {
        let mut img = RgbImage::new(60, 40);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if (x / 4) % 2 == 0 {
                Rgb([200, 180, 160])
            } else {
                Rgb([190, 170, 150])
            };
        }
        let mut mask = Mask::empty(60, 40);
        for y in 15..25 {
            for x in 25..35 {
                img.put_pixel(x, y, Rgb([10, 20, 250]));
                mask.set(x, y, 255);
            }
        }
        (RasterImage::from_rgb(img), mask)
    }

    #[test]
    fn test_params_scale_with_resolution() {
        assert_eq!(
            InpaintParams::for_dimensions(640, 480),
            InpaintParams {
                scale_factor: 1,
                kernel_size: 5,
                inpaint_radius: 5
            }
        );
        let big = InpaintParams::for_dimensions(4000, 3000);
        assert_eq!(big.scale_factor, 3);
        assert_eq!(big.kernel_size, 9);
        assert_eq!(big.inpaint_radius, 15);
    }

    #[test]
    fn test_object_colors_are_removed() {
        let (image, mask) = striped_with_square();
        let out = remove_objects(&image, &mask, 7).unwrap();
        assert_eq!(out.dimensions(), image.dimensions());
        assert_eq!(out.layout(), ChannelLayout::Rgb);

        let rgb = out.to_rgb_image();
        let center = rgb.get_pixel(30, 20);
        // Blue object replaced by the beige surroundings
        assert!(center[2] < 200, "center still blue: {:?}", center);
        assert!(center[0] > 150, "center not reconstructed: {:?}", center);
    }

    #[test]
    fn test_far_pixels_untouched() {
        let (image, mask) = striped_with_square();
        let out = remove_objects(&image, &mask, 7).unwrap();
        let before = image.to_rgb_image();
        let after = out.to_rgb_image();
        for (x, y) in [(0, 0), (59, 39), (2, 20), (57, 5)] {
            assert_eq!(before.get_pixel(x, y), after.get_pixel(x, y));
        }
    }

    #[test]
    fn test_ring_median_even_count_truncates_mean() {
        // Four ring pixels: red 10,11,200,250 / green 0,1,2,3 / blue 7,7,8,8
        let pixels = [
            Rgb([200, 3, 8]),
            Rgb([10, 0, 7]),
            Rgb([250, 2, 8]),
            Rgb([11, 1, 7]),
            Rgb([99, 99, 99]),
        ];
        let image = RgbImage::from_fn(5, 1, |x, _| pixels[x as usize]);
        let mut ring = Mask::empty(5, 1);
        for x in 0..4 {
            ring.set(x, 0, 255);
        }
        let median = ring_median(&RasterImage::from_rgb(image), &ring).unwrap();
        // (11 + 200) / 2 = 105.5, (1 + 2) / 2 = 1.5, (7 + 8) / 2 = 7.5
        assert_eq!(median, [105, 1, 7]);
    }

    #[test]
    fn test_ring_median_odd_count_and_empty_ring() {
        let image = RgbImage::from_fn(3, 1, |x, _| Rgb([(x * 50) as u8, 9, 255 - x as u8]));
        let image = RasterImage::from_rgb(image);
        assert_eq!(ring_median(&image, &Mask::filled(3, 1, 255)), Some([50, 9, 254]));
        assert_eq!(ring_median(&image, &Mask::empty(3, 1)), None);
    }

    #[test]
    fn test_empty_mask_returns_original() {
        let (image, _) = striped_with_square();
        let out = remove_objects(&image, &Mask::empty(60, 40), 1).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_mismatched_mask_is_resized() {
        let (image, _) = striped_with_square();
        let mut small = Mask::empty(6, 4);
        small.set(3, 2, 255);
        let out = remove_objects(&image, &small, 1).unwrap();
        assert_eq!(out.dimensions(), (60, 40));
    }

    #[test]
    fn test_full_mask_has_no_ring_and_still_succeeds() {
        let image = RasterImage::from_rgba(RgbaImage::from_pixel(12, 12, Rgba([5, 6, 7, 128])));
        let out = remove_objects(&image, &Mask::filled(12, 12, 255), 3).unwrap();
        assert_eq!(out.layout(), ChannelLayout::Rgba);
        // Alpha carried over untouched
        assert!(out.as_raw().chunks_exact(4).all(|px| px[3] == 128));
    }

    #[test]
    fn test_grain_is_deterministic_and_centered() {
        let mut a = GrainGenerator::new(42);
        let mut b = GrainGenerator::new(42);
        let samples: Vec<f32> = (0..2000).map(|_| a.sample(1.5)).collect();
        let again: Vec<f32> = (0..2000).map(|_| b.sample(1.5)).collect();
        assert_eq!(samples, again);

        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / samples.len() as f32;
        assert!(mean.abs() < 0.15, "mean {mean}");
        assert!((var.sqrt() - 1.5).abs() < 0.15, "std {}", var.sqrt());
    }
}

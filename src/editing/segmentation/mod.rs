//! GrabCut-style foreground segmentation
//!
//! A four-label map seeds two color mixtures (background and foreground).
//! Each iteration re-assigns mixture components, re-learns both mixtures and
//! solves a min-cut over the 8-connected pixel graph; only the probable labels
//! are ever rewritten.

pub mod gmm;
pub mod maxflow;

use crate::{
    error::{ImagingError, Result},
    types::{Mask, RasterImage},
};
use gmm::{GaussianMixture, Rgb};
use maxflow::FlowGraph;
use tracing::{debug, instrument};

/// Smoothness weight of neighbouring pixels
const GAMMA: f64 = 50.0;

/// Capacity that pins definite labels to their terminal
const LAMBDA: f64 = 9.0 * GAMMA;

/// Per-pixel segmentation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationLabel {
    Background,
    ProbableBackground,
    ProbableForeground,
    Foreground,
}

impl SegmentationLabel {
    /// Foreground or probable foreground
    #[must_use]
    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    /// Definite labels are never changed by the solver
    #[must_use]
    pub fn is_definite(self) -> bool {
        matches!(self, Self::Foreground | Self::Background)
    }
}

/// Row-major label map matching an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<SegmentationLabel>,
}

impl LabelMap {
    #[must_use]
    pub fn new(width: u32, height: u32, fill: SegmentationLabel) -> Self {
        Self {
            width,
            height,
            labels: vec![fill; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn labels(&self) -> &[SegmentationLabel] {
        &self.labels
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> SegmentationLabel {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    /// Overwrite the label wherever `mask` is set
    pub fn paint(&mut self, mask: &Mask, label: SegmentationLabel) {
        for (slot, &m) in self.labels.iter_mut().zip(&mask.data) {
            if m > 0 {
                *slot = label;
            }
        }
    }

    /// Overwrite the label at a flat index
    pub fn set_index(&mut self, index: usize, label: SegmentationLabel) {
        self.labels[index] = label;
    }

    #[must_use]
    pub fn count(&self, label: SegmentationLabel) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// 255 for foreground and probable foreground, 0 elsewhere
    #[must_use]
    pub fn foreground_mask(&self) -> Mask {
        Mask {
            data: self
                .labels
                .iter()
                .map(|l| if l.is_foreground() { 255 } else { 0 })
                .collect(),
            dimensions: (self.width, self.height),
        }
    }
}

/// Contrast-sensitive smoothness weights toward the already visited neighbours
struct NeighbourWeights {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

impl NeighbourWeights {
    fn compute(colors: &[Rgb], width: usize, height: usize) -> Self {
        let diff = |a: Rgb, b: Rgb| {
            (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
        };

        let mut total = 0.0;
        let mut pairs = 0usize;
        for y in 0..height {
            for x in 0..width {
                let p = y * width + x;
                let c = colors[p];
                if x > 0 {
                    total += diff(c, colors[p - 1]);
                    pairs += 1;
                }
                if y > 0 {
                    total += diff(c, colors[p - width]);
                    pairs += 1;
                    if x > 0 {
                        total += diff(c, colors[p - width - 1]);
                        pairs += 1;
                    }
                    if x + 1 < width {
                        total += diff(c, colors[p - width + 1]);
                        pairs += 1;
                    }
                }
            }
        }
        let beta = if total <= f64::EPSILON || pairs == 0 {
            0.0
        } else {
            1.0 / (2.0 * total / pairs as f64)
        };

        let diagonal = GAMMA / std::f64::consts::SQRT_2;
        let n = width * height;
        let mut weights = Self {
            left: vec![0.0; n],
            up_left: vec![0.0; n],
            up: vec![0.0; n],
            up_right: vec![0.0; n],
        };
        for y in 0..height {
            for x in 0..width {
                let p = y * width + x;
                let c = colors[p];
                if x > 0 {
                    weights.left[p] = GAMMA * (-beta * diff(c, colors[p - 1])).exp();
                }
                if y > 0 {
                    weights.up[p] = GAMMA * (-beta * diff(c, colors[p - width])).exp();
                    if x > 0 {
                        weights.up_left[p] =
                            diagonal * (-beta * diff(c, colors[p - width - 1])).exp();
                    }
                    if x + 1 < width {
                        weights.up_right[p] =
                            diagonal * (-beta * diff(c, colors[p - width + 1])).exp();
                    }
                }
            }
        }
        weights
    }
}

/// Pixel indices of the background and foreground sides
fn split_samples(labels: &LabelMap) -> (Vec<usize>, Vec<usize>) {
    let (fg, bg): (Vec<usize>, Vec<usize>) =
        (0..labels.labels.len()).partition(|&i| labels.labels[i].is_foreground());
    (bg, fg)
}

fn gather(colors: &[Rgb], indices: &[usize]) -> Vec<Rgb> {
    indices.iter().map(|&i| colors[i]).collect()
}

/// Refine the probable labels of `labels` in place
///
/// # Errors
/// - Label map and image dimensions differ
/// - The map has no foreground or no background samples
#[instrument(skip(image, labels), fields(width = image.width(), height = image.height()))]
pub fn grabcut(image: &RasterImage, labels: &mut LabelMap, iterations: u32) -> Result<()> {
    if labels.dimensions() != image.dimensions() {
        return Err(ImagingError::processing_stage_error(
            "segmentation",
            "label map does not match the image",
            Some(&format!(
                "{}x{} labels for {}x{} image",
                labels.width,
                labels.height,
                image.width(),
                image.height()
            )),
        ));
    }

    let width = image.width() as usize;
    let height = image.height() as usize;
    let channels = image.layout().channels();
    let colors: Vec<Rgb> = image
        .as_raw()
        .chunks_exact(channels)
        .map(|px| [f64::from(px[0]), f64::from(px[1]), f64::from(px[2])])
        .collect();

    let (bg_indices, fg_indices) = split_samples(labels);
    if bg_indices.is_empty() || fg_indices.is_empty() {
        return Err(ImagingError::processing_stage_error(
            "segmentation",
            "both foreground and background samples are required",
            Some(&format!(
                "{} foreground, {} background pixels",
                fg_indices.len(),
                bg_indices.len()
            )),
        ));
    }

    if labels.labels.iter().all(|l| l.is_definite()) {
        debug!("No probable pixels, nothing to segment");
        return Ok(());
    }

    let mut bg_model = GaussianMixture::from_samples(&gather(&colors, &bg_indices));
    let mut fg_model = GaussianMixture::from_samples(&gather(&colors, &fg_indices));
    let weights = NeighbourWeights::compute(&colors, width, height);
    let n = width * height;

    for iteration in 0..iterations {
        let (bg_indices, fg_indices) = split_samples(labels);
        if bg_indices.is_empty() || fg_indices.is_empty() {
            debug!(iteration, "One side vanished, stopping early");
            break;
        }

        // Assign components, then re-learn both mixtures
        let bg_samples = gather(&colors, &bg_indices);
        let fg_samples = gather(&colors, &fg_indices);
        let bg_assign: Vec<usize> = bg_samples
            .iter()
            .map(|&c| bg_model.most_likely_component(c))
            .collect();
        let fg_assign: Vec<usize> = fg_samples
            .iter()
            .map(|&c| fg_model.most_likely_component(c))
            .collect();
        bg_model = GaussianMixture::fit(&bg_samples, &bg_assign);
        fg_model = GaussianMixture::fit(&fg_samples, &fg_assign);

        let mut graph = FlowGraph::new(n, n * 12);
        for p in 0..n {
            let (from_source, to_sink) = match labels.labels[p] {
                SegmentationLabel::Background => (0.0, LAMBDA),
                SegmentationLabel::Foreground => (LAMBDA, 0.0),
                _ => (bg_model.penalty(colors[p]), fg_model.penalty(colors[p])),
            };
            graph.add_terminal_weights(p, from_source, to_sink);

            let (x, y) = (p % width, p / width);
            if x > 0 {
                graph.add_edge(p, p - 1, weights.left[p], weights.left[p]);
            }
            if y > 0 {
                graph.add_edge(p, p - width, weights.up[p], weights.up[p]);
                if x > 0 {
                    graph.add_edge(p, p - width - 1, weights.up_left[p], weights.up_left[p]);
                }
                if x + 1 < width {
                    graph.add_edge(p, p - width + 1, weights.up_right[p], weights.up_right[p]);
                }
            }
        }

        let flow = graph.max_flow();
        let source_side = graph.source_side();
        let mut changed = 0usize;
        for (p, &is_fg) in source_side.iter().enumerate() {
            let current = labels.labels[p];
            if current.is_definite() {
                continue;
            }
            let next = if is_fg {
                SegmentationLabel::ProbableForeground
            } else {
                SegmentationLabel::ProbableBackground
            };
            if next != current {
                labels.labels[p] = next;
                changed += 1;
            }
        }

        debug!(
            iteration,
            flow,
            changed,
            foreground = labels.labels.iter().filter(|l| l.is_foreground()).count(),
            "Segmentation iteration complete"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb as Pixel, RgbImage};

    /// Red disc on a noisy blue background
    fn disc_scene() -> RasterImage {
        let mut img = RgbImage::new(40, 40);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let dx = x as i32 - 20;
            let dy = y as i32 - 20;
            *px = if dx * dx + dy * dy <= 100 {
                Pixel([220, (x % 3) as u8 * 5, 30])
            } else {
                Pixel([20, 40 + (y % 4) as u8 * 3, 200])
            };
        }
        RasterImage::from_rgb(img)
    }

    #[test]
    fn test_label_predicates() {
        assert!(SegmentationLabel::ProbableForeground.is_foreground());
        assert!(!SegmentationLabel::ProbableBackground.is_foreground());
        assert!(SegmentationLabel::Background.is_definite());
        assert!(!SegmentationLabel::ProbableForeground.is_definite());
    }

    #[test]
    fn test_rectangle_seed_snaps_to_disc() {
        let image = disc_scene();
        let mut labels = LabelMap::new(40, 40, SegmentationLabel::Background);
        let mut rect = Mask::empty(40, 40);
        for y in 6..34 {
            for x in 6..34 {
                rect.set(x, y, 255);
            }
        }
        labels.paint(&rect, SegmentationLabel::ProbableForeground);

        grabcut(&image, &mut labels, 5).unwrap();
        let mask = labels.foreground_mask();
        assert_eq!(mask.get(20, 20), 255);
        assert_eq!(mask.get(8, 8), 0, "background corner inside the seed");
        assert_eq!(mask.get(0, 0), 0);
    }

    #[test]
    fn test_definite_labels_are_kept() {
        let image = disc_scene();
        let mut labels = LabelMap::new(40, 40, SegmentationLabel::ProbableBackground);
        let mut core = Mask::empty(40, 40);
        core.set(20, 20, 255);
        labels.paint(&core, SegmentationLabel::Foreground);
        // A definite foreground pixel in the blue area stays foreground
        let mut stray = Mask::empty(40, 40);
        stray.set(2, 2, 255);
        labels.paint(&stray, SegmentationLabel::Foreground);

        grabcut(&image, &mut labels, 3).unwrap();
        assert_eq!(labels.get(2, 2), SegmentationLabel::Foreground);
        assert_eq!(labels.get(20, 20), SegmentationLabel::Foreground);
    }

    #[test]
    fn test_missing_foreground_is_processing_error() {
        let image = disc_scene();
        let mut labels = LabelMap::new(40, 40, SegmentationLabel::ProbableBackground);
        let err = grabcut(&image, &mut labels, 5).unwrap_err();
        assert!(matches!(err, ImagingError::Processing(_)));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let image = disc_scene();
        let mut labels = LabelMap::new(10, 10, SegmentationLabel::ProbableForeground);
        assert!(grabcut(&image, &mut labels, 1).is_err());
    }
}

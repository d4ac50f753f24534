//! Binary morphology and mask smoothing
//!
//! Structuring elements are ellipses inscribed in a `width × height` box with
//! the anchor at `(width / 2, height / 2)`. Pixels outside the image never
//! contribute, so regions touching the border are not eroded by it.

use crate::types::Mask;
use imageproc::filter::gaussian_blur_f32;

/// Elliptical structuring element stored as one column span per row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    /// Half-open column range `[start, end)` of each row
    spans: Vec<(i64, i64)>,
}

impl StructuringElement {
    /// Ellipse inscribed in a `width × height` box
    #[must_use]
    pub fn ellipse(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let r = i64::from(height / 2);
        let c = i64::from(width / 2);
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let spans = (0..i64::from(height))
            .map(|i| {
                let dy = i - r;
                if dy.abs() <= r {
                    let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round()
                        as i64;
                    ((c - dx).max(0), (c + dx + 1).min(i64::from(width)))
                } else {
                    (0, 0)
                }
            })
            .collect();

        Self {
            width,
            height,
            spans,
        }
    }

    /// Square ellipse of the given size
    #[must_use]
    pub fn disk(size: u32) -> Self {
        Self::ellipse(size, size)
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn anchor(&self) -> (i64, i64) {
        (i64::from(self.width / 2), i64::from(self.height / 2))
    }

    /// Whether the element covers kernel cell (kx, ky)
    #[must_use]
    pub fn contains(&self, kx: u32, ky: u32) -> bool {
        self.spans
            .get(ky as usize)
            .is_some_and(|&(start, end)| i64::from(kx) >= start && i64::from(kx) < end)
    }
}

/// Row-wise prefix sums of set pixels, one extra column per row
struct RowPrefix {
    width: usize,
    sums: Vec<u32>,
}

impl RowPrefix {
    fn new(mask: &Mask) -> Self {
        let width = mask.width() as usize;
        let height = mask.height() as usize;
        let mut sums = vec![0u32; (width + 1) * height];
        for y in 0..height {
            let row = &mask.data[y * width..(y + 1) * width];
            let out = &mut sums[y * (width + 1)..(y + 1) * (width + 1)];
            for x in 0..width {
                out[x + 1] = out[x] + u32::from(row[x] > 0);
            }
        }
        Self { width, sums }
    }

    /// Set pixels in row `y`, columns `[x0, x1)` (already clipped)
    fn count(&self, y: usize, x0: usize, x1: usize) -> u32 {
        let base = y * (self.width + 1);
        self.sums[base + x1] - self.sums[base + x0]
    }
}

fn morph_once(mask: &Mask, element: &StructuringElement, dilate: bool) -> Mask {
    let (width, height) = mask.dimensions;
    let (w, h) = (i64::from(width), i64::from(height));
    let prefix = RowPrefix::new(mask);
    let (ax, ay) = element.anchor();
    let mut out = Mask::empty(width, height);

    for y in 0..h {
        for x in 0..w {
            let mut any = false;
            let mut all = true;
            for (ky, &(start, end)) in element.spans.iter().enumerate() {
                if start >= end {
                    continue;
                }
                let sy = y + ky as i64 - ay;
                if sy < 0 || sy >= h {
                    continue;
                }
                let x0 = (x + start - ax).clamp(0, w);
                let x1 = (x + end - ax).clamp(0, w);
                if x0 >= x1 {
                    continue;
                }
                let set = prefix.count(sy as usize, x0 as usize, x1 as usize);
                if set > 0 {
                    any = true;
                }
                if set < (x1 - x0) as u32 {
                    all = false;
                }
                if (dilate && any) || (!dilate && !all) {
                    break;
                }
            }
            let on = if dilate { any } else { all };
            if on {
                out.data[(y * w + x) as usize] = 255;
            }
        }
    }

    out
}

/// Binary dilation (any non-zero pixel counts as set)
#[must_use]
pub fn dilate(mask: &Mask, element: &StructuringElement, iterations: u32) -> Mask {
    let mut current = mask.binarize(0);
    for _ in 0..iterations {
        current = morph_once(&current, element, true);
    }
    current
}

/// Binary erosion (any non-zero pixel counts as set)
#[must_use]
pub fn erode(mask: &Mask, element: &StructuringElement, iterations: u32) -> Mask {
    let mut current = mask.binarize(0);
    for _ in 0..iterations {
        current = morph_once(&current, element, false);
    }
    current
}

/// Morphological opening: erosion followed by dilation
#[must_use]
pub fn open(mask: &Mask, element: &StructuringElement, iterations: u32) -> Mask {
    let eroded = erode(mask, element, iterations);
    dilate(&eroded, element, iterations)
}

/// Saturating per-pixel difference `a - b`
#[must_use]
pub fn subtract(a: &Mask, b: &Mask) -> Mask {
    let data = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| x.saturating_sub(y))
        .collect();
    Mask {
        data,
        dimensions: a.dimensions,
    }
}

/// Gaussian sigma equivalent to an odd `ksize × ksize` kernel with automatic sigma
#[must_use]
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian-smooth a mask into a soft alpha
#[must_use]
pub fn gaussian_soften(mask: &Mask, ksize: u32) -> Mask {
    let sigma = sigma_for_kernel(ksize).max(0.1);
    match mask.to_luma() {
        Ok(luma) => Mask::from_luma(gaussian_blur_f32(&luma, sigma)),
        Err(_) => mask.clone(),
    }
}

//! Full-covariance RGB Gaussian mixtures

/// Components per mixture
pub const COMPONENTS: usize = 5;

/// Added to the covariance diagonal so flat regions stay invertible
const COVARIANCE_EPSILON: f64 = 0.01;

const KMEANS_ITERATIONS: usize = 10;

pub type Rgb = [f64; 3];

#[derive(Debug, Clone, Copy, Default)]
struct Component {
    weight: f64,
    mean: Rgb,
    inverse: [[f64; 3]; 3],
    /// `1 / sqrt(det(covariance))`
    norm: f64,
}

impl Component {
    fn density(&self, color: Rgb) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            mahalanobis += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }
        self.norm * (-0.5 * mahalanobis).exp()
    }
}

/// Color model of one side of the segmentation
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    components: [Component; COMPONENTS],
}

impl GaussianMixture {
    /// Estimate the mixture from samples and their component assignment
    #[must_use]
    pub fn fit(samples: &[Rgb], assignments: &[usize]) -> Self {
        let mut counts = [0usize; COMPONENTS];
        let mut sums = [[0.0f64; 3]; COMPONENTS];
        let mut products = [[[0.0f64; 3]; 3]; COMPONENTS];

        for (color, &k) in samples.iter().zip(assignments) {
            counts[k] += 1;
            for i in 0..3 {
                sums[k][i] += color[i];
                for j in 0..3 {
                    products[k][i][j] += color[i] * color[j];
                }
            }
        }

        let total = samples.len().max(1) as f64;
        let mut components = [Component::default(); COMPONENTS];
        for (k, component) in components.iter_mut().enumerate() {
            if counts[k] == 0 {
                continue;
            }
            let n = counts[k] as f64;
            let mean = sums[k].map(|s| s / n);
            let mut cov = [[0.0f64; 3]; 3];
            for i in 0..3 {
                for j in 0..3 {
                    cov[i][j] = products[k][i][j] / n - mean[i] * mean[j];
                }
                cov[i][i] += COVARIANCE_EPSILON;
            }

            let mut det = determinant(&cov);
            while det <= f64::EPSILON {
                for (i, row) in cov.iter_mut().enumerate() {
                    row[i] += COVARIANCE_EPSILON;
                }
                det = determinant(&cov);
            }

            *component = Component {
                weight: n / total,
                mean,
                inverse: inverse(&cov, det),
                norm: 1.0 / det.sqrt(),
            };
        }

        Self { components }
    }

    /// Fit a fresh mixture after k-means clustering of the samples
    #[must_use]
    pub fn from_samples(samples: &[Rgb]) -> Self {
        let assignments = kmeans(samples, COMPONENTS, KMEANS_ITERATIONS);
        Self::fit(samples, &assignments)
    }

    /// Mixture likelihood of a color
    #[must_use]
    pub fn likelihood(&self, color: Rgb) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    /// `-ln(likelihood)`, finite even for colors the model never saw
    #[must_use]
    pub fn penalty(&self, color: Rgb) -> f64 {
        -self.likelihood(color).max(f64::MIN_POSITIVE).ln()
    }

    /// Component with the highest density for the color
    #[must_use]
    pub fn most_likely_component(&self, color: Rgb) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (k, component) in self.components.iter().enumerate() {
            let density = component.density(color);
            if density > best_density {
                best = k;
                best_density = density;
            }
        }
        best
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn squared_distance(a: Rgb, b: Rgb) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Deterministic k-means with farthest-point seeding
///
/// Returns the cluster index of every sample. Clusters that never receive a
/// sample stay empty.
#[must_use]
pub fn kmeans(samples: &[Rgb], k: usize, iterations: usize) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return vec![0; samples.len()];
    }

    let mut centers: Vec<Rgb> = vec![samples[samples.len() / 2]];
    let mut nearest: Vec<f64> = samples
        .iter()
        .map(|&s| squared_distance(s, centers[0]))
        .collect();
    while centers.len() < k {
        let (index, &farthest) = nearest
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &0.0));
        if farthest <= 0.0 {
            break;
        }
        let center = samples[index];
        centers.push(center);
        for (d, &s) in nearest.iter_mut().zip(samples) {
            *d = d.min(squared_distance(s, center));
        }
    }

    let mut labels = vec![0usize; samples.len()];
    for _ in 0..iterations.max(1) {
        let mut changed = false;
        for (label, &s) in labels.iter_mut().zip(samples) {
            let best = centers
                .iter()
                .enumerate()
                .min_by(|a, b| squared_distance(s, *a.1).total_cmp(&squared_distance(s, *b.1)))
                .map_or(0, |(i, _)| i);
            if best != *label {
                *label = best;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        for (&label, s) in labels.iter().zip(samples) {
            counts[label] += 1;
            for i in 0..3 {
                sums[label][i] += s[i];
            }
        }
        for (center, (sum, &count)) in centers.iter_mut().zip(sums.iter().zip(&counts)) {
            if count > 0 {
                *center = sum.map(|v| v / count as f64);
            }
        }

        if !changed {
            break;
        }
    }

    labels
}

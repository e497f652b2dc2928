/// Transform interface and the classical reference implementation
///
/// A transform turns one grayscale image into the derived artifacts the
/// pipeline publishes: an edge map, a compressed representation and a
/// feature vector. Workers share one transform instance, so implementations
/// must be stateless (or internally synchronized). Randomness is injected
/// per task so a seeded pipeline produces repeatable outputs.
use crate::error::{PipelineError, Result};
use ndarray::{s, Array2, ArrayView2, Axis};
use rand::{Rng, RngCore};

/// Upper bound on the qubit-equivalent metric
pub const MAX_QUBITS: u32 = 8;

/// One complex coefficient of the compressed representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficient {
    pub re: f64,
    pub im: f64,
}

/// Artifacts produced by a transform for a single image
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub edge_map: Array2<f64>,
    pub compressed: Vec<Coefficient>,
    pub features: Vec<f64>,
}

/// Common interface for image transforms
pub trait Transform: Send + Sync {
    /// Compute derived artifacts for one image
    fn apply(&self, image: ArrayView2<'_, f64>, rng: &mut dyn RngCore) -> Result<TransformOutput>;

    /// Transform name (for logging)
    fn name(&self) -> &str;
}

/// Gradient edge detection, random-coefficient compression and
/// statistical/texture features
#[derive(Debug, Clone)]
pub struct ClassicalTransform {
    /// Multiplier applied to gradient magnitudes before clipping
    pub enhancement_factor: f64,
    /// Fraction of source elements kept as coefficients
    pub compression_ratio: f64,
    /// Lower bound on the coefficient count
    pub min_coefficients: usize,
    /// Stride of the texture patches (also the number of patches)
    pub texture_stride: usize,
}

impl Default for ClassicalTransform {
    fn default() -> Self {
        Self {
            enhancement_factor: 1.2,
            compression_ratio: 0.25,
            min_coefficients: 16,
            texture_stride: 4,
        }
    }
}

impl ClassicalTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gradient magnitude, enhanced and clipped to [0, 1]
    pub fn detect_edges(&self, image: ArrayView2<'_, f64>) -> Array2<f64> {
        let grad_x = gradient(image, Axis(1));
        let grad_y = gradient(image, Axis(0));

        let mut edges = grad_x;
        edges.zip_mut_with(&grad_y, |gx, &gy| {
            let magnitude = (*gx * *gx + gy * gy).sqrt();
            *gx = (magnitude * self.enhancement_factor).clamp(0.0, 1.0);
        });
        edges
    }

    /// Placeholder compression: emits random coefficients sized from the input
    pub fn compress(&self, image: ArrayView2<'_, f64>, rng: &mut dyn RngCore) -> Vec<Coefficient> {
        let size = ((image.len() as f64 * self.compression_ratio) as usize).max(self.min_coefficients);
        (0..size)
            .map(|_| Coefficient {
                re: rng.gen::<f64>(),
                im: 0.5 * rng.gen::<f64>(),
            })
            .collect()
    }

    /// Mean, std-dev, min, max, then the variance of each strided texture patch
    pub fn extract_features(&self, image: ArrayView2<'_, f64>) -> Vec<f64> {
        let min = image.iter().copied().fold(f64::INFINITY, f64::min);
        let max = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut features = vec![mean(image.iter().copied()), std_dev(image), min, max];

        let stride = self.texture_stride as isize;
        for offset in 0..self.texture_stride {
            if offset >= image.nrows() || offset >= image.ncols() {
                continue;
            }
            let patch = image.slice(s![offset..;stride, offset..;stride]);
            if !patch.is_empty() {
                features.push(variance(patch));
            }
        }
        features
    }
}

impl Transform for ClassicalTransform {
    fn apply(&self, image: ArrayView2<'_, f64>, rng: &mut dyn RngCore) -> Result<TransformOutput> {
        validate_image(image)?;

        Ok(TransformOutput {
            edge_map: self.detect_edges(image),
            compressed: self.compress(image, rng),
            features: self.extract_features(image),
        })
    }

    fn name(&self) -> &str {
        "classical"
    }
}

/// Reject images no transform can meaningfully process
pub fn validate_image(image: ArrayView2<'_, f64>) -> Result<()> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Err(PipelineError::invalid_image(format!(
            "empty image ({rows}x{cols})"
        )));
    }
    if let Some(bad) = image.iter().find(|v| !v.is_finite()) {
        return Err(PipelineError::invalid_image(format!(
            "non-finite pixel value {bad}"
        )));
    }
    Ok(())
}

/// Qubit-equivalent of a compressed representation: floor(log2(n)) capped at 8
pub fn qubits_for(compressed_len: usize) -> u32 {
    if compressed_len == 0 {
        return 0;
    }
    compressed_len.ilog2().min(MAX_QUBITS)
}

/// Central differences in the interior, one-sided at the borders.
/// An axis of length 1 has zero gradient.
fn gradient(image: ArrayView2<'_, f64>, axis: Axis) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros(image.raw_dim());
    let n = image.len_of(axis);
    if n < 2 {
        return out;
    }

    for (lane_in, mut lane_out) in image.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        lane_out[0] = lane_in[1] - lane_in[0];
        lane_out[n - 1] = lane_in[n - 1] - lane_in[n - 2];
        for i in 1..n - 1 {
            lane_out[i] = (lane_in[i + 1] - lane_in[i - 1]) / 2.0;
        }
    }
    out
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Population variance
pub fn variance(values: ArrayView2<'_, f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values.iter().copied());
    values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: ArrayView2<'_, f64>) -> f64 {
    variance(values).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_zero_image_has_zero_edges() {
        let transform = ClassicalTransform::new();
        let image = Array2::<f64>::zeros((4, 4));
        let edges = transform.detect_edges(image.view());
        assert_eq!(edges.dim(), (4, 4));
        assert!(edges.iter().all(|&v| v == 0.0));
        assert_eq!(std_dev(edges.view()), 0.0);
    }

    #[test]
    fn test_gradient_matches_central_differences() {
        let image = array![[0.0, 0.1, 0.4], [0.0, 0.1, 0.4]];
        let gx = gradient(image.view(), Axis(1));
        assert!((gx[[0, 0]] - 0.1).abs() < 1e-12);
        assert!((gx[[0, 1]] - 0.2).abs() < 1e-12);
        assert!((gx[[0, 2]] - 0.3).abs() < 1e-12);

        let gy = gradient(image.view(), Axis(0));
        assert!(gy.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_edges_are_clipped() {
        let transform = ClassicalTransform::new();
        let image = array![[0.0, 1.0], [1.0, 0.0]];
        let edges = transform.detect_edges(image.view());
        assert!(edges.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(edges[[0, 0]], 1.0);
    }

    #[test]
    fn test_compression_size_and_qubits() {
        let transform = ClassicalTransform::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let small = Array2::<f64>::zeros((4, 4));
        let coeffs = transform.compress(small.view(), &mut rng);
        assert_eq!(coeffs.len(), 16);
        assert_eq!(qubits_for(coeffs.len()), 4);

        let large = Array2::<f64>::zeros((128, 128));
        let coeffs = transform.compress(large.view(), &mut rng);
        assert_eq!(coeffs.len(), 4096);
        assert_eq!(qubits_for(coeffs.len()), MAX_QUBITS);
        assert!(coeffs.iter().all(|c| (0.0..1.0).contains(&c.re) && (0.0..0.5).contains(&c.im)));
    }

    #[test]
    fn test_seeded_compression_is_repeatable() {
        let transform = ClassicalTransform::new();
        let image = Array2::<f64>::zeros((8, 8));
        let a = transform.compress(image.view(), &mut ChaCha8Rng::seed_from_u64(1));
        let b = transform.compress(image.view(), &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_features_layout() {
        let transform = ClassicalTransform::new();
        let image = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f64 / 63.0);
        let features = transform.extract_features(image.view());

        assert_eq!(features.len(), 8);
        assert!((features[0] - 0.5).abs() < 1e-12);
        assert_eq!(features[2], 0.0);
        assert_eq!(features[3], 1.0);
    }

    #[test]
    fn test_small_image_skips_empty_patches() {
        let transform = ClassicalTransform::new();
        let image = array![[0.2, 0.4], [0.6, 0.8]];
        let features = transform.extract_features(image.view());
        // Patches at offsets 2 and 3 are empty
        assert_eq!(features.len(), 6);
    }

    #[test]
    fn test_apply_rejects_invalid_images() {
        let transform = ClassicalTransform::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let empty = Array2::<f64>::zeros((0, 4));
        assert!(matches!(
            transform.apply(empty.view(), &mut rng),
            Err(PipelineError::InvalidImage(_))
        ));

        let nan = array![[0.0, f64::NAN]];
        assert!(transform.apply(nan.view(), &mut rng).is_err());
    }

    #[test]
    fn test_single_row_image() {
        let transform = ClassicalTransform::new();
        let image = array![[0.0, 0.5, 1.0]];
        let output = transform
            .apply(image.view(), &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        assert_eq!(output.edge_map.dim(), (1, 3));
        assert!((output.edge_map[[0, 1]] - 0.6).abs() < 1e-12);
    }
}

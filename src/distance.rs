//! Pairwise distance matrices for the precomputed-distance partitioners.

use crate::dataset::Representation;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, Axis};

/// How two feature vectors are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// L2 norm of the difference (pixel-norm distance).
    #[default]
    Euclidean,
    /// Fraction of coordinates that differ (for hash bit vectors).
    Hamming,
}

impl Metric {
    pub fn distance(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
        match self {
            Metric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = *x as f64 - *y as f64;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
            Metric::Hamming => {
                if a.is_empty() {
                    return 0.0;
                }
                let differing = a.iter().zip(b.iter()).filter(|(x, y)| x != y).count();
                differing as f64 / a.len() as f64
            }
        }
    }
}

/// Square, symmetric, zero-diagonal, non-negative dissimilarities.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix(Array2<f64>);

impl DistanceMatrix {
    pub fn new(matrix: Array2<f64>) -> Result<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(Error::invalid(
                "distance matrix",
                format!("must be square, got {}x{}", n, matrix.ncols()),
            ));
        }
        for i in 0..n {
            if matrix[[i, i]] != 0.0 {
                return Err(Error::invalid(
                    "distance matrix",
                    format!("diagonal entry {} is {}", i, matrix[[i, i]]),
                ));
            }
            for j in (i + 1)..n {
                let (a, b) = (matrix[[i, j]], matrix[[j, i]]);
                if !a.is_finite() || a < 0.0 {
                    return Err(Error::invalid(
                        "distance matrix",
                        format!("entry ({}, {}) is {}", i, j, a),
                    ));
                }
                if (a - b).abs() > 1e-9 * a.abs().max(b.abs()).max(1.0) {
                    return Err(Error::invalid(
                        "distance matrix",
                        format!("not symmetric at ({}, {})", i, j),
                    ));
                }
            }
        }
        Ok(Self(matrix))
    }

    /// Pairwise distances between the rows of a feature matrix.
    ///
    /// Fails if any distance comes out non-finite (NaN or infinite features).
    pub fn from_features(features: &Array2<f32>, metric: Metric) -> Result<Self> {
        let n = features.nrows();
        let mut matrix = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d = metric.distance(features.row(i), features.row(j));
                if !d.is_finite() {
                    return Err(Error::invalid(
                        "features",
                        format!("distance between rows {} and {} is {}", i, j, d),
                    ));
                }
                matrix[[i, j]] = d;
                matrix[[j, i]] = d;
            }
        }
        Ok(Self(matrix))
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[[i, j]]
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }

    /// Upper triangle, row-major, `n * (n - 1) / 2` entries.
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.0.nrows();
        let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.0[[i, j]]);
            }
        }
        out
    }
}

impl Representation for DistanceMatrix {
    fn len(&self) -> usize {
        self.0.nrows()
    }

    fn select(&self, indices: &[usize]) -> Self {
        let rows = self.0.select(Axis(0), indices);
        Self(rows.select(Axis(1), indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_euclidean_matrix() {
        let features = array![[0.0f32, 0.0], [3.0, 4.0], [0.0, 1.0]];
        let dist = DistanceMatrix::from_features(&features, Metric::Euclidean).unwrap();
        assert_abs_diff_eq!(dist.get(0, 1), 5.0);
        assert_abs_diff_eq!(dist.get(1, 0), 5.0);
        assert_abs_diff_eq!(dist.get(0, 2), 1.0);
        assert_abs_diff_eq!(dist.get(2, 2), 0.0);
        assert!(DistanceMatrix::new(dist.as_array().clone()).is_ok());
    }

    #[test]
    fn test_hamming_is_fraction_of_bits() {
        let hashes = array![[1.0f32, 0.0, 1.0, 1.0], [1.0, 1.0, 0.0, 1.0]];
        let dist = DistanceMatrix::from_features(&hashes, Metric::Hamming).unwrap();
        assert_abs_diff_eq!(dist.get(0, 1), 0.5);
    }

    #[test]
    fn test_non_finite_features_rejected() {
        let features = array![[0.0f32, f32::NAN], [1.0, 1.0], [5.0, 5.0]];
        assert!(DistanceMatrix::from_features(&features, Metric::Euclidean).is_err());
        let features = array![[f32::INFINITY], [1.0]];
        assert!(DistanceMatrix::from_features(&features, Metric::Euclidean).is_err());
    }

    #[test]
    fn test_rejects_asymmetric_and_diagonal() {
        assert!(DistanceMatrix::new(array![[0.0, 1.0], [2.0, 0.0]]).is_err());
        assert!(DistanceMatrix::new(array![[1.0, 1.0], [1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::new(array![[0.0, -1.0], [-1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::new(Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_select_principal_submatrix() {
        let dist = DistanceMatrix::new(array![
            [0.0, 1.0, 2.0],
            [1.0, 0.0, 3.0],
            [2.0, 3.0, 0.0]
        ])
        .unwrap();
        let sub = dist.select(&[2, 0]);
        assert_eq!(sub.as_array(), &array![[0.0, 2.0], [2.0, 0.0]]);
        assert_eq!(dist.condensed(), vec![1.0, 2.0, 3.0]);
    }
}

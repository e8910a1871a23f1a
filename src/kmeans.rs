use crate::error::{Error, Result};
use crate::partition::Partitioner;
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand::rngs::StdRng;

/// Lloyd's K-means over a feature matrix (one row per item).
#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_iter: usize,
    pub tolerance: f32,
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tolerance: 1e-4,
            seed: 0,
        }
    }
}

impl KMeans {
    pub fn new(max_iter: usize, seed: u64) -> Self {
        Self {
            max_iter,
            seed,
            ..Self::default()
        }
    }

    /// Euclidean distance between two rows
    #[inline]
    fn e_dist(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Assign every row of `data` to one of `k` clusters.
    ///
    /// With no more rows than clusters every row gets its own label.
    pub fn fit(&self, data: &Array2<f32>, k: usize) -> Result<Vec<usize>> {
        if k == 0 {
            return Err(Error::invalid("k", "must be at least 1"));
        }
        let nrows = data.nrows();
        if nrows <= k {
            return Ok((0..nrows).collect());
        }

        let mut rng = StdRng::seed_from_u64(self.seed);

        // Randomly select k initial centroids
        let mut indices: Vec<usize> = (0..nrows).collect();
        indices.shuffle(&mut rng);

        let mut centroids = Array2::<f32>::zeros((k, data.ncols()));
        for (ci, &idx) in indices.iter().take(k).enumerate() {
            centroids.row_mut(ci).assign(&data.row(idx));
        }

        // Each point’s cluster assignment
        let mut assignments = vec![0usize; nrows];

        for _ in 0..self.max_iter {
            // Step 1: assign points to nearest centroid
            for (i, row) in data.outer_iter().enumerate() {
                let mut best_cluster = 0;
                let mut best_dist = f32::MAX;

                for (ci, c_row) in centroids.outer_iter().enumerate() {
                    let dist = Self::e_dist(row, c_row);
                    if dist < best_dist {
                        best_dist = dist;
                        best_cluster = ci;
                    }
                }
                assignments[i] = best_cluster;
            }

            // Step 2: update centroids as mean of assigned points
            let mut new_centroids = Array2::<f32>::zeros((k, data.ncols()));
            let mut counts = vec![0usize; k];

            for (i, row) in data.outer_iter().enumerate() {
                let c = assignments[i];
                let mut target = new_centroids.row_mut(c);
                target += &row;
                counts[c] += 1;
            }

            for ci in 0..k {
                if counts[ci] > 0 {
                    new_centroids
                        .row_mut(ci)
                        .mapv_inplace(|x| x / counts[ci] as f32);
                } else {
                    // reinitialize empty cluster randomly
                    let idx = rng.gen_range(0..nrows);
                    new_centroids.row_mut(ci).assign(&data.row(idx));
                }
            }

            let diff = (&centroids - &new_centroids).mapv(|x| x.abs()).sum();
            centroids = new_centroids;
            if diff < self.tolerance {
                break;
            }
        }

        log::trace!("k-means assigned {} rows to {} clusters", nrows, k);
        Ok(assignments)
    }
}

impl Partitioner<Array2<f32>> for KMeans {
    fn partition(&self, data: &Array2<f32>, k: usize) -> Result<Vec<usize>> {
        self.fit(data, k)
    }
}

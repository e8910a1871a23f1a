//! Agglomerative clustering over a precomputed distance matrix.
//!
//! The merge history is computed with `kodama`, which numbers clusters the
//! SciPy way: items are `0..n` and merge step `i` creates cluster `n + i`.
//! Cutting the history after `n - k` merges leaves exactly `k` clusters.

use crate::dataset::Representation;
use crate::distance::DistanceMatrix;
use crate::error::{Error, Result};
use crate::partition::Partitioner;
use kodama::{linkage as kodama_linkage, Method as KodamaMethod};

/// How the distance between two clusters is derived from item distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Minimum pairwise distance.
    Single,
    /// Maximum pairwise distance.
    Complete,
    /// Mean pairwise distance.
    #[default]
    Average,
    /// Increase in within-cluster variance.
    Ward,
}

impl From<Linkage> for KodamaMethod {
    fn from(linkage: Linkage) -> Self {
        match linkage {
            Linkage::Single => KodamaMethod::Single,
            Linkage::Complete => KodamaMethod::Complete,
            Linkage::Average => KodamaMethod::Average,
            Linkage::Ward => KodamaMethod::Ward,
        }
    }
}

/// One merge of two clusters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeStep {
    pub cluster_a: usize,
    pub cluster_b: usize,
    pub distance: f64,
    /// Number of items in the merged cluster.
    pub size: usize,
}

/// Full merge history over `n_items` items (`n_items - 1` steps).
#[derive(Debug, Clone, PartialEq)]
pub struct MergeHistory {
    n_items: usize,
    steps: Vec<MergeStep>,
}

impl MergeHistory {
    pub fn from_distances(distances: &DistanceMatrix, linkage: Linkage) -> Self {
        let n = distances.len();
        if n < 2 {
            return Self {
                n_items: n,
                steps: Vec::new(),
            };
        }
        let mut condensed = distances.condensed();
        let dendrogram = kodama_linkage(&mut condensed, n, linkage.into());
        let steps = dendrogram
            .steps()
            .iter()
            .map(|step| MergeStep {
                cluster_a: step.cluster1,
                cluster_b: step.cluster2,
                distance: step.dissimilarity,
                size: step.size,
            })
            .collect();
        Self { n_items: n, steps }
    }

    /// Build a history from explicit steps, checking that every step only
    /// refers to items or to earlier merges.
    pub fn from_steps(n_items: usize, steps: Vec<MergeStep>) -> Result<Self> {
        if n_items > 0 && steps.len() + 1 != n_items {
            return Err(Error::invalid(
                "merge history",
                format!("{} items need {} merges, got {}", n_items, n_items - 1, steps.len()),
            ));
        }
        let mut used = vec![false; 2 * n_items];
        let mut sizes = vec![1usize; n_items];
        for (i, step) in steps.iter().enumerate() {
            let limit = n_items + i;
            let (a, b) = (step.cluster_a, step.cluster_b);
            if a >= limit || b >= limit || a == b || used[a] || used[b] {
                return Err(Error::invalid(
                    "merge history",
                    format!("step {} merges {} and {}", i, a, b),
                ));
            }
            used[a] = true;
            used[b] = true;
            let size = sizes[a] + sizes[b];
            if step.size != size {
                return Err(Error::invalid(
                    "merge history",
                    format!("step {} claims size {}, inputs hold {}", i, step.size, size),
                ));
            }
            sizes.push(size);
        }
        Ok(Self { n_items, steps })
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn steps(&self) -> &[MergeStep] {
        &self.steps
    }

    /// Labels for `k` clusters, numbered by first appearance.
    pub fn cut_to_k(&self, k: usize) -> Vec<usize> {
        let n = self.n_items;
        if k >= n {
            return (0..n).collect();
        }

        let mut parent: Vec<usize> = (0..n).collect();
        // representative item of every cluster id seen so far
        let mut rep: Vec<usize> = (0..n).collect();

        for step in self.steps.iter().take(n - k.max(1)) {
            let ra = find(&mut parent, rep[step.cluster_a]);
            let rb = find(&mut parent, rep[step.cluster_b]);
            parent[rb] = ra;
            rep.push(ra);
        }

        let mut label_of_root = vec![usize::MAX; n];
        let mut next = 0;
        (0..n)
            .map(|i| {
                let root = find(&mut parent, i);
                if label_of_root[root] == usize::MAX {
                    label_of_root[root] = next;
                    next += 1;
                }
                label_of_root[root]
            })
            .collect()
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Agglomerative partitioner over a precomputed distance matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Agglomerative {
    pub linkage: Linkage,
}

impl Agglomerative {
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }
}

impl Partitioner<DistanceMatrix> for Agglomerative {
    fn partition(&self, data: &DistanceMatrix, k: usize) -> Result<Vec<usize>> {
        if k == 0 {
            return Err(Error::invalid("k", "must be at least 1"));
        }
        Ok(MergeHistory::from_distances(data, self.linkage).cut_to_k(k))
    }
}

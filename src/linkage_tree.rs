//! Cluster tree with one node per merge of an agglomerative merge history.
//!
//! The walk starts at the final merge and resolves each of its two inputs:
//! an original item becomes a leaf, an earlier merge is resolved first.
//! Merge histories can chain up to `n - 1` levels deep, so the walk keeps
//! its own work stack instead of recursing. Mean images are memoised per
//! cluster index in a [`CentroidCache`] so a node's preview is derived from
//! its inputs instead of re-averaging every item below it.

use crate::agglomerative::MergeHistory;
use crate::dataset::ImageStack;
use crate::error::{Error, Result};
use crate::ids::IdAllocator;
use crate::node::ClusterNode;
use crate::preview::PreviewSink;
use log::{debug, info};
use ndarray::Array1;
use std::collections::HashMap;

/// Mean image and item count per resolved cluster index.
#[derive(Debug, Clone, Default)]
pub struct CentroidCache {
    entries: HashMap<usize, (Array1<f32>, usize)>,
}

impl CentroidCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cluster: usize) -> Option<&(Array1<f32>, usize)> {
        self.entries.get(&cluster)
    }

    pub fn insert(&mut self, cluster: usize, mean: Array1<f32>, count: usize) {
        self.entries.insert(cluster, (mean, count));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Walk<'a> {
    history: &'a MergeHistory,
    images: &'a ImageStack,
    names: &'a [String],
    ids: &'a dyn IdAllocator,
    previews: &'a dyn PreviewSink,
}

/// Builds the merge-per-node tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkageTreeBuilder;

impl LinkageTreeBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        history: &MergeHistory,
        images: &ImageStack,
        names: &[String],
        ids: &dyn IdAllocator,
        previews: &dyn PreviewSink,
    ) -> Result<ClusterNode> {
        let mut cache = CentroidCache::new();
        self.build_with_cache(history, images, names, ids, previews, &mut cache)
    }

    /// Like [`build`](Self::build), but memoising into a caller-owned cache.
    /// Entries already present are reused rather than recomputed.
    pub fn build_with_cache(
        &self,
        history: &MergeHistory,
        images: &ImageStack,
        names: &[String],
        ids: &dyn IdAllocator,
        previews: &dyn PreviewSink,
        cache: &mut CentroidCache,
    ) -> Result<ClusterNode> {
        let n = history.n_items();
        if names.len() != n {
            return Err(Error::InputMismatch {
                what: "names",
                expected: n,
                found: names.len(),
            });
        }
        if images.len() != n {
            return Err(Error::InputMismatch {
                what: "images",
                expected: n,
                found: images.len(),
            });
        }
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        let walk = Walk {
            history,
            images,
            names,
            ids,
            previews,
        };

        let root = if n == 1 {
            let id = ids.next_id();
            let preview = previews.write(id, &images.row(0), images)?;
            ClusterNode::new(Some(format!("cluster {}", id)), Some(preview), Some(1))
                .with_children(vec![ClusterNode::leaf_for(&names[0])])
        } else {
            walk.merge(n - 2, cache)?
        };
        info!("built linkage tree over {} items", n);
        Ok(root)
    }
}

enum Task {
    /// Allocate the node's id, then schedule its inputs.
    Enter(usize),
    /// Both inputs are resolved; assemble the node.
    Finish { step_index: usize, id: u64 },
}

impl Walk<'_> {
    /// Resolve merge `root_step` and everything below it, post-order.
    fn merge(&self, root_step: usize, cache: &mut CentroidCache) -> Result<ClusterNode> {
        let n = self.history.n_items();
        let mut built: HashMap<usize, ClusterNode> = HashMap::new();
        let mut tasks = vec![Task::Enter(root_step)];

        while let Some(task) = tasks.pop() {
            match task {
                Task::Enter(step_index) => {
                    let step = self.history.steps()[step_index];
                    let id = self.ids.next_id();
                    tasks.push(Task::Finish { step_index, id });
                    // popped in order: input a first, then input b
                    for input in [step.cluster_b, step.cluster_a] {
                        if input >= n {
                            tasks.push(Task::Enter(input - n));
                        }
                    }
                }
                Task::Finish { step_index, id } => {
                    let node = self.finish(step_index, id, &mut built, cache)?;
                    built.insert(n + step_index, node);
                }
            }
        }

        built
            .remove(&(n + root_step))
            .ok_or_else(|| Error::invalid("merge history", "root merge was never built"))
    }

    fn finish(
        &self,
        step_index: usize,
        id: u64,
        built: &mut HashMap<usize, ClusterNode>,
        cache: &mut CentroidCache,
    ) -> Result<ClusterNode> {
        let n = self.history.n_items();
        let step = self.history.steps()[step_index];
        let mut node = ClusterNode::new(Some(format!("cluster {}", id)), None, None);

        for input in [step.cluster_a, step.cluster_b] {
            let child = if input < n {
                if cache.get(input).is_none() {
                    cache.insert(input, self.images.row(input), 1);
                }
                ClusterNode::leaf_for(&self.names[input])
            } else {
                built.remove(&input).ok_or_else(|| {
                    Error::invalid("merge history", format!("cluster {} was never built", input))
                })?
            };
            node.push_child(child);
        }

        let cluster = n + step_index;
        if cache.get(cluster).is_none() {
            let (mean, count) = self.combine(step.cluster_a, step.cluster_b, cache)?;
            cache.insert(cluster, mean, count);
        }
        let (mean, count) = match cache.get(cluster) {
            Some((mean, count)) => (mean, *count),
            None => return Err(Error::invalid("centroid cache", "missing merged entry")),
        };

        node.size = Some(count);
        node.preview = Some(self.previews.write(id, mean, self.images)?);
        debug!(
            "cluster {}: merged {} and {} at {:.4} ({} items)",
            id, step.cluster_a, step.cluster_b, step.distance, count
        );
        Ok(node)
    }

    /// Size-weighted mean of two resolved clusters.
    fn combine(&self, a: usize, b: usize, cache: &CentroidCache) -> Result<(Array1<f32>, usize)> {
        let missing = |c: usize| Error::invalid("centroid cache", format!("cluster {} was never resolved", c));
        let (mean_a, count_a) = cache.get(a).ok_or_else(|| missing(a))?;
        let (mean_b, count_b) = cache.get(b).ok_or_else(|| missing(b))?;
        let count = count_a + count_b;
        let mean = (mean_a * *count_a as f32 + mean_b * *count_b as f32) / count as f32;
        Ok((mean, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agglomerative::{Linkage, MergeStep};
    use crate::distance::{DistanceMatrix, Metric};
    use crate::ids::SequentialIds;
    use crate::preview::MemoryPreviews;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use std::collections::HashSet;

    fn stack(values: &[f32]) -> ImageStack {
        let pixels = Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap();
        ImageStack::new(pixels, 1, 1, 1).unwrap()
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("img/{}.png", i)).collect()
    }

    #[test]
    fn test_two_items_single_merge() {
        let history = MergeHistory::from_steps(
            2,
            vec![MergeStep { cluster_a: 0, cluster_b: 1, distance: 1.0, size: 2 }],
        )
        .unwrap();
        let previews = MemoryPreviews::default();
        let tree = LinkageTreeBuilder::new()
            .build(&history, &stack(&[10.0, 20.0]), &names(2), &SequentialIds::new(), &previews)
            .unwrap();
        assert_eq!(tree.size, Some(2));
        assert_eq!(tree.children().len(), 2);
        assert_eq!(tree.children()[1].name.as_deref(), Some("1.png"));
        let mean = previews.mean_for(tree.preview.as_deref().unwrap()).unwrap();
        assert_abs_diff_eq!(mean[0], 15.0);
    }

    #[test]
    fn test_mixed_inputs_use_their_own_item() {
        // ((0, 1), 2): the second input of the root is the raw item 2
        let history = MergeHistory::from_steps(
            3,
            vec![
                MergeStep { cluster_a: 0, cluster_b: 1, distance: 1.0, size: 2 },
                MergeStep { cluster_a: 3, cluster_b: 2, distance: 5.0, size: 3 },
            ],
        )
        .unwrap();
        let previews = MemoryPreviews::default();
        let mut cache = CentroidCache::new();
        let tree = LinkageTreeBuilder::new()
            .build_with_cache(
                &history,
                &stack(&[0.0, 3.0, 30.0]),
                &names(3),
                &SequentialIds::new(),
                &previews,
                &mut cache,
            )
            .unwrap();

        assert_eq!(tree.size, Some(3));
        assert!(tree.sizes_consistent());
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.children()[1].preview.as_deref(), Some("img/2.png"));

        let root_mean = previews.mean_for(tree.preview.as_deref().unwrap()).unwrap();
        assert_abs_diff_eq!(root_mean[0], 11.0);
        // three items plus two merges
        assert_eq!(cache.len(), 5);
        assert_abs_diff_eq!(cache.get(3).unwrap().0[0], 1.5);
    }

    #[test]
    fn test_tree_from_distances() {
        let features = array![[0.0f32], [1.0], [10.0], [11.0], [30.0], [31.5]];
        let dist = DistanceMatrix::from_features(&features, Metric::Euclidean).unwrap();
        let history = MergeHistory::from_distances(&dist, Linkage::Average);
        let images = ImageStack::new(features.clone(), 1, 1, 1).unwrap();
        let previews = MemoryPreviews::default();
        let tree = LinkageTreeBuilder::new()
            .build(&history, &images, &names(6), &SequentialIds::new(), &previews)
            .unwrap();

        assert_eq!(tree.size, Some(6));
        assert_eq!(tree.leaf_count(), 6);
        assert!(tree.sizes_consistent());
        // one preview per merge, all distinct
        let paths: HashSet<String> = previews.paths().into_iter().collect();
        assert_eq!(paths.len(), 5);
        let mean = previews.mean_for(tree.preview.as_deref().unwrap()).unwrap();
        assert_abs_diff_eq!(mean[0], 83.5 / 6.0, epsilon = 1e-4);
    }

    #[test]
    fn test_deep_single_linkage_chain() {
        // (((0, 1), 2), 3) ... as single linkage produces on evenly spaced items
        let n = 20_000;
        let mut steps = vec![MergeStep { cluster_a: 0, cluster_b: 1, distance: 1.0, size: 2 }];
        for i in 1..n - 1 {
            steps.push(MergeStep {
                cluster_a: n + i - 1,
                cluster_b: i + 1,
                distance: 1.0,
                size: i + 2,
            });
        }
        let history = MergeHistory::from_steps(n, steps).unwrap();
        let values: Vec<f32> = (0..n).map(|i| (i % 7) as f32).collect();
        let ids = SequentialIds::new();
        let tree = LinkageTreeBuilder::new()
            .build(&history, &stack(&values), &names(n), &ids, &MemoryPreviews::default())
            .unwrap();

        assert_eq!(tree.size, Some(n));
        assert_eq!(tree.leaf_count(), n);
        assert!(tree.sizes_consistent());
        assert_eq!(ids.issued(), (n - 1) as u64);
        assert_eq!(tree.name.as_deref(), Some("cluster 0"));
        assert_eq!(tree.leaves()[0].name.as_deref(), Some("0.png"));
    }

    #[test]
    fn test_ids_follow_preorder() {
        // ((0, 1), (2, 3)): root, then left merge, then right merge
        let history = MergeHistory::from_steps(
            4,
            vec![
                MergeStep { cluster_a: 0, cluster_b: 1, distance: 1.0, size: 2 },
                MergeStep { cluster_a: 2, cluster_b: 3, distance: 1.0, size: 2 },
                MergeStep { cluster_a: 4, cluster_b: 5, distance: 3.0, size: 4 },
            ],
        )
        .unwrap();
        let tree = LinkageTreeBuilder::new()
            .build(&history, &stack(&[0.0, 1.0, 2.0, 3.0]), &names(4), &SequentialIds::new(), &MemoryPreviews::default())
            .unwrap();
        assert_eq!(tree.name.as_deref(), Some("cluster 0"));
        assert_eq!(tree.children()[0].name.as_deref(), Some("cluster 1"));
        assert_eq!(tree.children()[1].name.as_deref(), Some("cluster 2"));
    }

    #[test]
    fn test_single_item() {
        let history = MergeHistory::from_steps(1, Vec::new()).unwrap();
        let tree = LinkageTreeBuilder::new()
            .build(&history, &stack(&[4.0]), &names(1), &SequentialIds::new(), &MemoryPreviews::default())
            .unwrap();
        assert_eq!(tree.size, Some(1));
        assert_eq!(tree.children().len(), 1);
    }

    #[test]
    fn test_mismatched_names() {
        let history = MergeHistory::from_steps(1, Vec::new()).unwrap();
        let err = LinkageTreeBuilder::new()
            .build(&history, &stack(&[4.0]), &names(2), &SequentialIds::new(), &MemoryPreviews::default())
            .unwrap_err();
        assert!(matches!(err, Error::InputMismatch { what: "names", .. }));
    }
}

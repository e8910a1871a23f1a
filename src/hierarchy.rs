//! Recursive k-way splitting of a collection into a cluster tree.

use crate::dataset::{Items, Representation};
use crate::error::{Error, Result};
use crate::ids::IdAllocator;
use crate::node::ClusterNode;
use crate::partition::{group_by_label, Partitioner};
use crate::preview::PreviewSink;
use log::{debug, info, warn};
use rayon::prelude::*;

/// Branching factor and stopping rules for the recursive split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitParams {
    /// Partitions requested per split.
    pub k: usize,
    /// Nodes with fewer items than this are not split further.
    pub split_threshold: usize,
    /// Levels of splitting still allowed below the root.
    pub max_depth: usize,
    /// Build sibling subtrees on the rayon pool.
    pub parallel: bool,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            k: 7,
            split_threshold: 10,
            max_depth: 10,
            parallel: false,
        }
    }
}

impl SplitParams {
    pub fn new(k: usize, split_threshold: usize, max_depth: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::invalid("k", "must be at least 1"));
        }
        if split_threshold == 0 {
            return Err(Error::invalid("split_threshold", "must be at least 1"));
        }
        Ok(Self {
            k,
            split_threshold,
            max_depth,
            parallel: false,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Everything a recursive call needs besides its own subset.
struct BuildContext<'a, R, P: ?Sized> {
    items: &'a Items<R>,
    partitioner: &'a P,
    ids: &'a dyn IdAllocator,
    previews: &'a dyn PreviewSink,
}

/// Builds a cluster tree by calling a partitioner once per internal node.
#[derive(Debug, Clone, Default)]
pub struct HierarchicalClusterer {
    params: SplitParams,
}

impl HierarchicalClusterer {
    pub fn new(params: SplitParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SplitParams {
        &self.params
    }

    /// Build the tree over all items.
    ///
    /// Every node gets a fresh id from `ids`, is named `cluster <id>` and is
    /// previewed by the mean image of its items, written through `previews`.
    pub fn build<R, P>(
        &self,
        items: &Items<R>,
        partitioner: &P,
        ids: &dyn IdAllocator,
        previews: &dyn PreviewSink,
    ) -> Result<ClusterNode>
    where
        R: Representation + Sync,
        P: Partitioner<R> + Sync + ?Sized,
    {
        if self.params.k == 0 || self.params.split_threshold == 0 {
            return Err(Error::invalid("split params", "k and split_threshold must be positive"));
        }
        if items.is_empty() {
            return Err(Error::EmptyInput);
        }
        let ctx = BuildContext {
            items,
            partitioner,
            ids,
            previews,
        };
        let indices: Vec<usize> = (0..items.len()).collect();
        let root = self.build_node(&ctx, &items.representation, &indices, self.params.max_depth)?;
        info!(
            "built cluster tree over {} items ({} top-level clusters)",
            items.len(),
            root.children().len()
        );
        Ok(root)
    }

    fn build_node<R, P>(
        &self,
        ctx: &BuildContext<'_, R, P>,
        representation: &R,
        indices: &[usize],
        depth_left: usize,
    ) -> Result<ClusterNode>
    where
        R: Representation + Sync,
        P: Partitioner<R> + Sync + ?Sized,
    {
        let n = indices.len();
        let id = ctx.ids.next_id();
        let images = &ctx.items.images;
        let preview = ctx.previews.write(id, &images.mean_of(indices), images)?;
        let mut node = ClusterNode::new(Some(format!("cluster {}", id)), Some(preview), Some(n));

        if n < self.params.split_threshold || depth_left == 0 {
            debug!("cluster {}: {} items become leaves (depth left {})", id, n, depth_left);
            node.set_children(
                indices
                    .iter()
                    .map(|&i| ClusterNode::leaf_for(&ctx.items.names[i]))
                    .collect(),
            );
            return Ok(node);
        }

        let k = self.params.k;
        let labels = ctx.partitioner.partition(representation, k)?;
        let groups: Vec<Vec<usize>> = group_by_label(&labels, n, k)?
            .into_iter()
            .filter(|g| !g.is_empty())
            .collect();

        if groups.len() < k.min(n) {
            warn!(
                "cluster {}: asked for {} partitions of {} items, got {}",
                id,
                k,
                n,
                groups.len()
            );
        } else {
            debug!("cluster {}: split {} items into {} partitions", id, n, groups.len());
        }

        let build_child = |group: &Vec<usize>| {
            let sub = representation.select(group);
            let sub_indices: Vec<usize> = group.iter().map(|&pos| indices[pos]).collect();
            self.build_node(ctx, &sub, &sub_indices, depth_left - 1)
        };

        let children = if self.params.parallel {
            groups.par_iter().map(build_child).collect::<Result<Vec<_>>>()?
        } else {
            groups.iter().map(build_child).collect::<Result<Vec<_>>>()?
        };

        node.set_children(children);
        Ok(node)
    }
}

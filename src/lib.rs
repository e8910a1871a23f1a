//! Hierarchical clustering of image collections.
//!
//! A collection of items (feature vectors or a pairwise distance matrix,
//! raw pixels and names) is split recursively into a tree of
//! [`ClusterNode`]s. Each internal node is previewed by the mean image of
//! the items below it; the finished tree serialises to nested JSON.

pub mod agglomerative;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod hierarchy;
pub mod ids;
pub mod kmeans;
pub mod linkage_tree;
pub mod node;
pub mod partition;
pub mod preview;

pub use agglomerative::{Agglomerative, Linkage, MergeHistory, MergeStep};
pub use dataset::{FeatureTable, ImageStack, Items, Representation};
pub use distance::{DistanceMatrix, Metric};
pub use error::{Error, Result};
pub use hierarchy::{HierarchicalClusterer, SplitParams};
pub use ids::{IdAllocator, SequentialIds};
pub use kmeans::KMeans;
pub use linkage_tree::{CentroidCache, LinkageTreeBuilder};
pub use node::{Branch, ClusterNode};
pub use partition::Partitioner;
pub use preview::{DirectoryPreviews, MemoryPreviews, PreviewConfig, PreviewSink};

//main.rs
use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use image_cluster_tree::{
    Agglomerative, DirectoryPreviews, DistanceMatrix, FeatureTable, HierarchicalClusterer,
    ImageStack, Items, KMeans, Linkage, LinkageTreeBuilder, MergeHistory, Metric, PreviewConfig,
    SequentialIds, SplitParams,
};
use log::info;
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Method {
    /// Recursive k-means over feature vectors
    Kmeans,
    /// Recursive agglomerative clustering over pairwise distances
    Agglomerative,
    /// One node per merge of the full merge history
    Linkage,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricArg {
    Euclidean,
    Hamming,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LinkageArg {
    Single,
    Complete,
    Average,
    Ward,
}

#[derive(Parser)]
#[clap(version = "0.3.0", author = "Stefan L. <stefan.lang@med.lu.se>")]
struct Opts {
    /// TSV of precomputed features; first column is the image path
    #[clap(short, long)]
    features: Option<PathBuf>,

    /// Image files to cluster on raw pixels (ignored with --features)
    #[clap(short, long, num_args = 1..)]
    images: Vec<PathBuf>,

    #[clap(short, long, value_enum, default_value = "kmeans")]
    method: Method,

    #[clap(long, value_enum, default_value = "euclidean")]
    metric: MetricArg,

    #[clap(long, value_enum, default_value = "average")]
    linkage: LinkageArg,

    #[clap(short, long, default_value_t = 7)]
    k: usize,

    #[clap(long, default_value_t = 10)]
    split_threshold: usize,

    #[clap(long, default_value_t = 10)]
    max_depth: usize,

    /// Images are resized to width x height before clustering
    #[clap(long, default_value_t = 64)]
    width: u32,

    #[clap(long, default_value_t = 64)]
    height: u32,

    #[clap(long, default_value = "centroids")]
    preview_dir: PathBuf,

    #[clap(long, default_value = "mean-")]
    preview_prefix: String,

    #[clap(long, default_value = "png")]
    preview_ext: String,

    #[clap(short, long)]
    outfile: PathBuf,

    #[clap(long, default_value_t = 0)]
    seed: u64,

    #[clap(long, default_value_t = 50)]
    max_iter: usize,

    /// Build sibling clusters in parallel
    #[clap(long)]
    parallel: bool,
}

// Serialising a chain-shaped linkage tree recurses once per level.
const WORKER_STACK: usize = 512 * 1024 * 1024;

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", "info"));
    let opts = Opts::parse();

    std::thread::Builder::new()
        .name("cluster_tree".to_string())
        .stack_size(WORKER_STACK)
        .spawn(move || run(opts))?
        .join()
        .map_err(|_| anyhow::anyhow!("clustering thread panicked"))?
}

fn run(opts: Opts) -> anyhow::Result<()> {

    let (names, features) = match &opts.features {
        Some(path) => {
            let table = FeatureTable::from_tsv(path)
                .with_context(|| format!("Failed to read features from {:?}", path))?;
            (table.names, Some(table.data))
        }
        None => (
            opts.images
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            None,
        ),
    };
    if names.is_empty() {
        bail!("no images given: pass --features or --images");
    }

    let images = ImageStack::load(&names, opts.width, opts.height)
        .context("Failed to load images")?;
    info!(
        "Loaded {} images at {}x{}",
        images.len(),
        images.width,
        images.height
    );
    let features = features.unwrap_or_else(|| images.pixels.clone());

    let metric = match opts.metric {
        MetricArg::Euclidean => Metric::Euclidean,
        MetricArg::Hamming => Metric::Hamming,
    };
    let linkage = match opts.linkage {
        LinkageArg::Single => Linkage::Single,
        LinkageArg::Complete => Linkage::Complete,
        LinkageArg::Average => Linkage::Average,
        LinkageArg::Ward => Linkage::Ward,
    };

    let previews = DirectoryPreviews::new(PreviewConfig {
        dir: opts.preview_dir.clone(),
        prefix: opts.preview_prefix.clone(),
        extension: opts.preview_ext.clone(),
    })
    .with_context(|| format!("Failed to create {:?}", opts.preview_dir))?;
    let ids = SequentialIds::new();

    let tree = match opts.method {
        Method::Kmeans => {
            let params = SplitParams::new(opts.k, opts.split_threshold, opts.max_depth)?
                .with_parallel(opts.parallel);
            let items = Items::new(features, images, names)?;
            HierarchicalClusterer::new(params).build(
                &items,
                &KMeans::new(opts.max_iter, opts.seed),
                &ids,
                &previews,
            )?
        }
        Method::Agglomerative => {
            let params = SplitParams::new(opts.k, opts.split_threshold, opts.max_depth)?
                .with_parallel(opts.parallel);
            let distances = DistanceMatrix::from_features(&features, metric)?;
            let items = Items::new(distances, images, names)?;
            HierarchicalClusterer::new(params).build(
                &items,
                &Agglomerative::new(linkage),
                &ids,
                &previews,
            )?
        }
        Method::Linkage => {
            let distances = DistanceMatrix::from_features(&features, metric)?;
            let history = MergeHistory::from_distances(&distances, linkage);
            LinkageTreeBuilder::new().build(&history, &images, &names, &ids, &previews)?
        }
    };

    tree.write_atomic(&opts.outfile)
        .with_context(|| format!("Failed to write {:?}", opts.outfile))?;
    info!(
        "Clustered {} items, wrote {} previews",
        tree.leaf_count(),
        ids.issued()
    );

    Ok(())
}

//! Centroid preview artefacts: one image per internal node.

use crate::dataset::ImageStack;
use crate::error::{Error, Result};
use image::ColorType;
use ndarray::Array1;
use std::path::PathBuf;
use std::sync::Mutex;

/// Where and how preview files are named: `<dir>/<prefix><id>.<extension>`.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub extension: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("centroids"),
            prefix: "mean-".to_string(),
            extension: "png".to_string(),
        }
    }
}

impl PreviewConfig {
    pub fn path_for(&self, id: u64) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.prefix, id, self.extension))
    }
}

/// Persists the mean image of a node and returns the path to record in the tree.
pub trait PreviewSink: Sync {
    fn write(&self, id: u64, mean: &Array1<f32>, images: &ImageStack) -> Result<String>;
}

/// Writes previews as image files into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryPreviews {
    config: PreviewConfig,
}

impl DirectoryPreviews {
    pub fn new(config: PreviewConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }
}

fn color_type(channels: u8) -> Result<ColorType> {
    match channels {
        1 => Ok(ColorType::L8),
        2 => Ok(ColorType::La8),
        3 => Ok(ColorType::Rgb8),
        4 => Ok(ColorType::Rgba8),
        other => Err(Error::invalid(
            "channels",
            format!("cannot write an image with {} channels", other),
        )),
    }
}

fn to_bytes(mean: &Array1<f32>) -> Vec<u8> {
    mean.iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect()
}

impl PreviewSink for DirectoryPreviews {
    fn write(&self, id: u64, mean: &Array1<f32>, images: &ImageStack) -> Result<String> {
        let path = self.config.path_for(id);
        let color = color_type(images.channels)?;
        image::save_buffer(&path, &to_bytes(mean), images.width, images.height, color)?;
        log::trace!("wrote preview {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Records preview paths without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryPreviews {
    config: PreviewConfig,
    written: Mutex<Vec<(String, Array1<f32>)>>,
}

impl MemoryPreviews {
    pub fn new(config: PreviewConfig) -> Self {
        Self {
            config,
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    /// The mean image recorded for `path`, if any.
    pub fn mean_for(&self, path: &str) -> Option<Array1<f32>> {
        self.lock()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, m)| m.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Array1<f32>)>> {
        // a poisoned lock still holds a consistent list
        self.written.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PreviewSink for MemoryPreviews {
    fn write(&self, id: u64, mean: &Array1<f32>, _images: &ImageStack) -> Result<String> {
        let path = self.config.path_for(id).to_string_lossy().into_owned();
        self.lock().push((path.clone(), mean.clone()));
        Ok(path)
    }
}

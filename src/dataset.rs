use crate::error::{Error, Result};
use csv::ReaderBuilder;
use image::imageops::FilterType;
use ndarray::{Array1, Array2, Axis};
use std::fs::File;
use std::path::Path;

/// Anything a partitioner can split: it knows how many items it covers and
/// how to restrict itself to a subset of them.
pub trait Representation: Sized {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restrict to the given items, in the given order.
    fn select(&self, indices: &[usize]) -> Self;
}

/// A feature matrix with one row per item.
impl Representation for Array2<f32> {
    fn len(&self) -> usize {
        self.nrows()
    }

    fn select(&self, indices: &[usize]) -> Self {
        ndarray::ArrayBase::select(self, Axis(0), indices)
    }
}

/// Raw pixels of every item, one flattened (height, width, channel) row per item.
#[derive(Debug, Clone)]
pub struct ImageStack {
    pub pixels: Array2<f32>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl ImageStack {
    pub fn new(pixels: Array2<f32>, width: u32, height: u32, channels: u8) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if pixels.ncols() != expected {
            return Err(Error::ImageShape {
                path: "<stack>".to_string(),
                expected: format!("{}x{}x{}", width, height, channels),
                found: format!("{} values per row", pixels.ncols()),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            channels,
        })
    }

    /// Decode every file, convert to RGB and resize to a common size.
    pub fn load<P: AsRef<Path>>(paths: &[P], width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("width/height", "image size must be positive"));
        }
        let row_len = width as usize * height as usize * 3;
        let mut flat: Vec<f32> = Vec::with_capacity(paths.len() * row_len);
        for path in paths {
            let rgb = image::open(path.as_ref())?
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8();
            flat.extend(rgb.into_raw().into_iter().map(f32::from));
        }
        let pixels = Array2::from_shape_vec((paths.len(), row_len), flat)?;
        Self::new(pixels, width, height, 3)
    }

    pub fn len(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elementwise mean over the given items.
    pub fn mean_of(&self, indices: &[usize]) -> Array1<f32> {
        if indices.is_empty() {
            return Array1::zeros(self.pixels.ncols());
        }
        let mut sum = Array1::<f32>::zeros(self.pixels.ncols());
        for &i in indices {
            sum += &self.pixels.row(i);
        }
        sum / indices.len() as f32
    }

    pub fn row(&self, index: usize) -> Array1<f32> {
        self.pixels.row(index).to_owned()
    }
}

/// The parallel arrays fed into one clustering run. Index `i` refers to the
/// same logical item in the representation, the image stack and the names.
#[derive(Debug, Clone)]
pub struct Items<R> {
    pub representation: R,
    pub images: ImageStack,
    pub names: Vec<String>,
}

impl<R: Representation> Items<R> {
    pub fn new(representation: R, images: ImageStack, names: Vec<String>) -> Result<Self> {
        let n = names.len();
        if representation.len() != n {
            return Err(Error::InputMismatch {
                what: "representation",
                expected: n,
                found: representation.len(),
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
        Ok(Self {
            representation,
            images,
            names,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Precomputed feature vectors keyed by item path, read from a TSV file.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub data: Array2<f32>,
    pub names: Vec<String>,
    pub headers: Option<Vec<String>>,
}

impl FeatureTable {
    /// Read a TSV file whose first column is the item path and whose
    /// remaining columns are numeric features.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;

        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(file);

        let headers = rdr
            .headers()
            .ok()
            .map(|h| h.iter().skip(1).map(|s| s.to_string()).collect::<Vec<_>>());

        let mut names = Vec::new();
        let mut flat: Vec<f32> = Vec::new();
        let mut ncols = 0;

        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            let mut fields = record.iter();
            let name = fields.next().unwrap_or_default().to_string();
            let before = flat.len();
            for (j, value) in fields.enumerate() {
                let x = value
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .ok_or_else(|| Error::FeatureValue {
                        row: i + 1,
                        column: j + 2,
                        value: value.to_string(),
                    })?;
                flat.push(x);
            }
            ncols = flat.len() - before;
            names.push(name);
        }

        if names.is_empty() {
            return Err(Error::EmptyInput);
        }

        let data = Array2::from_shape_vec((names.len(), ncols), flat)?;
        Ok(Self {
            data,
            names,
            headers,
        })
    }
}

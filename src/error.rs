use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while preparing items, clustering them or writing the tree.
#[derive(Debug, Error)]
pub enum Error {
    /// Parallel arrays describing the same items disagree in length.
    #[error("input mismatch: {what} has {found} entries, expected {expected}")]
    InputMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A build was requested over zero items.
    #[error("empty input provided")]
    EmptyInput,

    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// A partitioner returned a label outside `0..k`.
    #[error("partition label {label} is out of range for k = {k}")]
    LabelOutOfRange { label: usize, k: usize },

    /// A partitioner returned the wrong number of labels.
    #[error("partitioner returned {found} labels for {expected} items")]
    LabelCount { expected: usize, found: usize },

    #[error("image '{path}' has shape {found}, expected {expected}")]
    ImageShape {
        path: String,
        expected: String,
        found: String,
    },

    #[error("malformed feature table at row {row}, column {column}: '{value}'")]
    FeatureValue {
        row: usize,
        column: usize,
        value: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

//! Custom error types for onnx-classify.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the onnx-classify library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load or decode an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to download a model or label file.
    #[error("failed to download {name}: {source}")]
    ModelDownload {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// Failed to create cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A label file is not valid JSON for any accepted layout.
    #[error("failed to parse label file {path}: {source}")]
    LabelParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A label index map has non-numeric keys or gaps.
    #[error("invalid label file {path}: {reason}")]
    LabelLayout { path: PathBuf, reason: String },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A bitmap, tensor or logit buffer does not have the expected shape.
    #[error("invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },

    /// An input that must hold at least one element was empty.
    #[error("empty input: {what}")]
    EmptyInput { what: String },

    /// A non-finite value reached a numeric transform.
    #[error("non-finite value {value} at index {index}")]
    NumericInstability { index: usize, value: f32 },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for onnx-classify operations.
pub type Result<T> = std::result::Result<T, Error>;

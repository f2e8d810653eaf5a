//! Error type shared by the document layer, the passes and the pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glTF container: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("invalid glTF JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Accessor or buffer view points outside the binary data, or uses a
    /// layout this crate does not read.
    #[error("accessor {index}: {reason}")]
    Accessor { index: usize, reason: String },

    #[error("buffer view {index} lies outside the binary data")]
    BufferView { index: usize },

    #[error("image {index}: {source}")]
    Image {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("image {index}: resize failed: {reason}")]
    Resize { index: usize, reason: String },

    #[error("image {index}: ktx2 encoding failed: {reason}")]
    Ktx2 { index: usize, reason: String },

    #[error("mesh simplifier: {0}")]
    Simplifier(String),

    #[error("config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The converted file was written but could not be moved to its final
    /// name; `written` still holds the complete output.
    #[error("could not rename {written} to {target}: {source}")]
    Finalize {
        written: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn accessor(index: usize, reason: impl Into<String>) -> Self {
        Error::Accessor {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

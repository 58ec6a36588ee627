// ============================================================================
// ERROR TAXONOMY: user-visible failures of import, bake, export and project IO
// ============================================================================
//
// Only decode failures and cancelled exports reach the user. Geometry
// fallbacks are logged, superseded bakes are dropped, and history underflow is
// a `false` return: none of those have a variant here.
// ============================================================================

use std::path::PathBuf;

/// The source raster of a panel could not be decoded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("could not decode '{filename}': {reason}")]
pub struct DecodeError {
    pub filename: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            reason: reason.into(),
        }
    }
}

/// Upload boundary failures.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("'{filename}' is not a supported image: {reason}")]
    Unsupported { filename: String, reason: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// High-resolution export failures.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// `forced` is set when the worker did not acknowledge in time and was detached.
    #[error("export cancelled (forced: {forced})")]
    Cancelled { forced: bool },
    #[error("format '{0}' cannot be encoded without an export backend")]
    Unsupported(String),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ExportError {
    fn from(e: image::ImageError) -> Self {
        ExportError::Encode(e.to_string())
    }
}

impl From<tiff::TiffError> for ExportError {
    fn from(e: tiff::TiffError) -> Self {
        ExportError::Encode(format!("TIFF encode error: {}", e))
    }
}

impl From<png::EncodingError> for ExportError {
    fn from(e: png::EncodingError) -> Self {
        ExportError::Encode(format!("PNG encode error: {}", e))
    }
}

/// Project file (save / load) failures.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed project file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported project version {found} (newest known is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("project contains no figures")]
    EmptyProject,
}

/// Journal rule / settings configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed journal rules: {0}")]
    Json(#[from] serde_json::Error),
    #[error("journal rules must define a 'Default' entry")]
    MissingDefault,
}

//! Error types for classic asset ingestion.

use thiserror::Error;

/// Result type alias using ImportError.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Main error type for ingestion operations.
///
/// Malformed asset data is not an error: truncated reads, unsupported texture
/// encodings and failed patches are logged and ingestion carries on with
/// best-effort output. These variants cover the conditions that do escalate.
#[derive(Error, Debug)]
pub enum ImportError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A format struct could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] binrw::Error),

    /// Failed to encode or decode an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to parse a JSON configuration file.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Asset not found in any configured source.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// A BIG archive is structurally broken.
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// The configuration cannot be used.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to format export text.
    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),

    /// Failed to export a model.
    #[error("Export error: {0}")]
    Export(String),
}

//! Error types for tellus_io operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Persistence layer errors
    #[error("Store error: {0}")]
    Store(String),

    /// Cache loader errors (propagated to the caller)
    #[error("Loader error: {0}")]
    Loader(String),

    /// File system errors
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Save data from a newer program version
    #[error("Save version {found} is newer than supported version {supported}")]
    Version { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    #[must_use]
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    #[must_use]
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    #[must_use]
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    #[must_use]
    pub fn loader<S: Into<String>>(msg: S) -> Self {
        Self::Loader(msg.into())
    }

    #[must_use]
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound(resource.into())
    }
}

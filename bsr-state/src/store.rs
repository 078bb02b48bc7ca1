//! Generation store trait and error types

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when interacting with a generation store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend type is not supported
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// Configuration error
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// The bucket/container does not exist and may not be created
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Failed to create bucket
    #[error("Failed to create bucket: {0}")]
    BucketCreationFailed(String),

    /// A pinned version was requested but the key has never been written
    #[error("Nothing has been stored at {key} yet (requested version {version})")]
    NothingStored { key: String, version: String },

    /// A pinned version no longer exists at the key
    #[error("Version {version} of {key} not found")]
    VersionNotFound { key: String, version: String },

    /// There is no state file to upload
    #[error("No state file found at {0}")]
    MissingStateFile(String),

    /// Network or I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Google Cloud Storage error
    #[error("GCS error: {0}")]
    Gcs(String),
}

impl StoreError {
    /// Create an unsupported backend error
    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A remote object store that keeps every write to a key as a new immutable generation
///
/// Writes are append-only: `write_generation` never replaces or removes an
/// existing generation, so concurrent writers each get their own generation.
/// `mark_removed` hides the key from unpinned reads without deleting any
/// generation; pinned reads of earlier generations keep working.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Human readable location of the store (e.g., "s3://bucket")
    fn describe(&self) -> String;

    /// List the generation identifiers of `key`, oldest first
    ///
    /// Returns an empty list if the key has never been written
    async fn list_generations(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Read the contents of one generation
    ///
    /// Returns `None` if that generation does not exist
    async fn read_generation(&self, key: &str, generation: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `contents` as a new generation of `key` and return its identifier
    async fn write_generation(&self, key: &str, contents: Vec<u8>) -> StoreResult<String>;

    /// The generation an unpinned read of `key` should return
    ///
    /// Returns `None` if the key has never been written or its newest entry
    /// is a removal marker
    async fn latest_generation(&self, key: &str) -> StoreResult<Option<String>>;

    /// Record that the object at `key` is gone
    ///
    /// A later `write_generation` makes the key present again.
    async fn mark_removed(&self, key: &str) -> StoreResult<()>;
}

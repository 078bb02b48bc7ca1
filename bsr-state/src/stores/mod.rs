//! Store implementations for state generations

mod gcs;
mod local;
mod memory;
mod s3;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

use bsr_core::Source;

use crate::store::{GenerationStore, StoreError, StoreResult};

/// Create a store from a source
///
/// This function dispatches to the appropriate store implementation
/// based on the source's backend (or the backend implied by its iaas).
pub async fn create_store(source: &Source) -> StoreResult<Box<dyn GenerationStore>> {
    match source.backend_name() {
        Some("s3") => {
            let store = S3Store::from_source(source).await?;
            Ok(Box::new(store))
        }
        Some("gcs") => {
            let store = GcsStore::from_source(source).await?;
            Ok(Box::new(store))
        }
        Some("local") => Ok(Box::new(LocalStore::from_source(source)?)),
        Some(other) => Err(StoreError::unsupported_backend(other)),
        None => Err(StoreError::configuration(format!(
            "no default storage backend for iaas '{}'",
            source.iaas
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_backend() {
        let source = Source::new("gcp", "bucket").with_backend("azure");

        let result = create_store(&source).await;
        if let Err(StoreError::UnsupportedBackend(name)) = result {
            assert_eq!(name, "azure");
        } else {
            panic!("Expected UnsupportedBackend error");
        }
    }

    #[tokio::test]
    async fn test_missing_backend_for_iaas() {
        let result = create_store(&Source::new("vsphere", "bucket")).await;
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let source = Source::new("gcp", dir.path().display().to_string()).with_backend("local");

        let store = create_store(&source).await.unwrap();
        assert_eq!(store.describe(), format!("file://{}", dir.path().display()));
    }

    #[tokio::test]
    async fn test_local_backend_defaults_root_to_name() {
        let mut source = Source::new("gcp", "ignored").with_backend("local");
        source.bucket = None;
        source.name = Some("env-root".to_string());

        let store = create_store(&source).await.unwrap();
        assert_eq!(store.describe(), "file://env-root");
    }
}

//! Storage client - maps the resource verbs onto a generation store

use std::path::Path;

use bsr_core::{STATE_FILE_NAME, Source, Version, object_key_for};
use log::{debug, info};

use crate::store::{GenerationStore, StoreError, StoreResult};
use crate::stores::create_store;

/// Reads and writes versions of one state file key
pub struct StorageClient {
    store: Box<dyn GenerationStore>,
    key: String,
    name: Option<String>,
}

impl StorageClient {
    /// Create a client for the key belonging to `name`
    pub fn new(store: Box<dyn GenerationStore>, name: Option<String>) -> Self {
        Self {
            key: object_key_for(name.as_deref()),
            store,
            name,
        }
    }

    /// Create a client for the store and key described by a source
    pub async fn from_source(source: &Source) -> StoreResult<Self> {
        let store = create_store(source).await?;
        Ok(Self::new(store, source.name.clone()))
    }

    /// Object key all operations of this client use
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Logical environment name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Every stored version of the key, oldest first
    pub async fn list_versions(&self) -> StoreResult<Vec<Version>> {
        let generations = self.store.list_generations(&self.key).await?;
        debug!(
            "Found {} version(s) of {} in {}",
            generations.len(),
            self.key,
            self.store.describe()
        );
        Ok(generations.into_iter().map(Version::new).collect())
    }

    /// Store `<directory>/bbl-state.json` as a new version
    pub async fn upload(&self, directory: &Path) -> StoreResult<Version> {
        let path = directory.join(STATE_FILE_NAME);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::MissingStateFile(path.display().to_string()));
            }
            Err(err) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    err
                )));
            }
        };

        let generation = self.store.write_generation(&self.key, contents).await?;
        info!(
            "Uploaded {} to {} as version {}",
            self.key,
            self.store.describe(),
            generation
        );
        Ok(Version::new(generation))
    }

    /// Write a stored version to `<directory>/bbl-state.json`
    ///
    /// Fetches `reference` when given, otherwise the latest version. Returns
    /// `None` if nothing was requested and nothing is present at the key,
    /// either because it was never written or because it was removed.
    pub async fn download(
        &self,
        directory: &Path,
        reference: Option<&str>,
    ) -> StoreResult<Option<Version>> {
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            StoreError::Io(format!("Failed to create {}: {}", directory.display(), e))
        })?;

        let (generation, contents) = match reference {
            Some(reference) => (reference.to_string(), self.read_pinned(reference).await?),
            None => {
                let Some(latest) = self.store.latest_generation(&self.key).await? else {
                    info!(
                        "Nothing present at {} in {}",
                        self.key,
                        self.store.describe()
                    );
                    return Ok(None);
                };
                // The latest generation can disappear between lookup and read
                let contents = self
                    .store
                    .read_generation(&self.key, &latest)
                    .await?
                    .ok_or_else(|| StoreError::VersionNotFound {
                        key: self.key.clone(),
                        version: latest.clone(),
                    })?;
                (latest, contents)
            }
        };

        let path = directory.join(STATE_FILE_NAME);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        info!(
            "Downloaded version {} of {} to {}",
            generation,
            self.key,
            path.display()
        );
        Ok(Some(Version::new(generation)))
    }

    /// Mark the key as removed so unpinned downloads find nothing
    ///
    /// Stored versions stay readable by ref. A key that was never written is
    /// left alone.
    pub async fn remove(&self) -> StoreResult<()> {
        if self.store.latest_generation(&self.key).await?.is_none() {
            debug!("Nothing present at {}, no removal marker needed", self.key);
            return Ok(());
        }
        self.store.mark_removed(&self.key).await?;
        info!(
            "Marked {} as removed in {}",
            self.key,
            self.store.describe()
        );
        Ok(())
    }

    async fn read_pinned(&self, reference: &str) -> StoreResult<Vec<u8>> {
        if let Some(contents) = self.store.read_generation(&self.key, reference).await? {
            return Ok(contents);
        }

        let error = if self.store.list_generations(&self.key).await?.is_empty() {
            StoreError::NothingStored {
                key: self.key.clone(),
                version: reference.to_string(),
            }
        } else {
            StoreError::VersionNotFound {
                key: self.key.clone(),
                version: reference.to_string(),
            }
        };
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use tempfile::tempdir;

    fn client(store: &MemoryStore, name: Option<&str>) -> StorageClient {
        StorageClient::new(Box::new(store.clone()), name.map(str::to_string))
    }

    fn write_state(dir: &Path, contents: &str) {
        std::fs::write(dir.join(STATE_FILE_NAME), contents).unwrap();
    }

    fn read_state(dir: &Path) -> String {
        std::fs::read_to_string(dir.join(STATE_FILE_NAME)).unwrap()
    }

    #[tokio::test]
    async fn test_list_versions_empty() {
        let store = MemoryStore::new();
        let versions = client(&store, None).list_versions().await.unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn test_uploads_listed_in_write_order() {
        let store = MemoryStore::new();
        let client = client(&store, Some("prod"));
        let dir = tempdir().unwrap();

        let mut uploaded = Vec::new();
        for i in 0..3 {
            write_state(dir.path(), &format!(r#"{{"a":{}}}"#, i));
            uploaded.push(client.upload(dir.path()).await.unwrap());
        }

        let listed = client.list_versions().await.unwrap();
        assert_eq!(listed, uploaded);

        let mut refs: Vec<_> = listed.iter().map(|v| v.reference.clone()).collect();
        refs.dedup();
        assert_eq!(refs.len(), 3);
    }

    #[tokio::test]
    async fn test_identical_uploads_get_distinct_versions() {
        let store = MemoryStore::new();
        let client = client(&store, None);
        let dir = tempdir().unwrap();
        write_state(dir.path(), r#"{"same":true}"#);

        let first = client.upload(dir.path()).await.unwrap();
        let second = client.upload(dir.path()).await.unwrap();
        assert!(!first.same_generation(&second));
        assert_eq!(client.list_versions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_download_round_trip() {
        let store = MemoryStore::new();
        let client = client(&store, None);
        let upload_dir = tempdir().unwrap();
        write_state(upload_dir.path(), r#"{"a":1}"#);
        let r1 = client.upload(upload_dir.path()).await.unwrap();
        write_state(upload_dir.path(), r#"{"a":2}"#);
        let r2 = client.upload(upload_dir.path()).await.unwrap();

        let target = tempdir().unwrap();
        let pinned = client
            .download(target.path(), Some(&r1.reference))
            .await
            .unwrap();
        assert_eq!(pinned, Some(r1));
        assert_eq!(read_state(target.path()), r#"{"a":1}"#);

        let latest = client.download(target.path(), None).await.unwrap();
        assert_eq!(latest, Some(r2));
        assert_eq!(read_state(target.path()), r#"{"a":2}"#);
    }

    #[tokio::test]
    async fn test_download_creates_missing_directory() {
        let store = MemoryStore::new();
        let client = client(&store, None);
        let dir = tempdir().unwrap();
        write_state(dir.path(), "{}");
        client.upload(dir.path()).await.unwrap();

        let target = dir.path().join("nested").join("target");
        client.download(&target, None).await.unwrap();
        assert_eq!(read_state(&target), "{}");
    }

    #[tokio::test]
    async fn test_download_nothing_stored() {
        let store = MemoryStore::new();
        let client = client(&store, None);
        let target = tempdir().unwrap();

        let version = client.download(target.path(), None).await.unwrap();
        assert!(version.is_none());
        assert!(!target.path().join(STATE_FILE_NAME).exists());

        let err = client
            .download(target.path(), Some("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NothingStored { .. }));
    }

    #[tokio::test]
    async fn test_download_deleted_version() {
        let store = MemoryStore::new();
        let client = client(&store, None);
        let dir = tempdir().unwrap();
        write_state(dir.path(), "{}");
        let first = client.upload(dir.path()).await.unwrap();
        client.upload(dir.path()).await.unwrap();
        store.delete_generation(client.key(), &first.reference);

        let err = client
            .download(dir.path(), Some(&first.reference))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound { ref version, .. } if *version == first.reference));
    }

    #[tokio::test]
    async fn test_download_after_remove_finds_nothing() {
        let store = MemoryStore::new();
        let client = client(&store, Some("prod"));
        let dir = tempdir().unwrap();
        write_state(dir.path(), r#"{"a":1}"#);
        let stored = client.upload(dir.path()).await.unwrap();

        client.remove().await.unwrap();

        let target = tempdir().unwrap();
        assert_eq!(client.download(target.path(), None).await.unwrap(), None);
        assert!(!target.path().join(STATE_FILE_NAME).exists());

        let pinned = client
            .download(target.path(), Some(&stored.reference))
            .await
            .unwrap();
        assert_eq!(pinned, Some(stored.clone()));
        assert_eq!(read_state(target.path()), r#"{"a":1}"#);
        assert_eq!(client.list_versions().await.unwrap(), vec![stored]);

        write_state(dir.path(), r#"{"a":2}"#);
        let again = client.upload(dir.path()).await.unwrap();
        assert_eq!(client.download(target.path(), None).await.unwrap(), Some(again));
    }

    #[tokio::test]
    async fn test_remove_never_written_key_is_a_no_op() {
        let store = MemoryStore::new();
        client(&store, None).remove().await.unwrap();
        assert!(store.is_empty());
        assert!(store.list_generations(STATE_FILE_NAME).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_state_file() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        let err = client(&store, None).upload(dir.path()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingStateFile(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_names_partition_versions() {
        let store = MemoryStore::new();
        let prod = client(&store, Some("prod"));
        let staging = client(&store, Some("staging"));
        let dir = tempdir().unwrap();
        write_state(dir.path(), r#"{"env":"prod"}"#);
        let version = prod.upload(dir.path()).await.unwrap();

        assert_eq!(prod.list_versions().await.unwrap(), vec![version.clone()]);
        assert!(staging.list_versions().await.unwrap().is_empty());

        let target = tempdir().unwrap();
        let err = staging
            .download(target.path(), Some(&version.reference))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NothingStored { .. }));
    }
}

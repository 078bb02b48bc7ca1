//! Local directory generation store
//!
//! Every generation of a key is a file under `<root>/<key>/` named by its
//! decimal generation number (`1`, `2`, ...). A removal marker takes a number
//! too and is stored as `<n>.removed`.
//!
//! Numbers are reserved by creating `<root>/<key>/.claims/<n>`, which fails
//! if another writer already holds it. Claims are never deleted, so a number
//! is never handed out twice even if its generation file disappears later.
//! New generations are staged in a hidden temp file and hard-linked into
//! place under the claimed number.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bsr_core::Source;
use log::debug;

use crate::store::{GenerationStore, StoreError, StoreResult};

const CLAIMS_DIR: &str = ".claims";
const REMOVED_SUFFIX: &str = ".removed";

/// One numbered entry in a key's directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Generation(u64),
    Removed(u64),
}

impl Entry {
    fn number(self) -> u64 {
        match self {
            Entry::Generation(n) | Entry::Removed(n) => n,
        }
    }

    fn parse(file_name: &str) -> Option<Self> {
        match file_name.strip_suffix(REMOVED_SUFFIX) {
            Some(number) => parse_number(number).map(Entry::Removed),
            None => parse_number(file_name).map(Entry::Generation),
        }
    }
}

/// Parse a canonical generation number ("7", not "07" or "+7")
fn parse_number(text: &str) -> Option<u64> {
    text.parse::<u64>()
        .ok()
        .filter(|number| number.to_string() == text)
}

/// Generation store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a LocalStore from a source (the bucket is the root directory)
    pub fn from_source(source: &Source) -> StoreResult<Self> {
        source
            .bucket_name()
            .map(Self::new)
            .ok_or_else(|| StoreError::configuration("local backend requires source.bucket"))
    }

    fn generations_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// File names in `dir`, empty if it does not exist
    async fn file_names(dir: &Path) -> StoreResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    dir.display(),
                    err
                )));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Generations and removal markers of a key, ascending by number
    async fn entries(&self, key: &str) -> StoreResult<Vec<Entry>> {
        let mut entries: Vec<Entry> = Self::file_names(&self.generations_dir(key))
            .await?
            .iter()
            .filter_map(|name| Entry::parse(name))
            .collect();
        entries.sort_unstable_by_key(|entry| entry.number());
        Ok(entries)
    }

    /// Reserve the next unused number for `key`
    async fn claim_next_number(&self, key: &str) -> StoreResult<u64> {
        let dir = self.generations_dir(key);
        let claims = dir.join(CLAIMS_DIR);
        tokio::fs::create_dir_all(&claims)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create {}: {}", claims.display(), e)))?;

        let claimed = Self::file_names(&claims)
            .await?
            .iter()
            .filter_map(|name| parse_number(name))
            .max();
        let present = self.entries(key).await?.iter().map(|e| e.number()).max();
        let mut next = claimed.max(present).unwrap_or(0) + 1;

        loop {
            let claim = claims.join(next.to_string());
            let result = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&claim)
                .await;
            match result {
                Ok(_) => return Ok(next),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!("Number {} of {} already claimed", next, key);
                    next += 1;
                }
                Err(err) => {
                    return Err(StoreError::Io(format!(
                        "Failed to create {}: {}",
                        claim.display(),
                        err
                    )));
                }
            }
        }
    }

    /// Hard-link `staged` under a freshly claimed number
    async fn link_claimed(
        &self,
        key: &str,
        staged: &Path,
        file_name: impl Fn(u64) -> String,
    ) -> StoreResult<u64> {
        let dir = self.generations_dir(key);
        loop {
            let number = self.claim_next_number(key).await?;
            let target = dir.join(file_name(number));
            match tokio::fs::hard_link(staged, &target).await {
                Ok(()) => return Ok(number),
                // Written by something that does not claim numbers
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(StoreError::Io(format!(
                        "Failed to create {}: {}",
                        target.display(),
                        err
                    )));
                }
            }
        }
    }

    /// Stage `contents` in the key's directory and link it under a new number
    async fn append(
        &self,
        key: &str,
        contents: Vec<u8>,
        file_name: impl Fn(u64) -> String,
    ) -> StoreResult<u64> {
        let dir = self.generations_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;

        let staged = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&staged, contents)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", staged.display(), e)))?;

        let result = self.link_claimed(key, &staged, file_name).await;
        let _ = tokio::fs::remove_file(&staged).await;
        result
    }
}

#[async_trait]
impl GenerationStore for LocalStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn list_generations(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries(key)
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Generation(n) => Some(n.to_string()),
                Entry::Removed(_) => None,
            })
            .collect())
    }

    async fn read_generation(&self, key: &str, generation: &str) -> StoreResult<Option<Vec<u8>>> {
        if parse_number(generation).is_none() {
            return Ok(None);
        }

        let path = self.generations_dir(key).join(generation);
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                err
            ))),
        }
    }

    async fn write_generation(&self, key: &str, contents: Vec<u8>) -> StoreResult<String> {
        let number = self.append(key, contents, |n| n.to_string()).await?;
        Ok(number.to_string())
    }

    async fn latest_generation(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(match self.entries(key).await?.last() {
            Some(Entry::Generation(n)) => Some(n.to_string()),
            Some(Entry::Removed(_)) | None => None,
        })
    }

    async fn mark_removed(&self, key: &str) -> StoreResult<()> {
        self.append(key, Vec::new(), |n| format!("{}{}", n, REMOVED_SUFFIX))
            .await?;
        Ok(())
    }
}

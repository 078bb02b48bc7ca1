//! In-memory generation store
//!
//! Keeps every generation in process memory. Clones share the same contents,
//! which lets tests hand one clone to a `StorageClient` and inspect the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::store::{GenerationStore, StoreResult};

/// One entry in the history of a key
#[derive(Debug)]
enum Entry {
    Generation { id: String, contents: Vec<u8> },
    /// Tombstone written by `mark_removed`
    Removed,
}

#[derive(Debug, Default)]
struct Objects {
    /// History per key, oldest first
    entries: HashMap<String, Vec<Entry>>,
    /// Last issued generation number (shared by all keys)
    counter: u64,
}

/// Generation store backed by a shared in-memory map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<Objects>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove one generation, as an external actor with bucket access could
    pub fn delete_generation(&self, key: &str, generation: &str) {
        if let Some(entries) = self.lock().entries.get_mut(key) {
            entries.retain(|entry| !matches!(entry, Entry::Generation { id, .. } if id == generation));
        }
    }

    /// Returns true if no generation of any key is stored
    pub fn is_empty(&self) -> bool {
        self.lock()
            .entries
            .values()
            .flatten()
            .all(|entry| matches!(entry, Entry::Removed))
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn list_generations(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()
            .entries
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| match entry {
                        Entry::Generation { id, .. } => Some(id.clone()),
                        Entry::Removed => None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_generation(&self, key: &str, generation: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.lock().entries.get(key).and_then(|entries| {
            entries.iter().find_map(|entry| match entry {
                Entry::Generation { id, contents } if id == generation => Some(contents.clone()),
                _ => None,
            })
        }))
    }

    async fn write_generation(&self, key: &str, contents: Vec<u8>) -> StoreResult<String> {
        let mut objects = self.lock();
        objects.counter += 1;
        let id = format!("{:016x}", objects.counter);
        objects
            .entries
            .entry(key.to_string())
            .or_default()
            .push(Entry::Generation {
                id: id.clone(),
                contents,
            });
        Ok(id)
    }

    async fn latest_generation(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .lock()
            .entries
            .get(key)
            .and_then(|entries| entries.last())
            .and_then(|entry| match entry {
                Entry::Generation { id, .. } => Some(id.clone()),
                Entry::Removed => None,
            }))
    }

    async fn mark_removed(&self, key: &str) -> StoreResult<()> {
        self.lock()
            .entries
            .entry(key.to_string())
            .or_default()
            .push(Entry::Removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_write_and_read() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        let g1 = store.write_generation("k", b"one".to_vec()).await.unwrap();
        let g2 = store.write_generation("k", b"two".to_vec()).await.unwrap();
        assert_ne!(g1, g2);

        assert_eq!(store.list_generations("k").await.unwrap(), vec![g1.clone(), g2.clone()]);
        assert_eq!(store.latest_generation("k").await.unwrap(), Some(g2));
        assert_eq!(
            store.read_generation("k", &g1).await.unwrap(),
            Some(b"one".to_vec())
        );
        assert_eq!(store.read_generation("k", "missing").await.unwrap(), None);
        assert_eq!(store.read_generation("other", &g1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        let generation = clone.write_generation("k", b"x".to_vec()).await.unwrap();

        assert!(!store.is_empty());
        store.delete_generation("k", &generation);
        assert!(clone.list_generations("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_removal_marker_hides_latest_only() {
        let store = MemoryStore::new();
        let g1 = store.write_generation("k", b"one".to_vec()).await.unwrap();
        store.mark_removed("k").await.unwrap();

        assert_eq!(store.latest_generation("k").await.unwrap(), None);
        assert_eq!(store.list_generations("k").await.unwrap(), vec![g1.clone()]);
        assert_eq!(
            store.read_generation("k", &g1).await.unwrap(),
            Some(b"one".to_vec())
        );

        let g2 = store.write_generation("k", b"two".to_vec()).await.unwrap();
        assert_eq!(store.latest_generation("k").await.unwrap(), Some(g2));
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_writes_all_survive() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..16u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.write_generation("k", vec![i]).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let generations = store.list_generations("k").await.unwrap();
        assert_eq!(generations.len(), 16);
    }
}

//! bbl state storage
//!
//! This crate stores the provisioning tool's state file in a
//! generation-versioned object store. Every upload lands as a new immutable
//! generation of one object key, so concurrent pipeline runs can never lose
//! each other's writes.
//!
//! # Overview
//!
//! - **GenerationStore**: the capability a store backend provides (list, read
//!   and append generations of a key, and mark a key as removed)
//! - **StorageClient**: the `list_versions` / `upload` / `download` / `remove`
//!   operations the resource verbs need, on top of any store
//! - **Stores**: `S3Store` (versioned S3 bucket), `GcsStore` (versioned GCS
//!   bucket), `LocalStore` (directory of numbered files) and `MemoryStore`
//!   (in-process, for tests)
//!
//! # Example
//!
//! ```ignore
//! use bsr_core::Source;
//! use bsr_state::StorageClient;
//!
//! let source = Source::new("aws", "my-state-bucket").with_name(Some("prod".to_string()));
//! let client = StorageClient::from_source(&source).await?;
//!
//! let version = client.upload(Path::new("workdir")).await?;
//! client.download(Path::new("elsewhere"), Some(&version.reference)).await?;
//! ```

pub mod client;
pub mod store;
pub mod stores;

// Re-export main types for convenience
pub use client::StorageClient;
pub use store::{GenerationStore, StoreError, StoreResult};
pub use stores::{GcsStore, LocalStore, MemoryStore, S3Store, create_store};

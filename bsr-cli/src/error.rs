//! Errors of the resource verbs

use bsr_core::RequestError;
use bsr_state::StoreError;
use thiserror::Error;

use crate::provisioner::ProvisionError;

/// Every way a `check`, `in` or `out` invocation can fail
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Standard input could not be read
    #[error("Cannot read configuration: {0}")]
    ReadRequest(#[source] std::io::Error),

    /// The request is malformed or invalid
    #[error("Invalid parameters: {0}")]
    Request(#[from] RequestError),

    /// The store could not be reached or did not have what was asked for
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The provisioning command failed and left no state behind
    #[error("Provisioning command '{command}' failed: {source}")]
    Provisioning {
        command: String,
        #[source]
        source: ProvisionError,
    },

    /// The provisioning command failed; its partial state was uploaded first
    #[error("Provisioning command '{command}' failed, partial state uploaded as version {reference}: {source}")]
    ProvisioningPreserved {
        command: String,
        reference: String,
        #[source]
        source: ProvisionError,
    },

    /// A command other than a teardown left no state file
    #[error("Provisioning command '{command}' succeeded but left no state file in {directory}")]
    MissingState { command: String, directory: String },

    /// Local file system error outside the store
    #[error("I/O error: {0}")]
    Io(String),

    /// The response could not be written to standard output
    #[error("Failed to write response: {0}")]
    Output(String),
}

/// Result type for resource verbs
pub type ResourceResult<T> = Result<T, ResourceError>;

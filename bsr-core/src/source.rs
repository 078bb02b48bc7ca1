//! Source - Where the state blob lives and how to reach it

use serde::{Deserialize, Serialize};

use crate::request::RequestError;

/// File name of the provisioning tool's state inside a working directory
pub const STATE_FILE_NAME: &str = "bbl-state.json";

/// Directory inside an `out` working directory that holds the state file
pub const STATE_DIR_NAME: &str = "bbl-state";

/// Region used when the source does not name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// The `source` object of a resource request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Source {
    /// IaaS targeted by the provisioning tool (e.g., "aws", "gcp")
    pub iaas: String,
    /// Store family ("s3", "gcs", "local"); derived from `iaas` when omitted
    pub backend: Option<String>,
    /// Bucket name, or root directory for the local backend; defaults to `name`
    pub bucket: Option<String>,
    /// Logical environment name partitioning the key namespace
    pub name: Option<String>,
    pub region: Option<String>,
    /// GCP region for the bucket and the provisioning tool
    pub gcp_region: Option<String>,
    /// GCP service account key (JSON document)
    pub gcp_service_account_key: Option<String>,
    /// Custom S3-compatible endpoint
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Create the bucket (versioned) before the first write if it is missing
    #[serde(default = "default_true")]
    pub auto_create: bool,
    /// Request server-side encryption on writes
    #[serde(default = "default_true")]
    pub encrypt: bool,
}

fn default_true() -> bool {
    true
}

impl Source {
    /// Minimal source for the given iaas and bucket
    pub fn new(iaas: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            iaas: iaas.into(),
            backend: None,
            bucket: Some(bucket.into()),
            name: None,
            region: None,
            gcp_region: None,
            gcp_service_account_key: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            auto_create: true,
            encrypt: true,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Replace the logical name, keeping the current one when `name` is None
    pub fn with_name(mut self, name: Option<String>) -> Self {
        if name.is_some() {
            self.name = name;
        }
        self
    }

    /// Store family to use, either explicit or implied by the iaas
    pub fn backend_name(&self) -> Option<&str> {
        match (&self.backend, self.iaas.as_str()) {
            (Some(backend), _) => Some(backend.as_str()),
            (None, "aws") => Some("s3"),
            (None, "gcp") => Some("gcs"),
            (None, _) => None,
        }
    }

    /// Bucket to store into, falling back to the logical name
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket
            .as_deref()
            .or(self.name.as_deref())
            .filter(|bucket| !bucket.trim().is_empty())
    }

    pub fn region_or_default(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// The single object key every verb uses for this source
    pub fn object_key(&self) -> String {
        object_key_for(self.name.as_deref())
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.iaas.trim().is_empty() {
            return Err(RequestError::invalid("source.iaas must not be empty"));
        }
        if self.bucket_name().is_none() {
            return Err(RequestError::invalid(
                "source.bucket must be set when source.name is not",
            ));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(RequestError::invalid(
                "source.access-key-id and source.secret-access-key must be set together",
            ));
        }
        if self.backend_name().is_none() {
            return Err(RequestError::invalid(format!(
                "no default storage backend for iaas '{}', set source.backend",
                self.iaas
            )));
        }
        Ok(())
    }
}

/// Object key for a logical name
///
/// e.g., Some("prod") -> "prod/bbl-state.json", None -> "bbl-state.json"
pub fn object_key_for(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{}/{}", name, STATE_FILE_NAME),
        None => STATE_FILE_NAME.to_string(),
    }
}

/// Names become a key path segment, so they must stay a single segment
pub fn validate_name(name: &str) -> Result<(), RequestError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(RequestError::invalid(format!(
            "name '{}' must be a single non-empty path segment",
            name
        )));
    }
    Ok(())
}

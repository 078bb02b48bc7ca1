//! Request and response envelopes exchanged with the pipeline engine

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::{Source, validate_name};
use crate::version::Version;

/// Commands after which the provisioning tool is expected to have removed its state
pub const TEARDOWN_COMMANDS: &[&str] = &["down", "destroy"];

/// Errors raised while decoding or validating a request
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request is not valid JSON or does not match the expected shape
    #[error("Malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The request is well-formed but a value is not acceptable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl RequestError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// A request read from standard input
pub trait Request: DeserializeOwned {
    fn validate(&self) -> Result<(), RequestError>;

    /// Decode and validate a raw request
    fn from_slice(raw: &[u8]) -> Result<Self, RequestError> {
        let request: Self = serde_json::from_slice(raw)?;
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckRequest {
    pub source: Source,
    #[serde(default)]
    pub version: Option<Version>,
}

impl Request for CheckRequest {
    fn validate(&self) -> Result<(), RequestError> {
        self.source.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InRequest {
    pub source: Source,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub params: Option<InParams>,
}

/// `in` takes no parameters; any key is rejected
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InParams {}

impl Request for InRequest {
    fn validate(&self) -> Result<(), RequestError> {
        self.source.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutRequest {
    pub source: Source,
    pub params: OutParams,
}

impl OutRequest {
    /// Source with the logical name overridden by `params.name`
    pub fn effective_source(&self) -> Source {
        self.source.clone().with_name(self.params.name.clone())
    }
}

impl Request for OutRequest {
    fn validate(&self) -> Result<(), RequestError> {
        self.source.validate()?;
        self.params.validate()
    }
}

/// Parameters of an `out` step
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutParams {
    /// Provisioning command to run (e.g., "up", "down")
    pub command: String,
    /// Logical environment name, overriding `source.name`
    #[serde(default)]
    pub name: Option<String>,
    /// Extra arguments appended to the provisioning command
    #[serde(default)]
    pub args: Vec<String>,
}

impl OutParams {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            name: None,
            args: Vec::new(),
        }
    }

    /// Returns true if the command tears the environment down
    pub fn is_teardown(&self) -> bool {
        TEARDOWN_COMMANDS.contains(&self.command.as_str())
    }

    fn validate(&self) -> Result<(), RequestError> {
        if self.command.trim().is_empty() {
            return Err(RequestError::invalid("params.command must not be empty"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        Ok(())
    }
}

/// Response of `in` and `out`
///
/// `version` is null when there is nothing to report (nothing stored yet,
/// or a teardown of an environment that never published state).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionResponse {
    pub version: Option<Version>,
}

impl VersionResponse {
    pub fn new(version: Version) -> Self {
        Self {
            version: Some(version),
        }
    }

    pub fn empty() -> Self {
        Self { version: None }
    }
}

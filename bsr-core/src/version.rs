//! Version - One immutable generation of the stored state blob

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for one stored generation of the state file
///
/// `reference` is assigned by the store and is the only field that identifies
/// the generation. `name` and `updated` are informational decorations added by
/// `out`; they never take part in ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Logical environment name the version was published for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Store-assigned generation identifier
    #[serde(rename = "ref")]
    pub reference: String,
    /// When `out` published this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Version {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            name: None,
            reference: reference.into(),
            updated: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }

    /// Returns true if both versions point at the same stored generation
    pub fn same_generation(&self, other: &Version) -> bool {
        self.reference == other.reference
    }
}

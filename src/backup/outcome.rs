//! Result of a backup invocation.

use serde::{Deserialize, Serialize};

/// Locations of the stored backups.
///
/// One database yields a single location; several yield the list in
/// database order. Serializes as a JSON string or array respectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackupOutcome {
    Single(String),
    Multiple(Vec<String>),
}

impl BackupOutcome {
    /// Build the outcome from locations in database order.
    pub fn from_locations(mut locations: Vec<String>) -> Self {
        if locations.len() == 1 {
            if let Some(location) = locations.pop() {
                return Self::Single(location);
            }
        }
        Self::Multiple(locations)
    }

    /// All locations in database order.
    pub fn locations(&self) -> Vec<&str> {
        match self {
            Self::Single(location) => vec![location.as_str()],
            Self::Multiple(locations) => locations.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(locations) => locations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! # Error Types
//!
//! Error taxonomy for a backup run using `thiserror`. Every variant knows the
//! pipeline [`Stage`] it came from, and per-database failures carry the
//! database name so a caller can report exactly what broke.

use std::fmt;

use crate::credentials::CredentialError;
use crate::dump::DumpError;
use crate::encryption::InvalidKeyError;
use crate::storage::StorageError;

/// Custom result type for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Decorate,
    ResolveNames,
    Dump,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Configure => write!(f, "configure"),
            Stage::Decorate => write!(f, "decorate"),
            Stage::ResolveNames => write!(f, "resolve_names"),
            Stage::Dump => write!(f, "dump"),
            Stage::Upload => write!(f, "upload"),
        }
    }
}

/// Main error type for a backup invocation
#[derive(thiserror::Error, Debug)]
pub enum BackupError {
    /// Missing or invalid settings, detected before any work starts
    #[error("Configuration error: {message}")]
    Configuration { message: String, field: Option<String> },

    /// An encryption key was supplied but cannot be used
    #[error("Invalid encryption key: {0}")]
    EncryptionKey(#[from] InvalidKeyError),

    /// Credential resolution failed (token or secret store)
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The database field resolved to zero names
    #[error("PGDATABASE does not contain a database name (got {raw:?})")]
    DatabaseName { raw: String },

    /// The dump producer failed for a specific database
    #[error("Dump of database '{database}' failed: {source}")]
    Process {
        database: String,
        #[source]
        source: DumpError,
    },

    /// The storage sink failed for a specific database
    #[error("Upload of '{key}' for database '{database}' failed: {source}")]
    Upload {
        database: String,
        key: String,
        #[source]
        source: StorageError,
    },
}

impl BackupError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into(), field: None }
    }

    /// Create a configuration error naming the offending setting
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration { message: message.into(), field: Some(field.into()) }
    }

    /// Create an empty database list error
    pub fn database_name<S: Into<String>>(raw: S) -> Self {
        Self::DatabaseName { raw: raw.into() }
    }

    /// Create a dump failure for a database
    pub fn process<D: Into<String>>(database: D, source: DumpError) -> Self {
        Self::Process { database: database.into(), source }
    }

    /// Create an upload failure for a database and key
    pub fn upload<D: Into<String>, K: Into<String>>(
        database: D,
        key: K,
        source: StorageError,
    ) -> Self {
        Self::Upload { database: database.into(), key: key.into(), source }
    }

    /// Stage of the pipeline this error was raised in
    pub fn stage(&self) -> Stage {
        match self {
            BackupError::Configuration { .. } | BackupError::EncryptionKey(_) => Stage::Configure,
            BackupError::Credential(_) => Stage::Decorate,
            BackupError::DatabaseName { .. } => Stage::ResolveNames,
            BackupError::Process { .. } => Stage::Dump,
            BackupError::Upload { .. } => Stage::Upload,
        }
    }

    /// Database the failure belongs to, for per-database stages
    pub fn database(&self) -> Option<&str> {
        match self {
            BackupError::Process { database, .. } | BackupError::Upload { database, .. } => {
                Some(database)
            }
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for BackupError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::configuration(format!("Validation failed: {}", message))
    }
}

//! # dumpstream
//!
//! Streaming PostgreSQL backups to S3. Each database is dumped with
//! `pg_dump`, optionally encrypted with AES-256-CBC, and uploaded with a
//! multipart upload while the dump is still running, so no backup is ever
//! buffered on local disk.
//!
//! ## Architecture
//!
//! ```text
//! event + environment → BackupConfig → credential decorator → database names
//!                                                                  ↓
//!                      for each database: pg_dump → [AES-256-CBC] → S3
//! ```
//!
//! The external systems sit behind async traits ([`DumpProducer`],
//! [`ObjectStore`], [`SecretsClient`], [`TokenIssuer`]) so the pipeline runs
//! against AWS or against in-memory fakes.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dumpstream::{BackupOrchestrator, EnvSnapshot, EventPayload, MemoryObjectStore, PgDumpProducer};
//!
//! # async fn run() -> dumpstream::Result<()> {
//! let orchestrator = BackupOrchestrator::new(
//!     Arc::new(PgDumpProducer::new()),
//!     Arc::new(MemoryObjectStore::new()),
//! );
//! let event = EventPayload::from_json(r#"{"PGDATABASE": "orders", "S3_BUCKET": "backups"}"#)?;
//! let outcome = orchestrator.handle(event, &EnvSnapshot::capture()).await?;
//! println!("{}", serde_json::to_string(&outcome).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod backup;
#[cfg(feature = "aws")]
pub mod cli;
pub mod config;
pub mod credentials;
pub mod dump;
pub mod encryption;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod storage;

// Re-export commonly used types and traits
pub use backup::{BackupKey, BackupOrchestrator, BackupOutcome, Clock, FixedClock, SystemClock};
pub use config::{AuthStrategy, BackupConfig, EnvSnapshot, EventPayload, ObservabilityConfig};
pub use credentials::{CredentialDecoration, CredentialDecorator, CredentialError, TokenIssuer};
pub use dump::{ConnectionParams, DumpError, DumpProducer, PgDumpProducer};
pub use errors::{BackupError, Result, Stage};
pub use secrets::{SecretString, SecretsClient};
pub use storage::{
    ByteSource, DiscardObjectStore, MemoryObjectStore, ObjectStore, PutOptions, StorageError,
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "dumpstream");
    }
}

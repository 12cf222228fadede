//! # Error Handling
//!
//! Error types for the backup pipeline. Module-level failures (secrets,
//! tokens, dump process, storage) have their own `thiserror` enums and are
//! wrapped into [`BackupError`] at the orchestrator boundary.

pub mod types;

pub use types::{BackupError, Result, Stage};

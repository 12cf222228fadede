//! # Backup Pipeline
//!
//! Orchestration of a backup invocation and the pieces it is built from:
//! database name resolution, object key generation and the result type.

pub mod key;
pub mod names;
pub mod orchestrator;
pub mod outcome;

pub use key::{BackupKey, Clock, FixedClock, SystemClock};
pub use names::resolve_database_names;
pub use orchestrator::BackupOrchestrator;
pub use outcome::BackupOutcome;

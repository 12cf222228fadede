//! # Dump Producer
//!
//! Produces the logical dump of one database as a byte stream.
//! [`PgDumpProducer`] runs `pg_dump` in custom format and streams its stdout;
//! the child's exit status is checked when the stream reaches its end, so a
//! dump that dies midway surfaces as a read error on the stream rather than
//! as a truncated but "successful" backup.

pub mod pg_dump;

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::BackupConfig;
use crate::secrets::SecretString;
use crate::storage::ByteSource;

pub use pg_dump::PgDumpProducer;

/// Connection settings for a single dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub database: String,
    pub connect_timeout: Duration,
    /// Directory containing the pg_dump binary
    pub pgdump_path: PathBuf,
    pub extra_args: Vec<String>,
}

impl From<&BackupConfig> for ConnectionParams {
    fn from(config: &BackupConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            connect_timeout: config.connect_timeout(),
            pgdump_path: config.pgdump_path.clone(),
            extra_args: config.pgdump_args.clone(),
        }
    }
}

/// Errors raised by a dump producer.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// The dump process could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process exited before producing any output
    #[error("pg_dump exited before producing output ({status}): {stderr}")]
    EarlyExit { status: String, stderr: String },

    /// The output does not start with the custom-format header
    #[error("unexpected pg_dump output, expected custom format header, got {found:?}")]
    UnexpectedOutput { found: String },

    /// The process exited with a failure status after streaming output
    #[error("pg_dump failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    /// Reading from the process failed
    #[error("error reading pg_dump output: {0}")]
    Io(#[source] io::Error),

    #[error("{0}")]
    Other(String),
}

impl DumpError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Recover a dump error carried inside an I/O error.
    ///
    /// Dump failures travel through the pipeline as `io::Error`s on the byte
    /// stream. Returns the original error back if it does not wrap one.
    pub fn from_io(err: io::Error) -> Result<DumpError, io::Error> {
        err.downcast::<DumpError>()
    }

    pub(crate) fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

/// Starts database dumps.
#[async_trait]
pub trait DumpProducer: Send + Sync {
    /// Start a dump and return its output stream.
    ///
    /// Failures detected after the stream is returned are reported as read
    /// errors wrapping a [`DumpError`]; see [`DumpError::from_io`].
    async fn start(&self, params: &ConnectionParams) -> Result<ByteSource, DumpError>;
}

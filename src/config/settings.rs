//! # Backup Settings
//!
//! The merged, validated configuration of one backup invocation.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use validator::Validate;

use super::event::{EnvSnapshot, EventPayload, PGDUMP_PATH_VAR};
use crate::encryption::EncryptionKey;
use crate::errors::{BackupError, Result};
use crate::secrets::SecretString;

/// Default storage region.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Default storage class for uploaded objects.
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Default multipart part size (1 GiB).
pub const DEFAULT_PART_SIZE: u64 = 1024 * 1024 * 1024;

/// Smallest part size S3 accepts for all but the last part (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part size S3 accepts (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default time allowed for pg_dump to connect, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 15;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Directory searched for `pg_dump` when nothing else is configured.
pub const DEFAULT_PGDUMP_DIR: &str = "/usr/bin";

/// How database credentials are obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Use the configured user and password as-is
    #[default]
    None,
    /// Replace the password with a short-lived RDS IAM token
    IamToken,
    /// Read username and password from a secret store
    SecretsManager { secret_id: String },
}

impl AuthStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::None => "none",
            AuthStrategy::IamToken => "iam_token",
            AuthStrategy::SecretsManager { .. } => "secrets_manager",
        }
    }
}

/// Configuration of a backup run
#[derive(Debug, Clone, Validate)]
pub struct BackupConfig {
    /// Database host (libpq default when unset)
    pub host: Option<String>,

    /// Database port
    #[validate(range(min = 1, message = "PGPORT must be between 1 and 65535"))]
    pub port: u16,

    /// Database user
    pub user: Option<String>,

    /// Database password or IAM token
    pub password: Option<SecretString>,

    /// One database name or a comma-separated list
    pub database: String,

    /// Destination bucket
    #[validate(length(min = 1, message = "S3_BUCKET cannot be empty"))]
    pub bucket: String,

    /// Destination region
    #[validate(length(min = 1, message = "S3_REGION cannot be empty"))]
    pub region: String,

    /// Optional key prefix, without leading or trailing slashes
    pub root: Option<String>,

    /// Storage class of uploaded objects
    #[validate(length(min = 1, message = "S3_STORAGE_CLASS cannot be empty"))]
    pub storage_class: String,

    /// Multipart part size in bytes
    #[validate(range(
        min = MIN_PART_SIZE,
        max = MAX_PART_SIZE,
        message = "S3_PART_SIZE must be between 5 MiB and 5 GiB"
    ))]
    pub part_size: u64,

    /// Encryption key; `None` disables encryption
    pub encryption_key: Option<EncryptionKey>,

    /// Credential strategy
    pub auth: AuthStrategy,

    /// Directory containing the pg_dump binary
    pub pgdump_path: PathBuf,

    /// Connection timeout passed to pg_dump
    #[validate(range(min = 1, max = 3600, message = "PGCONNECT_TIMEOUT must be between 1 and 3600 seconds"))]
    pub connect_timeout_seconds: u64,

    /// Extra pg_dump arguments
    pub pgdump_args: Vec<String>,
}

impl BackupConfig {
    /// Create a configuration with built-in defaults for everything except
    /// the database field and bucket.
    pub fn new(database: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            user: None,
            password: None,
            database: database.into(),
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            root: None,
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            part_size: DEFAULT_PART_SIZE,
            encryption_key: None,
            auth: AuthStrategy::None,
            pgdump_path: PathBuf::from(DEFAULT_PGDUMP_DIR),
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            pgdump_args: Vec::new(),
        }
    }

    /// Merge built-in defaults, the event payload and the environment.
    ///
    /// Non-empty environment values override the event for the variables in
    /// [`ENV_OVERRIDES`](super::event::ENV_OVERRIDES). `PGDUMP_PATH` is the
    /// exception: the event wins over the environment.
    ///
    /// # Errors
    ///
    /// - [`BackupError::Configuration`] when `PGDATABASE` or `S3_BUCKET` is
    ///   missing or a numeric setting is out of range
    /// - [`BackupError::EncryptionKey`] when `ENCRYPT_KEY` is set but invalid
    pub fn resolve(event: EventPayload, env: &EnvSnapshot) -> Result<Self> {
        let event = event.with_env_overrides(env)?;

        let database = event.database.ok_or_else(|| {
            BackupError::configuration_field("PGDATABASE not provided in the event data", "PGDATABASE")
        })?;

        let bucket = non_empty(event.bucket).ok_or_else(|| {
            BackupError::configuration_field("S3_BUCKET not provided in the event data", "S3_BUCKET")
        })?;

        let encryption_key = match event.encrypt_key {
            Some(key) if !key.is_empty() => Some(EncryptionKey::from_hex(key.expose_secret())?),
            _ => None,
        };

        let port = match event.port {
            Some(port) => u16::try_from(port).map_err(|_| {
                BackupError::configuration_field(
                    format!("PGPORT must be between 1 and 65535, got {}", port),
                    "PGPORT",
                )
            })?,
            None => DEFAULT_PORT,
        };

        let auth = auth_strategy(
            event.use_iam_auth.unwrap_or(false),
            non_empty(event.secrets_manager_secret_id),
        );

        let pgdump_path = non_empty(event.pgdump_path)
            .or_else(|| env.get(PGDUMP_PATH_VAR).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PGDUMP_DIR.to_string());

        let root = event
            .root
            .map(|root| root.trim_matches('/').to_string())
            .filter(|root| !root.is_empty());

        let config = Self {
            host: non_empty(event.host),
            port,
            user: non_empty(event.user),
            password: event.password,
            database,
            bucket,
            region: non_empty(event.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            root,
            storage_class: non_empty(event.storage_class)
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            part_size: event.part_size.unwrap_or(DEFAULT_PART_SIZE),
            encryption_key,
            auth,
            pgdump_path: PathBuf::from(pgdump_path),
            connect_timeout_seconds: event
                .connect_timeout
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            pgdump_args: event
                .pgdump_args
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(BackupError::from)
    }

    /// Copy of this configuration targeting a single database.
    pub fn for_database(&self, database: &str) -> Self {
        Self { database: database.to_string(), ..self.clone() }
    }

    /// Whether backups are encrypted
    pub fn encryption_enabled(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// Whether a password (or token) is set
    pub fn has_password(&self) -> bool {
        self.password.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Get the connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

fn auth_strategy(use_iam_auth: bool, secret_id: Option<String>) -> AuthStrategy {
    match (use_iam_auth, secret_id) {
        (true, Some(secret_id)) => {
            warn!(
                secret_id = %secret_id,
                "Both USE_IAM_AUTH and SECRETS_MANAGER_SECRET_ID are set; using IAM authentication"
            );
            AuthStrategy::IamToken
        }
        (true, None) => AuthStrategy::IamToken,
        (false, Some(secret_id)) => AuthStrategy::SecretsManager { secret_id },
        (false, None) => AuthStrategy::None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

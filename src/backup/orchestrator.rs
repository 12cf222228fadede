//! Backup orchestration.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{error, info, Instrument};

use super::key::{BackupKey, Clock, SystemClock};
use super::names::resolve_database_names;
use super::outcome::BackupOutcome;
use crate::backup_span;
use crate::config::{BackupConfig, EnvSnapshot, EventPayload};
use crate::credentials::{CredentialDecorator, TokenIssuer};
use crate::dump::{ConnectionParams, DumpError, DumpProducer};
use crate::encryption::{encrypt_stream, generate_iv};
use crate::errors::{BackupError, Result};
use crate::observability::log_config_info;
use crate::secrets::SecretsClient;
use crate::storage::{put_bytes, ByteSource, ObjectStore, PutOptions, StorageError};

/// Drives a backup invocation: configuration, credentials, name resolution
/// and one dump-encrypt-upload pipeline per database.
///
/// Databases are backed up one after another in list order. The first
/// failure stops the run; databases after it are not attempted, and objects
/// already stored are left in place.
pub struct BackupOrchestrator {
    dump: Arc<dyn DumpProducer>,
    store: Arc<dyn ObjectStore>,
    credentials: CredentialDecorator,
    clock: Arc<dyn Clock>,
}

impl BackupOrchestrator {
    pub fn new(dump: Arc<dyn DumpProducer>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            dump,
            store,
            credentials: CredentialDecorator::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_secrets_client(mut self, client: Arc<dyn SecretsClient>) -> Self {
        self.credentials = self.credentials.with_secrets_client(client);
        self
    }

    pub fn with_token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.credentials = self.credentials.with_token_issuer(issuer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle an invocation: merge `event` with `env` and run the backup.
    pub async fn handle(&self, event: EventPayload, env: &EnvSnapshot) -> Result<BackupOutcome> {
        let config = BackupConfig::resolve(event, env)?;
        log_config_info(&config);
        self.run(config).await
    }

    /// Run a backup for an already merged configuration.
    pub async fn run(&self, config: BackupConfig) -> Result<BackupOutcome> {
        let config = self.credentials.decorate(config).await?;
        let names = resolve_database_names(&config.database)?;
        info!(databases = ?names, "Starting backup run");

        let locations: Vec<String> = stream::iter(names)
            .then(|name| {
                let database_config = config.for_database(&name);
                async move { self.backup_database(database_config).await }
            })
            .try_collect()
            .await?;

        info!(count = locations.len(), "Backup run complete");
        Ok(BackupOutcome::from_locations(locations))
    }

    /// Back up the single database named in `config` and return its location.
    pub async fn backup_database(&self, config: BackupConfig) -> Result<String> {
        let key = BackupKey::generate(&config.database, config.root.as_deref(), self.clock.now());
        let span = backup_span!(config.database, key, encrypted = config.encryption_enabled());

        self.pipeline(&config, &key)
            .instrument(span.clone())
            .await
            .inspect_err(|e| {
                span.in_scope(|| error!(stage = %e.stage(), error = %e, "Backup failed"));
            })
    }

    async fn pipeline(&self, config: &BackupConfig, key: &BackupKey) -> Result<String> {
        let database = config.database.as_str();
        let options = PutOptions::from(config);
        info!("Backing up {} to {}", database, key);

        let dump = self
            .dump
            .start(&ConnectionParams::from(config))
            .await
            .map_err(|e| BackupError::process(database, e))?;

        let body: ByteSource = match &config.encryption_key {
            Some(encryption_key) => {
                let iv = generate_iv();
                let iv_key = key.iv_key();
                put_bytes(self.store.as_ref(), &iv_key, hex::encode(iv).into_bytes(), &options)
                    .await
                    .map_err(|e| BackupError::upload(database, iv_key.as_str(), e))?;
                info!(iv_key = %iv_key, "Stored encryption IV");
                Box::pin(encrypt_stream(dump, encryption_key, &iv))
            }
            None => dump,
        };

        let location = self
            .store
            .put(key.as_str(), body, &options)
            .await
            .map_err(|e| classify_upload_failure(database, key.as_str(), e))?;

        info!(location = %location, "Backup stored");
        Ok(location)
    }
}

/// Attribute a failed upload to the stage that caused it. A body read error
/// that carries a [`DumpError`] means the dump broke mid-stream.
fn classify_upload_failure(database: &str, key: &str, err: StorageError) -> BackupError {
    match err {
        StorageError::Body { key: body_key, source } => match DumpError::from_io(source) {
            Ok(dump) => BackupError::process(database, dump),
            Err(source) => BackupError::upload(database, key, StorageError::body(body_key, source)),
        },
        other => BackupError::upload(database, key, other),
    }
}

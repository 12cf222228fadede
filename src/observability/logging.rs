//! # Structured Logging
//!
//! Span macros and startup logging for backup runs.

/// Create a tracing span for one database backup.
///
/// Every span carries a fresh `run_id` so the log lines of a single
/// database backup can be grouped.
///
/// ```rust,ignore
/// let span = backup_span!("orders", key);
/// let span = backup_span!("orders", key, encrypted = true);
/// ```
#[macro_export]
macro_rules! backup_span {
    ($database:expr, $key:expr) => {
        tracing::info_span!(
            "backup",
            database = %$database,
            key = %$key,
            run_id = %uuid::Uuid::new_v4()
        )
    };
    ($database:expr, $key:expr, $($field:tt)*) => {
        tracing::info_span!(
            "backup",
            database = %$database,
            key = %$key,
            run_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log the effective configuration of an invocation.
///
/// Secrets are only reported as present or absent.
pub fn log_config_info(config: &crate::config::BackupConfig) {
    let secret_id = match &config.auth {
        crate::config::AuthStrategy::SecretsManager { secret_id } => Some(secret_id.as_str()),
        _ => None,
    };

    tracing::info!(
        database = %config.database,
        user = config.user.as_deref().unwrap_or_default(),
        password_present = config.has_password(),
        host = config.host.as_deref().unwrap_or_default(),
        bucket = %config.bucket,
        region = %config.region,
        root = config.root.as_deref().unwrap_or_default(),
        auth = config.auth.name(),
        secrets_manager_secret_id = secret_id.unwrap_or_default(),
        encryption = config.encryption_enabled(),
        storage_class = %config.storage_class,
        part_size = config.part_size,
        "Backup configuration"
    );
}

//! # Command Line Interface
//!
//! Runs one backup invocation from the command line. The event payload is
//! read from a file or stdin, the relevant environment is captured, the AWS
//! collaborators are wired up and the result is printed to stdout as JSON.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use crate::backup::BackupOrchestrator;
use crate::config::{EnvSnapshot, EventPayload, ObservabilityConfig};
use crate::credentials::RdsTokenIssuer;
use crate::dump::PgDumpProducer;
use crate::observability::init_logging;
use crate::secrets::AwsSecretsManagerClient;
use crate::storage::{DiscardObjectStore, ObjectStore, S3ObjectStore};
use crate::{APP_NAME, VERSION};

#[derive(Debug, Parser)]
#[command(name = "dumpstream")]
#[command(about = "Stream PostgreSQL backups to S3")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Event payload file, or `-` for stdin. Without it only the environment is used
    #[arg(short, long, value_name = "PATH")]
    pub event: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long, env = "DUMPSTREAM_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Use path-style bucket addressing with a custom endpoint
    #[arg(long, requires = "s3_endpoint")]
    pub force_path_style: bool,

    /// Run the dump (and encryption) but discard the output instead of uploading
    #[arg(long)]
    pub dry_run: bool,
}

/// Parse arguments and run a backup.
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut observability = ObservabilityConfig::from_env();
    if cli.verbose {
        observability.log_level = "debug".to_string();
    }
    init_logging(&observability);

    info!(app_name = APP_NAME, version = VERSION, "Starting backup");

    let event = read_event(cli.event.as_deref()).await?;
    let env = EnvSnapshot::capture();
    let orchestrator = build_orchestrator(&cli).await;

    let outcome = orchestrator.handle(event, &env).await.inspect_err(|e| {
        error!(
            stage = %e.stage(),
            database = e.database().unwrap_or_default(),
            error = %e,
            "Backup failed"
        );
    })?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

async fn build_orchestrator(cli: &Cli) -> BackupOrchestrator {
    let sdk_config = aws_config::load_from_env().await;

    let store: Arc<dyn ObjectStore> = if cli.dry_run {
        info!("Dry run: backups are read and discarded");
        Arc::new(DiscardObjectStore::new())
    } else {
        let store = S3ObjectStore::new(&sdk_config);
        match &cli.s3_endpoint {
            Some(endpoint) => Arc::new(store.with_endpoint(endpoint, cli.force_path_style)),
            None => Arc::new(store),
        }
    };

    BackupOrchestrator::new(Arc::new(PgDumpProducer::new()), store)
        .with_secrets_client(Arc::new(AwsSecretsManagerClient::new(&sdk_config)))
        .with_token_issuer(Arc::new(RdsTokenIssuer::new(sdk_config)))
}

/// Read the event payload from `path`, stdin (`-`), or nothing.
pub async fn read_event(path: Option<&std::path::Path>) -> anyhow::Result<EventPayload> {
    let raw = match path {
        None => return Ok(EventPayload::default()),
        Some(path) if path.as_os_str() == "-" => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read event from stdin")?;
            raw
        }
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
    };

    Ok(EventPayload::from_json(&raw)?)
}

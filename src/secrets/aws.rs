//! AWS Secrets Manager backend.
//!
//! Reads database credentials stored as a JSON secret string, typically the
//! `{"username": ..., "password": ...}` document RDS generates for managed
//! credentials. Parsing of the document happens in the credential decorator;
//! this client only returns the raw secret string.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_secretsmanager::Client;

use super::client::SecretsClient;
use super::error::{Result, SecretsError};

/// Secrets client backed by AWS Secrets Manager.
#[derive(Debug, Clone)]
pub struct AwsSecretsManagerClient {
    client: Client,
}

impl AwsSecretsManagerClient {
    /// Create a client from a loaded AWS SDK configuration.
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self { client: Client::new(sdk_config) }
    }

    /// Wrap an already configured Secrets Manager client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretsClient for AwsSecretsManagerClient {
    async fn get_secret(&self, key: &str) -> Result<String> {
        tracing::debug!(secret_id = %key, "Fetching secret from Secrets Manager");

        let output =
            self.client.get_secret_value().secret_id(key).send().await.map_err(|err| {
                match err.as_service_error() {
                    Some(service_err) if service_err.is_resource_not_found_exception() => {
                        SecretsError::not_found(key)
                    }
                    Some(service_err) if service_err.code() == Some("AccessDeniedException") => {
                        SecretsError::access_denied(format!(
                            "not allowed to read secret '{}': {}",
                            key,
                            service_err.message().unwrap_or("no message")
                        ))
                    }
                    _ => SecretsError::backend_error(format!(
                        "GetSecretValue for '{}' failed: {}",
                        key,
                        DisplayErrorContext(&err)
                    )),
                }
            })?;

        output.secret_string().map(str::to_string).ok_or_else(|| {
            SecretsError::invalid_value(format!("secret '{}' has no string value", key))
        })
    }
}

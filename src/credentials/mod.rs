//! # Credential Decorator
//!
//! Resolves the configured [`AuthStrategy`] into connection credentials and
//! folds them back into the [`BackupConfig`]:
//!
//! - [`AuthStrategy::IamToken`]: the password is replaced by a short-lived
//!   token from a [`TokenIssuer`]
//! - [`AuthStrategy::SecretsManager`]: username and password are read from a
//!   JSON secret through a [`SecretsClient`] and override the configured ones
//! - [`AuthStrategy::None`]: the configuration passes through unchanged
//!
//! Failures are fatal and never retried.

pub mod token;

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{AuthStrategy, BackupConfig};
use crate::secrets::{SecretString, SecretsClient, SecretsError};

pub use token::{TokenError, TokenIssuer, TokenRequest};
#[cfg(feature = "aws")]
pub use token::RdsTokenIssuer;

/// Errors raised while resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The secret store could not return the secret
    #[error("failed to fetch secret '{secret_id}': {source}")]
    SecretFetch {
        secret_id: String,
        #[source]
        source: SecretsError,
    },

    /// The secret is not a `{"username", "password"}` document
    #[error("secret '{secret_id}' is not a valid credentials document: {reason}")]
    MalformedSecret { secret_id: String, reason: String },

    /// Token generation failed
    #[error("failed to generate authentication token: {0}")]
    Token(#[from] TokenError),

    /// A strategy is configured but its collaborator was never provided
    #[error("{strategy} authentication is configured but no {collaborator} is available")]
    MissingCollaborator { strategy: &'static str, collaborator: &'static str },
}

/// Credentials produced for one invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialDecoration {
    None,
    Token { token: SecretString },
    SecretStore { username: String, password: SecretString },
}

impl CredentialDecoration {
    /// Fold the credentials into `config`. The auth strategy is left as-is.
    pub fn apply(self, mut config: BackupConfig) -> BackupConfig {
        match self {
            CredentialDecoration::None => {}
            CredentialDecoration::Token { token } => {
                config.password = Some(token);
            }
            CredentialDecoration::SecretStore { username, password } => {
                config.user = Some(username);
                config.password = Some(password);
            }
        }
        config
    }
}

#[derive(Deserialize)]
struct SecretPayload {
    username: String,
    password: SecretString,
}

/// Resolves credentials using whichever collaborators are wired in.
#[derive(Clone, Default)]
pub struct CredentialDecorator {
    secrets: Option<Arc<dyn SecretsClient>>,
    tokens: Option<Arc<dyn TokenIssuer>>,
}

impl CredentialDecorator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets_client(mut self, client: Arc<dyn SecretsClient>) -> Self {
        self.secrets = Some(client);
        self
    }

    pub fn with_token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.tokens = Some(issuer);
        self
    }

    /// Resolve the credentials the configured strategy calls for.
    pub async fn resolve(
        &self,
        config: &BackupConfig,
    ) -> Result<CredentialDecoration, CredentialError> {
        match &config.auth {
            AuthStrategy::None => Ok(CredentialDecoration::None),
            AuthStrategy::IamToken => {
                let issuer = self.tokens.as_ref().ok_or(CredentialError::MissingCollaborator {
                    strategy: "IAM",
                    collaborator: "token issuer",
                })?;
                let request = TokenRequest::from_config(config)?;
                let token = issuer.issue_token(&request).await?;
                info!(host = %request.host, user = %request.user, "Using IAM authentication token");
                Ok(CredentialDecoration::Token { token })
            }
            AuthStrategy::SecretsManager { secret_id } => {
                let client = self.secrets.as_ref().ok_or(CredentialError::MissingCollaborator {
                    strategy: "Secrets Manager",
                    collaborator: "secrets client",
                })?;
                let raw = client.get_secret(secret_id).await.map_err(|source| {
                    CredentialError::SecretFetch { secret_id: secret_id.clone(), source }
                })?;
                let payload = parse_secret(secret_id, &raw)?;
                info!(secret_id = %secret_id, user = %payload.username, "Using credentials from Secrets Manager");
                Ok(CredentialDecoration::SecretStore {
                    username: payload.username,
                    password: payload.password,
                })
            }
        }
    }

    /// Resolve credentials and merge them into `config`.
    pub async fn decorate(&self, config: BackupConfig) -> Result<BackupConfig, CredentialError> {
        debug!(strategy = config.auth.name(), "Resolving database credentials");
        let decoration = self.resolve(&config).await?;
        Ok(decoration.apply(config))
    }
}

fn parse_secret(secret_id: &str, raw: &str) -> Result<SecretPayload, CredentialError> {
    // serde_json errors can quote input, so only the category is reported
    serde_json::from_str::<SecretPayload>(raw).map_err(|e| CredentialError::MalformedSecret {
        secret_id: secret_id.to_string(),
        reason: match e.classify() {
            serde_json::error::Category::Data => "missing or mistyped username/password".to_string(),
            serde_json::error::Category::Syntax | serde_json::error::Category::Eof => {
                "not valid JSON".to_string()
            }
            serde_json::error::Category::Io => "unreadable".to_string(),
        },
    })
}

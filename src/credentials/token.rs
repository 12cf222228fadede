//! Short-lived database authentication tokens.

use async_trait::async_trait;

use crate::config::BackupConfig;
use crate::secrets::SecretString;

/// Errors raised while issuing an authentication token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The request is missing information needed to scope the token
    #[error("invalid token request: {message}")]
    InvalidRequest { message: String },

    /// Signing the token failed
    #[error("token signing failed: {message}")]
    Signing { message: String },
}

impl TokenError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing { message: message.into() }
    }
}

/// What a token is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub region: String,
}

impl TokenRequest {
    /// Build a request from connection settings. The token is scoped to the
    /// storage region, which is expected to match the database region.
    pub fn from_config(config: &BackupConfig) -> Result<Self, TokenError> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| TokenError::invalid_request("PGHOST is required for IAM authentication"))?;
        let user = config
            .user
            .clone()
            .ok_or_else(|| TokenError::invalid_request("PGUSER is required for IAM authentication"))?;

        Ok(Self { host, port: config.port, user, region: config.region.clone() })
    }
}

/// Issues short-lived tokens that stand in for a database password.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(&self, request: &TokenRequest) -> Result<SecretString, TokenError>;
}

#[cfg(feature = "aws")]
pub use rds::RdsTokenIssuer;

#[cfg(feature = "aws")]
mod rds {
    use async_trait::async_trait;
    use aws_config::SdkConfig;
    use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config};
    use aws_sdk_rds::config::Region;

    use super::{TokenError, TokenIssuer, TokenRequest};
    use crate::secrets::SecretString;

    /// Issues RDS IAM authentication tokens signed with the ambient AWS
    /// credentials.
    #[derive(Debug, Clone)]
    pub struct RdsTokenIssuer {
        sdk_config: SdkConfig,
    }

    impl RdsTokenIssuer {
        pub fn new(sdk_config: SdkConfig) -> Self {
            Self { sdk_config }
        }
    }

    #[async_trait]
    impl TokenIssuer for RdsTokenIssuer {
        async fn issue_token(&self, request: &TokenRequest) -> Result<SecretString, TokenError> {
            tracing::debug!(
                host = %request.host,
                port = request.port,
                user = %request.user,
                region = %request.region,
                "Generating RDS IAM authentication token"
            );

            let config = Config::builder()
                .hostname(&request.host)
                .port(u64::from(request.port))
                .username(&request.user)
                .region(Region::new(request.region.clone()))
                .build()
                .map_err(|e| TokenError::invalid_request(e.to_string()))?;

            let token = AuthTokenGenerator::new(config)
                .auth_token(&self.sdk_config)
                .await
                .map_err(|e| TokenError::signing(e.to_string()))?;

            Ok(SecretString::new(token.as_str()))
        }
    }
}

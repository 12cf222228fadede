//! Core secret store trait.

use async_trait::async_trait;

use super::error::Result;

/// Read-only access to an external secret store.
///
/// The backup pipeline reads at most one secret per invocation: the
/// database credentials.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret values
/// - Errors MUST NOT embed the secret value
///
/// # Example Implementation
///
/// ```rust,ignore
/// use dumpstream::secrets::{Result, SecretsClient};
/// use async_trait::async_trait;
///
/// struct StaticSecrets(String);
///
/// #[async_trait]
/// impl SecretsClient for StaticSecrets {
///     async fn get_secret(&self, _key: &str) -> Result<String> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Retrieve a secret value by identifier.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`](super::SecretsError::NotFound) if the secret doesn't exist
    /// - [`SecretsError::AccessDenied`](super::SecretsError::AccessDenied) if the caller lacks permission
    /// - [`SecretsError::BackendError`](super::SecretsError::BackendError) for transport failures
    async fn get_secret(&self, key: &str) -> Result<String>;
}

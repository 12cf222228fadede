//! Secret store abstraction for database credentials.
//!
//! The backup pipeline can take its database username and password from an
//! external secret store instead of the invocation payload. The store is
//! reached through the [`SecretsClient`] trait so the credential decorator can
//! be exercised against in-memory fakes.
//!
//! # Supported Backends
//!
//! - **AWS Secrets Manager**: [`AwsSecretsManagerClient`] (feature `aws`)
//!
//! # Security Considerations
//!
//! - Secret values are never logged or embedded in error messages
//! - Passwords and tokens are carried as [`SecretString`]

#[cfg(feature = "aws")]
pub mod aws;
pub mod client;
pub mod error;
pub mod types;

#[cfg(feature = "aws")]
pub use aws::AwsSecretsManagerClient;
pub use client::SecretsClient;
pub use error::{Result, SecretsError};
pub use types::SecretString;

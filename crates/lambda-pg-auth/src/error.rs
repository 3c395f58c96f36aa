//! Authentication error types.

use aws_credential_types::provider::error::CredentialsError;
use thiserror::Error;

/// Errors that can occur while producing a credential token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A signing input (host, port, user or region) is missing.
    #[error("incomplete signing input: {field} is required")]
    IncompleteSigningInput {
        /// Name of the first missing input.
        field: &'static str,
    },

    /// No AWS credentials provider is configured.
    #[error("no AWS credentials provider configured")]
    MissingAwsCredentials,

    /// The AWS credentials provider failed.
    #[error("failed to load AWS credentials: {0}")]
    Credentials(#[from] CredentialsError),

    /// The signature could not be computed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Token acquisition from an external source failed.
    #[error("failed to acquire token: {0}")]
    TokenAcquisition(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Check if this error is caused by incomplete input rather than a
    /// failing signer.
    #[must_use]
    pub fn is_incomplete_input(&self) -> bool {
        matches!(
            self,
            Self::IncompleteSigningInput { .. } | Self::MissingAwsCredentials
        )
    }
}

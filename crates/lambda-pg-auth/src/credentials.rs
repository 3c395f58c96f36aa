//! AWS credential sources for token signing.
//!
//! Credentials are resolved through `aws-config`, so everything the AWS SDK
//! supports works here: environment variables, shared profiles, web
//! identity, container endpoints and instance metadata. Resolution happens
//! per token, as execution-role credentials rotate.

use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use tokio::sync::OnceCell;

use crate::error::AuthError;

#[derive(Debug, Clone)]
enum Source {
    /// The `aws-config` default chain, loaded on first use.
    DefaultChain(Arc<OnceCell<SharedCredentialsProvider>>),
    Provider(SharedCredentialsProvider),
}

/// Where AWS credentials for signing come from.
#[derive(Debug, Clone)]
pub struct AwsCredentialSource {
    source: Source,
}

impl Default for AwsCredentialSource {
    fn default() -> Self {
        Self::default_chain()
    }
}

impl AwsCredentialSource {
    /// Use the default `aws-config` credential chain.
    ///
    /// The chain is loaded lazily by the first signing request.
    #[must_use]
    pub fn default_chain() -> Self {
        Self {
            source: Source::DefaultChain(Arc::new(OnceCell::new())),
        }
    }

    /// Use an explicit credentials provider.
    pub fn from_provider(provider: impl ProvideCredentials + 'static) -> Self {
        Self {
            source: Source::Provider(SharedCredentialsProvider::new(provider)),
        }
    }

    /// Use fixed credentials.
    #[must_use]
    pub fn from_credentials(credentials: Credentials) -> Self {
        Self::from_provider(credentials)
    }

    /// Use the credentials provider of an already loaded SDK configuration.
    pub fn from_sdk_config(config: &SdkConfig) -> Result<Self, AuthError> {
        let provider = config
            .credentials_provider()
            .ok_or(AuthError::MissingAwsCredentials)?;
        Ok(Self {
            source: Source::Provider(provider),
        })
    }

    /// Resolve the current credentials.
    pub async fn credentials(&self) -> Result<Credentials, AuthError> {
        let provider = match &self.source {
            Source::Provider(provider) => provider,
            Source::DefaultChain(cell) => {
                cell.get_or_try_init(|| async {
                    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
                    tracing::debug!("loaded AWS default credential chain");
                    config
                        .credentials_provider()
                        .ok_or(AuthError::MissingAwsCredentials)
                })
                .await?
            }
        };
        Ok(provider.provide_credentials().await?)
    }
}

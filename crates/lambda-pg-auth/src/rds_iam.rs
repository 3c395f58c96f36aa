//! RDS IAM database authentication tokens.
//!
//! An RDS authentication token is a SigV4 presigned URL for the `connect`
//! action of the `rds-db` service, with the `https://` scheme stripped. It is
//! signed locally with `aws-sigv4`; only credential resolution may touch the
//! network. Tokens are valid for 15 minutes, which is why pools built from
//! them must be recycled.
//!
//! ```text
//! {host}:{port}/?Action=connect&DBUser={user}&X-Amz-Algorithm=AWS4-HMAC-SHA256
//!     &X-Amz-Credential=...&X-Amz-Date=...&X-Amz-Expires=900
//!     &X-Amz-SignedHeaders=host[&X-Amz-Security-Token=...]&X-Amz-Signature=...
//! ```

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SignatureLocation, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::credentials::AwsCredentialSource;
use crate::error::AuthError;
use crate::provider::{AuthToken, TokenProvider, TokenRequest};

/// Service name used in the credential scope.
pub const SERVICE: &str = "rds-db";
/// Token lifetime accepted by RDS.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(900);

/// Characters SigV4 leaves unescaped: `A-Z a-z 0-9 - _ . ~`.
const SIGV4_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Signs RDS IAM authentication tokens.
///
/// # Example
///
/// ```rust,ignore
/// use lambda_pg_auth::{RdsIamSigner, TokenProvider, TokenRequest};
///
/// let signer = RdsIamSigner::new();
/// let request = TokenRequest::new("db.example.com", 5432, "app", "us-east-1");
/// let token = signer.token(&request).await?;
/// assert!(token.secret().starts_with("db.example.com:5432/?Action=connect"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RdsIamSigner {
    source: AwsCredentialSource,
}

impl RdsIamSigner {
    /// Sign with credentials from the default `aws-config` chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign with fixed credentials.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self::with_source(AwsCredentialSource::from_credentials(credentials))
    }

    /// Sign with credentials from an explicit provider.
    pub fn with_provider(provider: impl ProvideCredentials + 'static) -> Self {
        Self::with_source(AwsCredentialSource::from_provider(provider))
    }

    /// Sign with the credentials provider of a loaded SDK configuration.
    pub fn from_sdk_config(config: &SdkConfig) -> Result<Self, AuthError> {
        AwsCredentialSource::from_sdk_config(config).map(Self::with_source)
    }

    /// Sign with credentials from `source`.
    #[must_use]
    pub fn with_source(source: AwsCredentialSource) -> Self {
        Self { source }
    }

    /// Resolve credentials and compute a token as of `now`.
    pub async fn sign_at(
        &self,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthToken, AuthError> {
        let credentials = self.source.credentials().await?;
        presign(&credentials, request, now)
    }
}

#[async_trait]
impl TokenProvider for RdsIamSigner {
    async fn token(&self, request: &TokenRequest) -> Result<AuthToken, AuthError> {
        let token = self.sign_at(request, Utc::now()).await?;
        tracing::debug!(
            host = %request.host,
            port = request.port,
            user = %request.user,
            region = %request.region,
            "signed RDS IAM authentication token"
        );
        Ok(token)
    }

    fn name(&self) -> &'static str {
        "rds-iam"
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, SIGV4_ENCODE_SET).to_string()
}

fn signing_error(e: impl std::fmt::Display) -> AuthError {
    AuthError::Signing(e.to_string())
}

/// Compute an RDS authentication token from resolved credentials.
pub fn presign(
    credentials: &Credentials,
    request: &TokenRequest,
    now: DateTime<Utc>,
) -> Result<AuthToken, AuthError> {
    let identity = credentials.clone().into();

    let mut settings = SigningSettings::default();
    settings.expires_in = Some(TOKEN_LIFETIME);
    settings.signature_location = SignatureLocation::QueryParams;

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(&request.region)
        .name(SERVICE)
        .time(SystemTime::from(now))
        .settings(settings)
        .build()
        .map_err(signing_error)?;

    let url = format!(
        "https://{}/?Action=connect&DBUser={}",
        request.endpoint(),
        encode(&request.user)
    );
    let signable = SignableRequest::new(
        "GET",
        url.as_str(),
        std::iter::empty(),
        SignableBody::Bytes(&[]),
    )
    .map_err(signing_error)?;
    let (instructions, _signature) = sign(signable, &params.into())
        .map_err(signing_error)?
        .into_parts();

    let mut token = url["https://".len()..].to_string();
    for (name, value) in instructions.params() {
        token.push('&');
        token.push_str(name);
        token.push('=');
        token.push_str(&encode(value));
    }
    Ok(AuthToken::with_expiry(token, now, TOKEN_LIFETIME))
}

//! Token provider trait and request types.
//!
//! A token provider turns connection coordinates into a short-lived secret
//! that is used as the database password. Tokens expire, so callers request
//! a fresh one every time they build a new pool instead of caching it.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AuthError;

/// Connection coordinates a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Database hostname.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database user the token authenticates.
    pub user: String,
    /// Cloud region of the database.
    pub region: String,
}

impl TokenRequest {
    /// Create a request from complete coordinates.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            region: region.into(),
        }
    }

    /// Create a request from possibly-missing coordinates.
    ///
    /// Empty strings count as missing. Fails with
    /// [`AuthError::IncompleteSigningInput`] naming the first missing field.
    pub fn from_parts(
        host: Option<&str>,
        port: Option<u16>,
        user: Option<&str>,
        region: Option<&str>,
    ) -> Result<Self, AuthError> {
        fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, AuthError> {
            value
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::IncompleteSigningInput { field })
        }

        let host = require(host, "host")?;
        let port = port
            .filter(|p| *p != 0)
            .ok_or(AuthError::IncompleteSigningInput { field: "port" })?;
        let user = require(user, "user")?;
        let region = require(region, "region")?;
        Ok(Self::new(host, port, user, region))
    }

    /// The `host:port` endpoint the token is bound to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A short-lived secret issued by a [`TokenProvider`].
#[derive(Clone)]
pub struct AuthToken {
    secret: Cow<'static, str>,
    issued_at: DateTime<Utc>,
    expires_in: Option<Duration>,
}

impl AuthToken {
    /// Create a token issued now with no known expiry.
    pub fn new(secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            secret: secret.into(),
            issued_at: Utc::now(),
            expires_in: None,
        }
    }

    /// Create a token with an issue time and lifetime.
    pub fn with_expiry(
        secret: impl Into<Cow<'static, str>>,
        issued_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> Self {
        Self {
            secret: secret.into(),
            issued_at,
            expires_in: Some(expires_in),
        }
    }

    /// Get the secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Consume the token and return the secret.
    #[must_use]
    pub fn into_secret(self) -> String {
        self.secret.into_owned()
    }

    /// When the token was issued.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Check whether the token is past its lifetime at `now`.
    ///
    /// Tokens without a known lifetime never report expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_in.and_then(|d| chrono::Duration::from_std(d).ok()) {
            Some(lifetime) => now >= self.issued_at + lifetime,
            None => false,
        }
    }

    /// Check whether the token is past its lifetime.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("secret", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Trait for credential token providers.
///
/// Implementations may perform network calls, so token acquisition is
/// async. `#[async_trait]` keeps the trait object-safe so pools can hold an
/// `Arc<dyn TokenProvider>`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Issue a token for the given coordinates.
    async fn token(&self, request: &TokenRequest) -> Result<AuthToken, AuthError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// A provider that always returns the same secret.
///
/// Useful for tests and for local databases without IAM authentication.
#[derive(Clone)]
pub struct StaticToken {
    secret: Cow<'static, str>,
}

impl StaticToken {
    /// Create a provider returning `secret`.
    pub fn new(secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _request: &TokenRequest) -> Result<AuthToken, AuthError> {
        Ok(AuthToken::new(self.secret.clone()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_complete() {
        let request =
            TokenRequest::from_parts(Some("db.local"), Some(5432), Some("app"), Some("us-east-1"))
                .unwrap();
        assert_eq!(request.endpoint(), "db.local:5432");
    }

    #[test]
    fn test_from_parts_reports_first_missing_field() {
        let err = TokenRequest::from_parts(None, None, Some("app"), None).unwrap_err();
        assert!(matches!(
            err,
            AuthError::IncompleteSigningInput { field: "host" }
        ));

        let err = TokenRequest::from_parts(Some("db"), Some(5432), Some(""), Some("eu-west-1"))
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::IncompleteSigningInput { field: "user" }
        ));

        let err =
            TokenRequest::from_parts(Some("db"), Some(5432), Some("app"), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "incomplete signing input: region is required"
        );
    }

    #[test]
    fn test_zero_port_is_missing() {
        let err = TokenRequest::from_parts(Some("db"), Some(0), Some("app"), Some("us-east-1"))
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::IncompleteSigningInput { field: "port" }
        ));
    }

    #[test]
    fn test_token_expiry() {
        let issued = Utc::now();
        let token = AuthToken::with_expiry("t", issued, Duration::from_secs(900));
        assert!(!token.is_expired_at(issued + chrono::Duration::seconds(899)));
        assert!(token.is_expired_at(issued + chrono::Duration::seconds(900)));
        assert!(!AuthToken::new("t").is_expired());
    }

    #[test]
    fn test_static_token() {
        let provider = StaticToken::new("s3cr3t-value");
        let request = TokenRequest::new("db", 5432, "app", "us-east-1");
        let token = tokio_test::block_on(provider.token(&request)).unwrap();
        assert_eq!(token.secret(), "s3cr3t-value");
        assert_eq!(provider.name(), "static");
        assert!(!format!("{token:?}").contains("s3cr3t-value"));
        assert!(!format!("{provider:?}").contains("s3cr3t-value"));
    }
}

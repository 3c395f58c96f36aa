//! # lambda-pg-auth
//!
//! Short-lived credential tokens for PostgreSQL connection pools.
//!
//! This crate isolates password acquisition from pool management. A pool
//! asks a [`TokenProvider`] for a fresh secret every time it builds a new
//! underlying pool, so providers never cache tokens.
//!
//! ## Supported Providers
//!
//! | Provider | Description |
//! |----------|-------------|
//! | [`RdsIamSigner`] | SigV4-presigned RDS IAM authentication token, credentials from `aws-config` |
//! | [`StaticToken`] | Fixed secret (tests, local databases) |
//!
//! Custom providers implement [`TokenProvider`] directly.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod provider;
pub mod rds_iam;

pub use aws_credential_types::Credentials;
pub use credentials::AwsCredentialSource;
pub use error::AuthError;
pub use provider::{AuthToken, StaticToken, TokenProvider, TokenRequest};
pub use rds_iam::RdsIamSigner;

//! # lambda-pg-testing
//!
//! Test infrastructure for lambda-pg development.
//!
//! This crate provides an in-memory mock driver so the pool lifecycle and
//! the executors can be tested without a PostgreSQL instance, plus fixtures
//! shared by the live tests.
//!
//! ## Features
//!
//! - Mock driver implementing the driver traits (no database required)
//! - Build, end, checkout and release counters
//! - Executed statement log
//! - Failure and idle-connection fault injection
//! - Test fixture utilities
//!
//! ## Mock Driver Example
//!
//! ```rust,ignore
//! use lambda_pg_testing::mock_driver::{MockDriver, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock_driver() {
//!     let driver = MockDriver::builder()
//!         .with_response("SELECT 1", MockResponse::scalar(1i32))
//!         .build();
//!
//!     // Build a manager or client over driver.clone() ...
//!     assert_eq!(driver.builds(), 1);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_driver;

pub use fixtures::TestFixture;
pub use mock_driver::{MockConnection, MockDriver, MockDriverBuilder, MockPool, MockResponse};

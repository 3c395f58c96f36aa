//! # lambda-pg-pool
//!
//! Self-healing pool lifecycle for short-lived, horizontally scaled
//! runtimes.
//!
//! Serverless functions reuse a process across invocations, but the
//! connections they pooled can silently die in between: IAM tokens rotate
//! and idle sockets are killed. This crate wraps a driver pool in a
//! [`LifecycleManager`] that rebuilds it once it outlives a health window,
//! fetches a fresh credential token for every new pool, and reacts to
//! faults on idle connections.
//!
//! ## Features
//!
//! - Lazy pool creation on first use
//! - Mandatory recreation after the health window (`DBPOOL_MAXAGE`)
//! - Single-flight (coalesced) or best-effort (`WAIT`) re-initialization
//! - Terminate-or-discard policy for idle-connection faults
//! - Runtime reconfiguration from JSON fragments
//!
//! ## Example
//!
//! ```rust,ignore
//! use lambda_pg_pool::{Ensured, LifecycleManager, LifecycleOptions, PoolConfig};
//!
//! let manager = LifecycleManager::builder(driver)
//!     .config(PoolConfig::from_env()?.max(5))
//!     .options(LifecycleOptions::from_env())
//!     .build()?;
//!
//! let pool = match manager.ensure_pool().await? {
//!     Ensured::Ready(pool) => pool,
//!     Ensured::Wait => {
//!         manager.wait_for_pool().await;
//!         manager.current().ok_or("pool unavailable")?
//!     }
//! };
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod manager;

pub use config::{PoolConfig, PoolConfigPatch};
pub use error::PoolError;
pub use lifecycle::{Ensured, FaultPolicy, InitStrategy, LifecycleOptions, PoolPhase};
pub use manager::{LifecycleManager, LifecycleManagerBuilder};

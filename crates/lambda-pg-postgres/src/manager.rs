//! Deadpool manager for `tokio-postgres` connections.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use deadpool::managed::{Manager, Metrics, RecycleError, RecycleResult};
use lambda_pg_types::{DriverError, PoolFault};
use tokio::sync::broadcast;
use tokio_postgres::NoTls;

/// A pooled `tokio-postgres` client.
pub struct PgConnection {
    pub(crate) client: tokio_postgres::Client,
    /// Set while the connection is checked out of the pool.
    pub(crate) busy: Arc<AtomicBool>,
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish()
    }
}

/// Creates and recycles [`PgConnection`]s.
///
/// Every connection's background task reports a [`PoolFault`] if it ends
/// with an error while the connection sits idle in the pool. Errors on
/// checked-out connections surface through the statement that hit them.
pub struct PgManager {
    config: tokio_postgres::Config,
    faults: broadcast::Sender<PoolFault>,
}

impl PgManager {
    pub(crate) fn new(config: tokio_postgres::Config, faults: broadcast::Sender<PoolFault>) -> Self {
        Self { config, faults }
    }
}

impl fmt::Debug for PgManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // tokio_postgres::Config redacts the password in its Debug output
        f.debug_struct("PgManager")
            .field("config", &self.config)
            .finish()
    }
}

impl Manager for PgManager {
    type Type = PgConnection;
    type Error = DriverError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        let busy = Arc::new(AtomicBool::new(false));
        let watched = Arc::clone(&busy);
        let faults = self.faults.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                if watched.load(Ordering::SeqCst) {
                    tracing::debug!(error = %e, "connection failed while checked out");
                } else {
                    tracing::warn!(error = %e, "idle connection failed");
                    // No receiver means nobody is watching this pool anymore
                    let _ = faults.send(PoolFault::new(e.to_string()));
                }
            }
        });

        tracing::debug!("opened postgres connection");
        Ok(PgConnection { client, busy })
    }

    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        if conn.client.is_closed() {
            return Err(RecycleError::Backend(DriverError::Connection(
                "connection closed".into(),
            )));
        }
        Ok(())
    }
}


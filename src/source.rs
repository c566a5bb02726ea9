use crate::config::DataSourceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool};
use std::sync::atomic::{AtomicU64, Ordering};

/// A numbered connection handed out by a [`ConnectionSource`].
///
/// The handle remembers whether an explicit transaction is open on it, so a
/// source can refuse to recycle a connection whose transaction was never
/// finished.
pub struct ConnectionHandle {
    id: u64,
    connection: PoolConnection<Any>,
    in_transaction: bool,
}

impl ConnectionHandle {
    pub fn new(id: u64, connection: PoolConnection<Any>) -> Self {
        Self {
            id,
            connection,
            in_transaction: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the underlying connection for use as an SQLx `Executor`.
    pub fn as_executor(&mut self) -> &mut AnyConnection {
        &mut self.connection
    }

    /// Whether a transaction was begun on this connection and not yet
    /// committed or rolled back.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub(crate) fn set_in_transaction(&mut self, in_transaction: bool) {
        self.in_transaction = in_transaction;
    }

    /// Closes the connection instead of returning it to its pool.
    pub fn discard(self) {
        drop(self.connection.detach());
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

/// Factory for raw connections.
///
/// Every handle returned by [`acquire`](ConnectionSource::acquire) must be
/// given back through [`release`](ConnectionSource::release) exactly once.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Obtains a connection; fails with [`Error::Connectivity`] when the
    /// database cannot be reached.
    async fn acquire(&self) -> Result<ConnectionHandle>;

    /// Returns a connection to the source.
    fn release(&self, connection: ConnectionHandle) -> Result<()>;
}

/// [`ConnectionSource`] backed by an SQLx `AnyPool`.
pub struct PoolConnectionSource {
    pool: AnyPool,
    next_id: AtomicU64,
}

impl PoolConnectionSource {
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a pool for `config.url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] if the initial connections cannot be
    /// established, or another translated error for a malformed URL.
    pub async fn connect(config: &DataSourceConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.url)
            .await?;

        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            "connection pool opened"
        );
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PoolConnectionSource {
    async fn acquire(&self) -> Result<ConnectionHandle> {
        let connection = self.pool.acquire().await.map_err(Error::Connectivity)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection = id, "get connection");
        Ok(ConnectionHandle::new(id, connection))
    }

    fn release(&self, connection: ConnectionHandle) -> Result<()> {
        let id = connection.id();
        if connection.in_transaction() {
            tracing::warn!(
                connection = id,
                "connection released with an open transaction; closing it"
            );
            connection.discard();
        } else {
            tracing::debug!(connection = id, "release connection");
            drop(connection);
        }
        Ok(())
    }
}

/// Scoped lease on a connection that is not bound to any transaction.
///
/// The connection goes back to its source when the guard is dropped, on every
/// exit path.
pub struct ConnectionGuard<'a> {
    source: &'a dyn ConnectionSource,
    connection: Option<ConnectionHandle>,
}

impl<'a> ConnectionGuard<'a> {
    pub async fn acquire(source: &'a dyn ConnectionSource) -> Result<ConnectionGuard<'a>> {
        let connection = source.acquire().await?;
        Ok(Self {
            source,
            connection: Some(connection),
        })
    }

    pub fn as_executor(&mut self) -> Result<&mut AnyConnection> {
        self.connection
            .as_mut()
            .map(ConnectionHandle::as_executor)
            .ok_or(Error::AlreadyConsumed)
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let id = connection.id();
            if let Err(e) = self.source.release(connection) {
                tracing::warn!(connection = id, "failed to release connection: {}", e);
            }
        }
    }
}

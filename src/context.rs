use crate::error::{Error, Result};
use crate::registry::ExecutionUnitId;
use crate::source::ConnectionHandle;
use sqlx::AnyConnection;
use sqlx::Executor;

/// Transaction context: one connection with auto-commit suspended, owned by
/// the coordinator for the duration of a single unit of work.
///
/// The context never releases its connection itself. Whoever created it takes
/// the connection back with [`take_connection`](Self::take_connection) and
/// hands it to the source it came from.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_transaction_sync::{ConnectionSource, ExecutionUnitId, TransactionContext};
///
/// # async fn example(source: &dyn ConnectionSource) -> sqlx_transaction_sync::Result<()> {
/// let connection = source.acquire().await?;
/// let mut tx = TransactionContext::new(connection, ExecutionUnitId::next());
/// tx.begin().await?;
///
/// sqlx::query("UPDATE member SET money = ? WHERE member_id = ?")
///     .bind(9000_i64)
///     .bind("memberA")
///     .execute(tx.as_executor()?)
///     .await?;
///
/// tx.commit().await?;
/// if let Some(connection) = tx.take_connection() {
///     source.release(connection)?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransactionContext {
    connection: Option<ConnectionHandle>,
    auto_commit_suspended: bool,
    started_at: ExecutionUnitId,
}

impl TransactionContext {
    pub fn new(connection: ConnectionHandle, started_at: ExecutionUnitId) -> Self {
        Self {
            connection: Some(connection),
            auto_commit_suspended: false,
            started_at,
        }
    }

    /// Suspends auto-commit by opening an explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection was already taken or the database
    /// refuses to start a transaction.
    pub async fn begin(&mut self) -> Result<()> {
        let connection = self.connection.as_mut().ok_or(Error::AlreadyConsumed)?;
        connection.as_executor().execute("BEGIN").await?;
        connection.set_in_transaction(true);
        self.auto_commit_suspended = true;
        tracing::debug!(
            connection = connection.id(),
            unit = %self.started_at,
            "transaction started"
        );
        Ok(())
    }

    /// Commits pending changes. A context whose transaction was never begun
    /// has nothing to commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction stays open so
    /// the caller can still roll it back.
    pub async fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT").await
    }

    /// Discards pending changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails. The connection then still
    /// reports [`in_transaction`](ConnectionHandle::in_transaction) and must
    /// not be recycled.
    pub async fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &'static str) -> Result<()> {
        if !self.auto_commit_suspended {
            return Ok(());
        }
        let connection = self.connection.as_mut().ok_or(Error::AlreadyConsumed)?;
        connection.as_executor().execute(statement).await?;
        connection.set_in_transaction(false);
        self.auto_commit_suspended = false;
        tracing::debug!(connection = connection.id(), unit = %self.started_at, "{}", statement);
        Ok(())
    }

    /// Returns the bound connection for use as an SQLx `Executor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConsumed`] once the connection has been taken.
    pub fn as_executor(&mut self) -> Result<&mut AnyConnection> {
        self.connection
            .as_mut()
            .map(ConnectionHandle::as_executor)
            .ok_or(Error::AlreadyConsumed)
    }

    /// Whether an explicit transaction is open on the connection.
    pub fn auto_commit_suspended(&self) -> bool {
        self.auto_commit_suspended
    }

    pub fn started_at(&self) -> ExecutionUnitId {
        self.started_at
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }

    /// Takes the connection out of the context, leaving it consumed.
    pub fn take_connection(&mut self) -> Option<ConnectionHandle> {
        self.connection.take()
    }
}

use crate::context::TransactionContext;
use crate::error::{Error, Result};
use crate::registry::{ExecutionUnitId, ResourceRegistry, SharedContext};
use crate::source::ConnectionSource;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Runs units of work inside a database transaction.
///
/// The coordinator handles the transaction lifecycle automatically:
/// - Acquires a connection and begins a transaction
/// - Binds the transaction to the calling execution unit
/// - Executes the provided work
/// - Commits on success, rolls back on error
/// - Unbinds and releases the connection on every exit path
///
/// The work closure receives no connection. Repository calls made while it
/// runs find the bound transaction through the shared [`ResourceRegistry`].
#[derive(Clone)]
pub struct TransactionCoordinator {
    source: Arc<dyn ConnectionSource>,
    registry: Arc<ResourceRegistry>,
}

impl TransactionCoordinator {
    pub fn new(source: Arc<dyn ConnectionSource>, registry: Arc<ResourceRegistry>) -> Self {
        Self { source, registry }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Executes `work` within a database transaction.
    ///
    /// # Returns
    ///
    /// Returns the result of `work`. When `work` fails its error is returned
    /// unchanged after the rollback; when only the commit fails the commit
    /// error is returned. Failures while rolling back or releasing are logged
    /// and never replace the primary outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyBound`] when called while a transaction is
    /// already bound to the calling execution unit. Transactions do not nest.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx_transaction_sync::{Member, MemberRepository, TransactionCoordinator};
    ///
    /// # async fn example(
    /// #     coordinator: &TransactionCoordinator,
    /// #     repository: &dyn MemberRepository,
    /// # ) -> sqlx_transaction_sync::Result<()> {
    /// coordinator
    ///     .run_in_transaction(|| async {
    ///         repository.save(Member::new("memberA", 10000)).await?;
    ///         repository.save(Member::new("memberB", 10000)).await?;
    ///         Ok(())
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_in_transaction<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let unit = ExecutionUnitId::current().unwrap_or_else(ExecutionUnitId::next);
        unit.scope(self.run_bound(unit, work)).await
    }

    async fn run_bound<F, Fut, T>(&self, unit: ExecutionUnitId, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // Checked before acquiring so a nested call cannot wait on a pool
        // exhausted by its own enclosing transaction.
        if self.registry.is_bound() {
            return Err(Error::AlreadyBound(unit));
        }

        let connection = self.source.acquire().await?;
        let context: SharedContext = Arc::new(Mutex::new(TransactionContext::new(connection, unit)));
        let mut scope = TransactionScope {
            source: self.source.as_ref(),
            registry: &self.registry,
            unit,
            context: Arc::clone(&context),
            bound: false,
        };

        self.registry.bind(Arc::clone(&context))?;
        scope.bound = true;
        context.lock().await.begin().await?;

        let outcome = match work().await {
            Ok(value) => {
                let committed = context.lock().await.commit().await;
                committed.map(|()| value)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            tracing::debug!(%unit, "rolling back: {}", e);
            let rolled_back = context.lock().await.rollback().await;
            if let Err(rollback_error) = rolled_back {
                tracing::warn!(%unit, "rollback failed: {}", rollback_error);
            }
        }

        outcome
    }
}

/// Unbinds the context and releases its connection when the unit of work
/// ends, however it ends.
struct TransactionScope<'a> {
    source: &'a dyn ConnectionSource,
    registry: &'a ResourceRegistry,
    unit: ExecutionUnitId,
    context: SharedContext,
    bound: bool,
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.bound {
            self.registry.unbind_unit(self.unit);
        }

        let connection = match self.context.try_lock() {
            Ok(mut context) => context.take_connection(),
            Err(_) => {
                tracing::warn!(unit = %self.unit, "transaction context still in use; connection not released");
                None
            }
        };

        if let Some(connection) = connection {
            let id = connection.id();
            if let Err(e) = self.source.release(connection) {
                tracing::warn!(unit = %self.unit, connection = id, "failed to release connection: {}", e);
            }
        }
    }
}

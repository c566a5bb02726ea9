//! Execution-unit scoped binding of the active transaction.
//!
//! An execution unit is a tokio task that carries an [`ExecutionUnitId`] in a
//! task-local slot. The [`ResourceRegistry`] maps that id to at most one
//! [`TransactionContext`], which is how repository calls running on the unit
//! discover the connection of an enclosing transaction without receiving it as
//! a parameter. Tasks spawned from inside a unit do not inherit the slot, so a
//! binding is never visible to a concurrent unit.

use crate::context::TransactionContext;
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

tokio::task_local! {
    static EXECUTION_UNIT: ExecutionUnitId;
}

static NEXT_UNIT: AtomicU64 = AtomicU64::new(1);

/// Identity of one logical thread of control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionUnitId(u64);

impl ExecutionUnitId {
    /// Allocates a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_UNIT.fetch_add(1, Ordering::Relaxed))
    }

    /// The unit the calling task is running in, if any.
    pub fn current() -> Option<Self> {
        EXECUTION_UNIT.try_with(|unit| *unit).ok()
    }

    /// Runs `future` as execution unit `self`.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        EXECUTION_UNIT.scope(self, future).await
    }
}

impl std::fmt::Display for ExecutionUnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// A transaction context shared between its coordinator and the repository
/// calls that borrow its connection.
pub type SharedContext = Arc<Mutex<TransactionContext>>;

/// Keyed registry of active transaction contexts, one per execution unit.
#[derive(Default)]
pub struct ResourceRegistry {
    bindings: DashMap<ExecutionUnitId, SharedContext>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `context` to the calling execution unit.
    ///
    /// # Errors
    ///
    /// - [`Error::NoExecutionUnit`] when called outside of any unit
    /// - [`Error::AlreadyBound`] when the unit already has a context
    pub fn bind(&self, context: SharedContext) -> Result<()> {
        let unit = ExecutionUnitId::current().ok_or(Error::NoExecutionUnit)?;
        match self.bindings.entry(unit) {
            Entry::Occupied(_) => Err(Error::AlreadyBound(unit)),
            Entry::Vacant(slot) => {
                slot.insert(context);
                tracing::debug!(%unit, "transaction context bound");
                Ok(())
            }
        }
    }

    /// The context bound to the calling execution unit, if any.
    pub fn current(&self) -> Option<SharedContext> {
        let unit = ExecutionUnitId::current()?;
        self.bindings.get(&unit).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the binding of the calling execution unit. No-op when nothing
    /// is bound.
    pub fn unbind(&self) -> Option<SharedContext> {
        ExecutionUnitId::current().and_then(|unit| self.unbind_unit(unit))
    }

    pub(crate) fn unbind_unit(&self, unit: ExecutionUnitId) -> Option<SharedContext> {
        let removed = self.bindings.remove(&unit).map(|(_, context)| context);
        if removed.is_some() {
            tracing::debug!(%unit, "transaction context unbound");
        }
        removed
    }

    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }

    /// Number of execution units that currently hold a binding.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_unit_outside_scope() {
        assert_eq!(ExecutionUnitId::current(), None);
        let registry = ResourceRegistry::new();
        assert!(registry.current().is_none());
        assert!(registry.unbind().is_none());
    }

    #[tokio::test]
    async fn scope_exposes_unit_to_nested_calls() {
        let unit = ExecutionUnitId::next();
        let seen = unit
            .scope(async { async { ExecutionUnitId::current() }.await })
            .await;
        assert_eq!(seen, Some(unit));
        assert_eq!(ExecutionUnitId::current(), None);
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_unit() {
        let unit = ExecutionUnitId::next();
        let inner = unit
            .scope(async {
                tokio::spawn(async { ExecutionUnitId::current() })
                    .await
                    .unwrap()
            })
            .await;
        assert_eq!(inner, None);
    }

    #[test]
    fn ids_are_unique() {
        let a = ExecutionUnitId::next();
        let b = ExecutionUnitId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("unit-"));
    }
}

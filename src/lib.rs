//! # sqlx-transaction-sync
//!
//! Transaction synchronization for SQLx: a unit of work runs in one database
//! transaction, and every repository call made inside it transparently reuses
//! the transaction's connection without receiving it as a parameter.
//!
//! ## Features
//!
//! - **Transparent Binding**: The active transaction is bound to the calling
//!   execution unit (a tokio task); repositories discover it on their own
//! - **Dual-Mode Repositories**: The same repository call runs inside a bound
//!   transaction, or on an ephemeral auto-commit connection when none is bound
//! - **Automatic Commit/Rollback**: `run_in_transaction` commits on success and
//!   rolls back on any error
//! - **Leak-Free Release**: The connection goes back to its source exactly once,
//!   on every exit path
//! - **Categorized Errors**: Vendor error codes are translated into a small
//!   taxonomy (`DuplicateKey`, `SyntaxOrSchema`, `Connectivity`, generic)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlx_transaction_sync::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = DataSourceConfig::new("mysql://localhost/test");
//! let source: Arc<dyn ConnectionSource> = Arc::new(PoolConnectionSource::connect(&config).await?);
//! let registry = Arc::new(ResourceRegistry::new());
//!
//! let repository = Arc::new(SqlMemberRepository::new(
//!     Arc::clone(&source),
//!     Arc::clone(&registry),
//!     ExceptionTranslator::for_url(&config.url),
//! ));
//! let coordinator = TransactionCoordinator::new(source, registry);
//! let service = TransferService::new(coordinator, repository.clone());
//!
//! // Standalone calls auto-commit on their own connection
//! repository.save(Member::new("memberA", 10000)).await?;
//! repository.save(Member::new("memberB", 10000)).await?;
//!
//! // Both updates commit together, or neither does
//! service.transfer("memberA", "memberB", 2000).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Running Your Own Unit of Work
//!
//! ```rust,no_run
//! use sqlx_transaction_sync::prelude::*;
//!
//! # async fn example(
//! #     coordinator: &TransactionCoordinator,
//! #     repository: &dyn MemberRepository,
//! # ) -> Result<()> {
//! let result = coordinator
//!     .run_in_transaction(|| async {
//!         repository.save(Member::new("memberC", 500)).await?;
//!
//!         // This will cause a rollback; memberC is never committed
//!         Err::<(), _>(Error::BusinessRule("changed my mind".into()))
//!     })
//!     .await;
//!
//! assert!(result.is_err());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Repository failures are translated once, at the repository boundary.
//! Callers branch on the category rather than on vendor codes:
//!
//! ```rust,no_run
//! use sqlx_transaction_sync::prelude::*;
//!
//! # async fn example(repository: &dyn MemberRepository) -> Result<()> {
//! match repository.save(Member::new("memberA", 10000)).await {
//!     Ok(_) => {}
//!     Err(e) if e.is_retryable() => {
//!         // DuplicateKey: pick another id and try again
//!     }
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **TransactionCoordinator**: Acquires a connection, begins a transaction
//!    and binds a `TransactionContext` to the current execution unit
//! 2. **ResourceRegistry**: Maps execution units to their bound context
//! 3. **SqlMemberRepository**: Uses the bound connection if there is one,
//!    otherwise leases and releases its own
//! 4. **Cleanup**: Unbinding and releasing run from a drop guard, so no exit
//!    path can skip them
//!
//! ## Limitations
//!
//! - Transactions do not nest; a nested `run_in_transaction` on the same
//!   execution unit fails with `Error::AlreadyBound`
//! - Tasks spawned inside a unit of work do not see its transaction
//! - Statements use `?` placeholders (MySQL and SQLite)
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;
pub mod repository;
pub mod service;
pub mod source;
pub mod translator;

pub use config::DataSourceConfig;
pub use context::TransactionContext;
pub use error::{Error, ErrorCategory, Result};
pub use executor::TransactionCoordinator;
pub use registry::{ExecutionUnitId, ResourceRegistry, SharedContext};
pub use repository::{Member, MemberRepository, SqlMemberRepository};
pub use service::{SignupService, TransferService, REJECTED_MEMBER_ID};
pub use source::{ConnectionGuard, ConnectionHandle, ConnectionSource, PoolConnectionSource};
pub use translator::{ErrorCodes, ExceptionTranslator};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::config::DataSourceConfig;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::executor::TransactionCoordinator;
    pub use crate::registry::ResourceRegistry;
    pub use crate::repository::{Member, MemberRepository, SqlMemberRepository};
    pub use crate::service::{SignupService, TransferService};
    pub use crate::source::{ConnectionSource, PoolConnectionSource};
    pub use crate::translator::ExceptionTranslator;
}

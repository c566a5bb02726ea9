#![allow(dead_code)]

use async_trait::async_trait;
use sqlx_transaction_sync::prelude::*;
use sqlx_transaction_sync::ConnectionHandle;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const MEMBER_A: &str = "memberA";
pub const MEMBER_B: &str = "memberB";
pub const MEMBER_EX: &str = "ex";

const CREATE_MEMBER_TABLE: &str =
    "create table member (member_id varchar(10) primary key, money bigint not null default 0)";

/// Counts every handle that passes through the wrapped source.
pub struct CountingSource {
    inner: PoolConnectionSource,
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_release: AtomicBool,
}

impl CountingSource {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Makes every later release report a failure after the connection has
    /// actually been returned.
    pub fn fail_releases(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }

    pub fn pool(&self) -> &sqlx::AnyPool {
        self.inner.pool()
    }
}

#[async_trait]
impl ConnectionSource for CountingSource {
    async fn acquire(&self) -> Result<ConnectionHandle> {
        let connection = self.inner.acquire().await?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(connection)
    }

    fn release(&self, connection: ConnectionHandle) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(connection)?;
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::Protocol(
                "release rejected by test source".into(),
            )));
        }
        Ok(())
    }
}

pub struct Fixture {
    pub source: Arc<CountingSource>,
    pub registry: Arc<ResourceRegistry>,
    pub repository: Arc<SqlMemberRepository>,
    pub coordinator: TransactionCoordinator,
    pub transfers: TransferService,
    pub signups: SignupService,
}

impl Fixture {
    pub async fn new() -> Self {
        let config = DataSourceConfig::default();
        let inner = PoolConnectionSource::connect(&config)
            .await
            .expect("in-memory database");
        sqlx::query(CREATE_MEMBER_TABLE)
            .execute(inner.pool())
            .await
            .expect("member table");

        let source = Arc::new(CountingSource {
            inner,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            fail_release: AtomicBool::new(false),
        });
        let registry = Arc::new(ResourceRegistry::new());
        let dyn_source: Arc<dyn ConnectionSource> = source.clone();

        let repository = Arc::new(SqlMemberRepository::new(
            Arc::clone(&dyn_source),
            Arc::clone(&registry),
            ExceptionTranslator::for_url(&config.url),
        ));
        let coordinator = TransactionCoordinator::new(dyn_source, Arc::clone(&registry));
        let transfers = TransferService::new(coordinator.clone(), repository.clone());
        let signups = SignupService::new(repository.clone());

        Self {
            source,
            registry,
            repository,
            coordinator,
            transfers,
            signups,
        }
    }

    pub async fn balance(&self, member_id: &str) -> i64 {
        self.repository
            .find_by_id(member_id)
            .await
            .expect("member exists")
            .balance
    }

    pub fn assert_no_leaks(&self) {
        assert_eq!(self.source.acquired(), self.source.released());
        assert!(self.registry.is_empty());
    }
}

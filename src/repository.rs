use crate::context::TransactionContext;
use crate::error::{Error, Result};
use crate::registry::ResourceRegistry;
use crate::source::{ConnectionGuard, ConnectionSource};
use crate::translator::ExceptionTranslator;
use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// A member account and its balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub balance: i64,
}

impl Member {
    pub fn new(id: impl Into<String>, balance: i64) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }
}

/// CRUD access to members. No operation takes a connection: implementations
/// decide per call whether a transaction is bound.
#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn save(&self, member: Member) -> Result<Member>;

    /// Fails with [`Error::NotFound`] when no member has `member_id`.
    async fn find_by_id(&self, member_id: &str) -> Result<Member>;

    async fn update(&self, member_id: &str, balance: i64) -> Result<()>;

    async fn delete(&self, member_id: &str) -> Result<()>;
}

const INSERT_MEMBER: &str = "insert into member(member_id, money) values (?, ?)";
const SELECT_MEMBER: &str = "select member_id, money from member where member_id = ?";
const UPDATE_MEMBER: &str = "update member set money = ? where member_id = ?";
const DELETE_MEMBER: &str = "delete from member where member_id = ?";

/// SQL implementation of [`MemberRepository`] over the `member` table.
///
/// Every call first consults the [`ResourceRegistry`]. When a transaction is
/// bound to the calling execution unit the statement runs on its connection
/// and the call neither commits, rolls back nor releases: the transaction
/// boundary belongs to whoever bound it. Otherwise the call leases an
/// ephemeral connection, runs in auto-commit mode and releases it before
/// returning.
pub struct SqlMemberRepository {
    source: Arc<dyn ConnectionSource>,
    registry: Arc<ResourceRegistry>,
    translator: ExceptionTranslator,
}

impl SqlMemberRepository {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        registry: Arc<ResourceRegistry>,
        translator: ExceptionTranslator,
    ) -> Self {
        Self {
            source,
            registry,
            translator,
        }
    }

    async fn connection(&self) -> Result<Lease<'_>> {
        match self.registry.current() {
            Some(context) => Ok(Lease::Bound(context.lock_owned().await)),
            None => Ok(Lease::Ephemeral(
                ConnectionGuard::acquire(self.source.as_ref()).await?,
            )),
        }
    }

    fn translate(
        &self,
        task: &'static str,
        sql: &'static str,
    ) -> impl FnOnce(sqlx::Error) -> Error + '_ {
        move |err| self.translator.translate(task, sql, err)
    }
}

/// Connection used by a single repository call.
enum Lease<'a> {
    Bound(OwnedMutexGuard<TransactionContext>),
    Ephemeral(ConnectionGuard<'a>),
}

impl Lease<'_> {
    fn as_executor(&mut self) -> Result<&mut AnyConnection> {
        match self {
            Lease::Bound(context) => context.as_executor(),
            Lease::Ephemeral(guard) => guard.as_executor(),
        }
    }
}

fn member_from_row(row: &AnyRow) -> std::result::Result<Member, sqlx::Error> {
    Ok(Member {
        id: row.try_get("member_id")?,
        balance: row.try_get("money")?,
    })
}

#[async_trait]
impl MemberRepository for SqlMemberRepository {
    async fn save(&self, member: Member) -> Result<Member> {
        let mut lease = self.connection().await?;
        sqlx::query(INSERT_MEMBER)
            .bind(member.id.clone())
            .bind(member.balance)
            .execute(lease.as_executor()?)
            .await
            .map_err(self.translate("save", INSERT_MEMBER))?;
        Ok(member)
    }

    async fn find_by_id(&self, member_id: &str) -> Result<Member> {
        let mut lease = self.connection().await?;
        let row = sqlx::query(SELECT_MEMBER)
            .bind(member_id.to_owned())
            .fetch_optional(lease.as_executor()?)
            .await
            .map_err(self.translate("findById", SELECT_MEMBER))?;

        match row {
            Some(row) => member_from_row(&row).map_err(self.translate("findById", SELECT_MEMBER)),
            None => Err(Error::NotFound {
                member_id: member_id.to_owned(),
            }),
        }
    }

    async fn update(&self, member_id: &str, balance: i64) -> Result<()> {
        let mut lease = self.connection().await?;
        let result = sqlx::query(UPDATE_MEMBER)
            .bind(balance)
            .bind(member_id.to_owned())
            .execute(lease.as_executor()?)
            .await
            .map_err(self.translate("update", UPDATE_MEMBER))?;
        tracing::info!(member_id, rows = result.rows_affected(), "member updated");
        Ok(())
    }

    async fn delete(&self, member_id: &str) -> Result<()> {
        let mut lease = self.connection().await?;
        let result = sqlx::query(DELETE_MEMBER)
            .bind(member_id.to_owned())
            .execute(lease.as_executor()?)
            .await
            .map_err(self.translate("delete", DELETE_MEMBER))?;
        tracing::info!(member_id, rows = result.rows_affected(), "member deleted");
        Ok(())
    }
}

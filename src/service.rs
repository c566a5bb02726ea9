use crate::error::{Error, Result};
use crate::executor::TransactionCoordinator;
use crate::repository::{Member, MemberRepository};
use rand::Rng;
use std::sync::Arc;

/// Recipient id whose transfers are rejected half-way, after the debit has
/// already been written.
pub const REJECTED_MEMBER_ID: &str = "ex";

/// Moves money between two members in one transaction.
pub struct TransferService {
    coordinator: TransactionCoordinator,
    repository: Arc<dyn MemberRepository>,
}

impl TransferService {
    pub fn new(coordinator: TransactionCoordinator, repository: Arc<dyn MemberRepository>) -> Self {
        Self {
            coordinator,
            repository,
        }
    }

    /// Debits `from_id` and credits `to_id` by `amount`.
    ///
    /// Either both balances change or neither does: a missing member, the
    /// rejected recipient or any data-access failure rolls the debit back.
    pub async fn transfer(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        tracing::info!(from_id, to_id, amount, "transfer started");
        let result = self
            .coordinator
            .run_in_transaction(|| self.move_balance(from_id, to_id, amount))
            .await;
        match &result {
            Ok(()) => tracing::info!(from_id, to_id, amount, "transfer committed"),
            Err(e) => tracing::info!(from_id, to_id, amount, "transfer rolled back: {}", e),
        }
        result
    }

    async fn move_balance(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        let from = self.repository.find_by_id(from_id).await?;
        let to = self.repository.find_by_id(to_id).await?;

        let debited = from
            .balance
            .checked_sub(amount)
            .ok_or_else(|| overflow(&from, amount))?;
        self.repository.update(from_id, debited).await?;
        validate(&to)?;
        let credited = to
            .balance
            .checked_add(amount)
            .ok_or_else(|| overflow(&to, amount))?;
        self.repository.update(to_id, credited).await?;
        Ok(())
    }
}

fn overflow(member: &Member, amount: i64) -> Error {
    Error::BusinessRule(format!(
        "moving {} overflows the balance of member {}",
        amount, member.id
    ))
}

fn validate(to: &Member) -> Result<()> {
    if to.id == REJECTED_MEMBER_ID {
        return Err(Error::BusinessRule(format!(
            "transfer to member {} is not allowed",
            to.id
        )));
    }
    Ok(())
}

/// Registers members, recovering once from a key collision.
pub struct SignupService {
    repository: Arc<dyn MemberRepository>,
}

impl SignupService {
    pub fn new(repository: Arc<dyn MemberRepository>) -> Self {
        Self { repository }
    }

    /// Saves a new member. If `member_id` is taken the member is saved once
    /// more under a regenerated id; a second failure is returned as is.
    pub async fn join(&self, member_id: &str, balance: i64) -> Result<Member> {
        match self.repository.save(Member::new(member_id, balance)).await {
            Err(e) if e.is_retryable() => {
                let retry_id = regenerate_id(member_id);
                tracing::info!(member_id, retry_id = %retry_id, "duplicate key, retrying with new id");
                self.repository.save(Member::new(retry_id, balance)).await
            }
            result => result,
        }
    }
}

fn regenerate_id(member_id: &str) -> String {
    format!("{}{}", member_id, rand::thread_rng().gen_range(0..10000))
}

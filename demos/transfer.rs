use sqlx_transaction_sync::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Falls back to an in-memory SQLite database when DATABASE_URL is unset
    let config = DataSourceConfig::from_env()?;
    let pool_source = PoolConnectionSource::connect(&config).await?;
    sqlx::query(
        "create table if not exists member (member_id varchar(10) primary key, money bigint not null default 0)",
    )
    .execute(pool_source.pool())
    .await?;

    let source: Arc<dyn ConnectionSource> = Arc::new(pool_source);
    let registry = Arc::new(ResourceRegistry::new());
    let repository = Arc::new(SqlMemberRepository::new(
        Arc::clone(&source),
        Arc::clone(&registry),
        ExceptionTranslator::for_url(&config.url),
    ));
    let service = TransferService::new(
        TransactionCoordinator::new(source, registry),
        repository.clone(),
    );

    println!("=== Transfer Example ===\n");

    for id in ["memberA", "memberB", "ex"] {
        repository.delete(id).await?;
        repository.save(Member::new(id, 10000)).await?;
    }

    // Example 1: both updates commit together
    println!("1. Transferring 2000 from memberA to memberB...");
    service.transfer("memberA", "memberB", 2000).await?;
    println!(
        "   ✓ memberA={}, memberB={}\n",
        repository.find_by_id("memberA").await?.balance,
        repository.find_by_id("memberB").await?.balance
    );

    // Example 2: the recipient is rejected after the debit, so it rolls back
    println!("2. Transferring 2000 from memberA to ex...");
    match service.transfer("memberA", "ex", 2000).await {
        Ok(()) => println!("   ✗ Should have failed!"),
        Err(e) => println!("   ✓ Transaction rolled back: {}", e),
    }
    println!(
        "   memberA={}, ex={}\n",
        repository.find_by_id("memberA").await?.balance,
        repository.find_by_id("ex").await?.balance
    );

    // Example 3: a missing member is reported as such
    println!("3. Looking up an unknown member...");
    match repository.find_by_id("nobody").await {
        Err(Error::NotFound { member_id }) => println!("   ✓ Not found: {}\n", member_id),
        other => println!("   ✗ Unexpected: {:?}\n", other),
    }

    println!("=== All examples completed ===");
    Ok(())
}

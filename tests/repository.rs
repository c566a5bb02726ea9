mod common;

use common::{Fixture, MEMBER_A};
use sqlx_transaction_sync::prelude::*;

#[tokio::test]
async fn crud() {
    let fx = Fixture::new().await;

    let saved = fx.repository.save(Member::new(MEMBER_A, 10000)).await.unwrap();
    assert_eq!(saved, Member::new(MEMBER_A, 10000));
    assert_eq!(fx.repository.find_by_id(MEMBER_A).await.unwrap(), saved);

    fx.repository.update(MEMBER_A, 20000).await.unwrap();
    assert_eq!(fx.balance(MEMBER_A).await, 20000);

    fx.repository.delete(MEMBER_A).await.unwrap();
    let err = fx.repository.find_by_id(MEMBER_A).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    fx.assert_no_leaks();
}

#[tokio::test]
async fn missing_member_is_not_found_rather_than_generic() {
    let fx = Fixture::new().await;

    let err = fx.repository.find_by_id("nobody").await.unwrap_err();

    assert!(matches!(err, Error::NotFound { ref member_id } if member_id == "nobody"));
    assert_eq!(err.category(), None);
    fx.assert_no_leaks();
}

#[tokio::test]
async fn update_and_delete_of_missing_member_succeed() {
    let fx = Fixture::new().await;

    fx.repository.update("nobody", 1).await.unwrap();
    fx.repository.delete("nobody").await.unwrap();
    fx.assert_no_leaks();
}

#[tokio::test]
async fn saving_same_id_twice_is_duplicate_key() {
    let fx = Fixture::new().await;
    fx.repository.save(Member::new("myId", 10000)).await.unwrap();

    let err = fx.repository.save(Member::new("myId", 10000)).await.unwrap_err();

    assert!(matches!(err, Error::DuplicateKey(_)), "{err:?}");
    assert!(err.is_retryable());
    fx.assert_no_leaks();
}

#[tokio::test]
async fn join_retries_duplicate_once_with_new_id() {
    let fx = Fixture::new().await;

    let first = fx.signups.join("myId", 10000).await.unwrap();
    let second = fx.signups.join("myId", 10000).await.unwrap();

    assert_eq!(first.id, "myId");
    assert_ne!(second.id, "myId");
    assert!(second.id.starts_with("myId"));
    assert_eq!(fx.balance(&second.id).await, 10000);

    let rows: i64 = sqlx::query_scalar("select count(*) from member")
        .fetch_one(fx.source.pool())
        .await
        .unwrap();
    assert_eq!(rows, 2);
    fx.assert_no_leaks();
}

#[tokio::test]
async fn schema_mismatch_is_categorized() {
    let fx = Fixture::new().await;
    sqlx::query("drop table member")
        .execute(fx.source.pool())
        .await
        .unwrap();

    let err = fx.repository.save(Member::new(MEMBER_A, 10000)).await.unwrap_err();

    assert_eq!(err.category(), Some(ErrorCategory::SyntaxOrSchema), "{err:?}");
    assert!(!err.is_retryable());
    fx.assert_no_leaks();
}

#[tokio::test]
async fn closed_pool_is_a_connectivity_failure() {
    let fx = Fixture::new().await;
    fx.source.pool().close().await;

    let err = fx.repository.find_by_id(MEMBER_A).await.unwrap_err();

    assert!(matches!(err, Error::Connectivity(_)), "{err:?}");
    assert_eq!(fx.source.acquired(), 0);
    fx.assert_no_leaks();
}

#[tokio::test]
async fn bad_grammar_is_categorized() {
    let fx = Fixture::new().await;
    let translator = ExceptionTranslator::for_url("sqlite::memory:");

    let raw = sqlx::query("select bad grammar")
        .execute(fx.source.pool())
        .await
        .unwrap_err();

    assert_eq!(translator.categorize(&raw), ErrorCategory::SyntaxOrSchema);
}

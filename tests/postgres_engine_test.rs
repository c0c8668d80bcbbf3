//! Postgres storage engine tests
//!
//! These need Docker (or `TEST_DATABASE_URL`), so they are ignored by default:
//! `cargo test --test postgres_engine_test -- --ignored`

mod helpers;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use serial_test::serial;

use helpers::*;
use RosterDesk::database::engine::{
    FailureReason, IndexEntry, ItemKey, QueryRequest, QueryTarget, StorageEngine, StoredItem, WriteOp,
};
use RosterDesk::utils::errors::StorageError;
use RosterDesk::RegistrationError;

fn item(pk: &str, sk: &str, version: i64) -> StoredItem {
    StoredItem { key: ItemKey::new(pk, sk), version, body: json!({ "sk": sk, "version": version }), index: None }
}

async fn database() -> TestDatabase {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    db.cleanup().await.expect("Failed to clean test database");
    db
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres container"]
async fn test_conditional_writes() {
    let db = database().await;
    let engine = db.engine();

    engine.put_if_absent(item("EVENT#1", "METADATA", 1)).await.unwrap();
    assert_matches!(
        engine.put_if_absent(item("EVENT#1", "METADATA", 1)).await,
        Err(StorageError::AlreadyExists { .. })
    );

    engine.put_if_version(item("EVENT#1", "METADATA", 2), 1).await.unwrap();
    assert_matches!(
        engine.put_if_version(item("EVENT#1", "METADATA", 3), 1).await,
        Err(StorageError::VersionMismatch { expected: 1, actual: 2, .. })
    );
    assert_matches!(
        engine.put_if_version(item("EVENT#9", "METADATA", 2), 1).await,
        Err(StorageError::DoesNotExist { .. })
    );

    let stored = engine.get(&ItemKey::new("EVENT#1", "METADATA")).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.body["version"], 2);
    assert_matches!(
        engine.get(&ItemKey::new("EVENT#1", "missing")).await,
        Err(StorageError::NotFound { .. })
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres container"]
async fn test_transaction_is_all_or_nothing() {
    let db = database().await;
    let engine = db.engine();
    engine.put_if_absent(item("EVENT#1", "METADATA", 1)).await.unwrap();
    engine.put_if_absent(item("EVENT#1", "REGISTRATION#b@example.com", 1)).await.unwrap();

    let result = engine
        .transact_write(vec![
            WriteOp::insert(item("EVENT#1", "REGISTRATION#a@example.com", 1)),
            WriteOp::insert(item("EVENT#1", "REGISTRATION#b@example.com", 1)),
            WriteOp::replace(item("EVENT#1", "METADATA", 3), 2),
        ])
        .await;

    let failures = match result {
        Err(StorageError::TransactionCanceled { failures }) => failures,
        other => panic!("expected a canceled transaction, got {other:?}"),
    };
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].index, 1);
    assert_eq!(failures[0].reason, FailureReason::AlreadyExists);
    assert_eq!(failures[1].reason, FailureReason::VersionMismatch { expected: 2, actual: 1 });

    // The first insert was rolled back with the rest
    assert_matches!(
        engine.get(&ItemKey::new("EVENT#1", "REGISTRATION#a@example.com")).await,
        Err(StorageError::NotFound { .. })
    );
    assert_eq!(db.item_count().await.unwrap(), 2);

    engine
        .transact_write(vec![
            WriteOp::insert(item("EVENT#1", "REGISTRATION#a@example.com", 1)),
            WriteOp::delete_versioned(ItemKey::new("EVENT#1", "REGISTRATION#b@example.com"), 1),
            WriteOp::replace(item("EVENT#1", "METADATA", 2), 1),
        ])
        .await
        .expect("Transaction should commit");
    assert_eq!(db.item_count().await.unwrap(), 2);
    assert_eq!(engine.get(&ItemKey::new("EVENT#1", "METADATA")).await.unwrap().version, 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres container"]
async fn test_index_query_pages_in_order() {
    let db = database().await;
    let engine = db.engine();

    for (i, sort) in ["2030-03", "2030-01", "2030-02", "2030-01"].iter().enumerate() {
        engine
            .put_if_absent(StoredItem {
                key: ItemKey::new(format!("EVENT#{i}"), "METADATA"),
                version: 1,
                body: json!({ "i": i }),
                index: Some(IndexEntry::new("EVENTS", *sort)),
            })
            .await
            .unwrap();
    }

    let target = QueryTarget::Index { partition: "EVENTS".to_string() };
    let first = engine.query(QueryRequest::new(target.clone(), 3, None)).await.unwrap();
    assert!(first.has_more);
    let second = engine
        .query(QueryRequest::new(target.clone(), 3, first.next_cursor.clone()))
        .await
        .unwrap();
    assert!(!second.has_more);

    let order: Vec<_> = first.items.iter().chain(second.items.iter()).map(|i| i.key.pk.clone()).collect();
    assert_eq!(order, vec!["EVENT#1", "EVENT#3", "EVENT#2", "EVENT#0"]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres container"]
async fn test_registration_workflow_on_postgres() {
    let db = database().await;
    let ctx = TestContext::with_engine(Arc::new(db.engine()));
    let event = ctx.create_event(paid_options(0, 9000)).await;

    ctx.service
        .attempt_registration(individual_request(event.id, "ana@example.com"))
        .await
        .unwrap();
    assert_matches!(
        ctx.service.attempt_registration(individual_request(event.id, "ANA@example.com")).await,
        Err(RegistrationError::RegistrationAlreadyExists { .. })
    );

    let pending = ctx
        .service
        .register_with_payment(team_request(event.id, "captain@example.com", 3))
        .await
        .unwrap();
    assert_matches!(
        ctx.service.confirm_registration_payment(&ctx.expired_webhook(&pending), signature()).await,
        Err(RegistrationError::RegistrationExpired { .. })
    );

    let stored = ctx.event(event.id).await;
    assert_eq!(stored.num_teams, 0);
    assert_eq!(stored.num_total_players, 1);
    assert_eq!(stored.version, event.version + 3);

    let page = ctx.service.list_registrations(event.id, 10, None).await.unwrap();
    assert_eq!(page.items.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Postgres container"]
async fn test_concurrent_registrations_on_postgres() {
    let db = database().await;
    let ctx = TestContext::with_engine(Arc::new(db.engine()));
    let event = ctx.create_event(free_options()).await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let service = ctx.service.clone();
            let request = individual_request(event.id, "same@example.com");
            tokio::spawn(async move { service.attempt_registration(request).await })
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        if attempt.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(ctx.event(event.id).await.num_total_players, 1);
}

//! Integration tests for the PostgreSQL billing store
//!
//! These start a PostgreSQL container and are ignored by default:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{AdvisorId, PortError};
use domain_billing::{BillingStore, BillingTransaction, LedgerService, OVERFLOW_PAYMENT_CHOICE};
use infra_db::PostgresBillingStore;
use test_utils::{
    create_isolated_test_database, fetch_advisor_ids, fetch_clients, get_shared_test_database,
    seed_advisor, seed_association, seed_client, EmailFixtures, SeedClient,
};

fn jan() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, 1)
}

fn feb() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 2, 1)
}

async fn pool() -> sqlx::PgPool {
    get_shared_test_database().await.connect().await.unwrap()
}

async fn ledger() -> (sqlx::PgPool, LedgerService) {
    let pool = pool().await;
    let store = PostgresBillingStore::new(pool.clone()).with_lock_timeout(Duration::from_secs(2));
    (pool, LedgerService::new(Arc::new(store)))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_payment_fills_oldest_then_creates_overflow() {
    let (pool, ledger) = ledger().await;
    let email = EmailFixtures::unique_payer();
    let first = seed_client(&pool, &SeedClient::obligation(&email, dec!(100), dec!(40), jan()))
        .await
        .unwrap();
    let second = seed_client(&pool, &SeedClient::obligation(&email, dec!(50), dec!(0), feb()))
        .await
        .unwrap();
    let advisor = seed_advisor(&pool, "Margaret Hamilton").await.unwrap();
    seed_association(&pool, second, advisor).await.unwrap();

    let outcome = ledger.apply_payment(&email, dec!(125.50)).await.unwrap();

    let rows = fetch_clients(&pool, &email).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, first.get());
    assert_eq!(rows[0].total_payment_amount_received, dec!(100));
    assert_eq!(rows[1].total_payment_amount_received, dec!(50));

    let bucket = &rows[2];
    assert_eq!(bucket.payment_choice.as_deref(), Some(OVERFLOW_PAYMENT_CHOICE));
    assert_eq!(bucket.total_payment_amount_received, dec!(15.50));
    assert_eq!(bucket.total_billing_amount, Decimal::ZERO);
    assert!(bucket.payment_start_date.is_none());
    assert_eq!(
        fetch_advisor_ids(&pool, outcome.overflow.unwrap().record_id()).await.unwrap(),
        vec![advisor]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_payment_without_records_creates_placeholder_overflow() {
    let (pool, ledger) = ledger().await;
    let email = EmailFixtures::unique_payer();

    ledger.apply_payment(&email, dec!(10)).await.unwrap();
    ledger.apply_payment(&email, dec!(5)).await.unwrap();

    let rows = fetch_clients(&pool, &email).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].client_name_first.as_deref(), Some("Unknown"));
    assert_eq!(rows[0].total_payment_amount_received, dec!(15));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_refund_deletes_overflow_and_associations() {
    let (pool, ledger) = ledger().await;
    let email = EmailFixtures::unique_payer();
    let obligation =
        seed_client(&pool, &SeedClient::obligation(&email, dec!(100), dec!(100), jan()))
            .await
            .unwrap();
    let bucket = seed_client(&pool, &SeedClient::overflow(&email, dec!(30))).await.unwrap();
    let advisor = seed_advisor(&pool, "Katherine Johnson").await.unwrap();
    seed_association(&pool, bucket, advisor).await.unwrap();

    let outcome = ledger.apply_refund(&email, dec!(45)).await.unwrap();

    assert!(!outcome.exceeds_received());
    let rows = fetch_clients(&pool, &email).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, obligation.get());
    assert_eq!(rows[0].total_payment_amount_received, dec!(85));
    assert!(fetch_advisor_ids(&pool, bucket).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_refund_exceeding_total_is_reported() {
    let (pool, ledger) = ledger().await;
    let email = EmailFixtures::unique_payer();
    seed_client(&pool, &SeedClient::obligation(&email, dec!(100), dec!(20), jan())).await.unwrap();

    let outcome = ledger.apply_refund(&email, dec!(50)).await.unwrap();

    assert_eq!(outcome.unrefunded, dec!(30));
    let rows = fetch_clients(&pool, &email).await.unwrap();
    assert_eq!(rows[0].total_payment_amount_received, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_payments_serialize_per_identity() {
    let (pool, ledger) = ledger().await;
    let email = EmailFixtures::unique_payer();
    seed_client(&pool, &SeedClient::obligation(&email, dec!(30), dec!(0), jan())).await.unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let ledger = ledger.clone();
            let email = email.clone();
            tokio::spawn(async move { ledger.apply_payment(&email, dec!(10)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let rows = fetch_clients(&pool, &email).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].total_payment_amount_received, dec!(30));
    assert_eq!(rows[1].total_payment_amount_received, dec!(30));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_held_identity_lock_times_out() {
    let store =
        PostgresBillingStore::new(pool().await).with_lock_timeout(Duration::from_millis(200));
    let email = EmailFixtures::unique_payer();

    let held = store.begin(&email).await.unwrap();
    let blocked = store.begin(&email).await;
    held.rollback().await.unwrap();

    assert!(matches!(blocked, Err(PortError::Timeout { .. })));
    assert!(store.begin(&EmailFixtures::unique_payer()).await.is_ok());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_second_overflow_insert_violates_unique_index() {
    let pool = pool().await;
    let email = EmailFixtures::unique_payer();
    seed_client(&pool, &SeedClient::overflow(&email, dec!(1))).await.unwrap();

    let duplicate = seed_client(&pool, &SeedClient::overflow(&email, dec!(2))).await;

    let error = infra_db::DatabaseError::from(duplicate.unwrap_err());
    assert!(matches!(error, infra_db::DatabaseError::DuplicateEntry(_)));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rollback_discards_changes() {
    let pool = pool().await;
    let store = PostgresBillingStore::new(pool.clone());
    let email = EmailFixtures::unique_payer();
    let id = seed_client(&pool, &SeedClient::obligation(&email, dec!(100), dec!(0), jan()))
        .await
        .unwrap();
    let advisor = seed_advisor(&pool, "Dorothy Vaughan").await.unwrap();

    let mut tx = store.begin(&email).await.unwrap();
    tx.adjust_received(id, dec!(60)).await.unwrap();
    tx.add_advisor(id, AdvisorId::new(advisor)).await.unwrap();
    tx.rollback().await.unwrap();

    let rows = fetch_clients(&pool, &email).await.unwrap();
    assert_eq!(rows[0].total_payment_amount_received, Decimal::ZERO);
    assert!(fetch_advisor_ids(&pool, id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cleared_database_restarts_the_ledger() {
    let db = create_isolated_test_database().await.unwrap();
    let ledger = LedgerService::new(Arc::new(PostgresBillingStore::new(db.pool().clone())));
    let email = EmailFixtures::payer();
    let seed = SeedClient::obligation(&email, dec!(100), dec!(0), jan());
    let id = seed_client(db.pool(), &seed).await.unwrap();
    let advisor = seed_advisor(db.pool(), "Mary Jackson").await.unwrap();
    seed_association(db.pool(), id, advisor).await.unwrap();
    ledger.apply_payment(&email, dec!(120)).await.unwrap();
    assert_eq!(fetch_clients(db.pool(), &email).await.unwrap().len(), 2);

    db.clear_data().await.unwrap();

    assert!(fetch_clients(db.pool(), &email).await.unwrap().is_empty());
    assert!(fetch_advisor_ids(db.pool(), id).await.unwrap().is_empty());
    let reseeded = seed_client(db.pool(), &seed).await.unwrap();
    assert_eq!(reseeded.get(), 1);

    let outcome = ledger.apply_payment(&email, dec!(130)).await.unwrap();
    let bucket = outcome.overflow.unwrap().record_id();
    assert_eq!(bucket.get(), 2);
    assert!(fetch_advisor_ids(db.pool(), bucket).await.unwrap().is_empty());
}

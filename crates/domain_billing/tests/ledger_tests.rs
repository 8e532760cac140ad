//! Comprehensive tests for domain_billing

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{AdvisorId, ClientRecordId, Email};

use domain_billing::ports::mock::MockBillingStore;
use domain_billing::{
    plan_allocation, plan_refund, BillingError, LedgerEntry, LedgerOutcome, LedgerService,
    ObligationRecord, OverflowDeposit, RefundStep, PLACEHOLDER_NAME,
};
use test_utils::{AmountFixtures, EmailFixtures, ObligationRecordBuilder, RecordFixtures};

fn email() -> Email {
    EmailFixtures::payer()
}

/// A "Grace Hopper" obligation starting on the first of `start`'s month
fn obligation(
    id: i32,
    start: Option<(i32, u32)>,
    billing: Decimal,
    received: Decimal,
) -> ObligationRecord {
    let builder = ObligationRecordBuilder::new(id)
        .with_names("Grace", "Hopper")
        .with_billing(billing)
        .with_received(received);
    match start {
        Some((year, month)) => builder.starting(year, month, 1),
        None => builder.undated(),
    }
    .build()
}

fn overflow(id: i32, received: Decimal) -> ObligationRecord {
    ObligationRecordBuilder::overflow(id)
        .with_names("Grace", "Hopper")
        .with_received(received)
        .build()
}

async fn ledger_with(records: Vec<ObligationRecord>) -> (Arc<MockBillingStore>, LedgerService) {
    let store = Arc::new(MockBillingStore::with_records(records).await);
    let ledger = LedgerService::new(store.clone());
    (store, ledger)
}

async fn received(store: &MockBillingStore, id: i32) -> Decimal {
    store
        .record(ClientRecordId::new(id))
        .await
        .map(|r| r.total_payment_amount_received)
        .unwrap_or_else(|| panic!("record {} missing", id))
}

// ============================================================================
// Credit Allocation Tests
// ============================================================================

mod credit_tests {
    use super::*;

    #[tokio::test]
    async fn test_fills_oldest_obligation_first() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(0)),
            obligation(2, Some((2024, 2)), dec!(50), dec!(0)),
        ])
        .await;

        let outcome = ledger.apply_payment(&email(), dec!(120)).await.unwrap();

        assert_eq!(received(&store, 1).await, dec!(100));
        assert_eq!(received(&store, 2).await, dec!(20));
        assert!(outcome.overflow.is_none());
        assert!(store.overflow_records(&email()).await.is_empty());
    }

    #[tokio::test]
    async fn test_ordering_ignores_insertion_order() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 6)), dec!(100), dec!(0)),
            obligation(2, Some((2024, 3)), dec!(100), dec!(0)),
        ])
        .await;

        ledger.apply_payment(&email(), dec!(30)).await.unwrap();

        assert_eq!(received(&store, 1).await, dec!(0));
        assert_eq!(received(&store, 2).await, dec!(30));
    }

    #[tokio::test]
    async fn test_partially_paid_record_absorbs_only_its_remainder() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(70)),
            obligation(2, Some((2024, 2)), dec!(100), dec!(0)),
        ])
        .await;

        let outcome = ledger.apply_payment(&email(), dec!(50)).await.unwrap();

        assert_eq!(outcome.applied[0].delta, dec!(30));
        assert_eq!(outcome.applied[1].delta, dec!(20));
        assert_eq!(received(&store, 1).await, dec!(100));
        assert_eq!(received(&store, 2).await, dec!(20));
    }

    #[tokio::test]
    async fn test_no_record_exceeds_its_billing_amount() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(10), dec!(0)),
            obligation(2, Some((2024, 2)), dec!(20), dec!(5)),
            obligation(3, None, dec!(30), dec!(0)),
        ])
        .await;

        ledger.apply_payment(&email(), dec!(500)).await.unwrap();

        for record in store.records_for(&email()).await {
            if !record.is_overflow() {
                assert_eq!(record.total_payment_amount_received, record.total_billing_amount);
            }
        }
    }

    #[tokio::test]
    async fn test_one_and_a_half_bills_settle_the_older_month() {
        let (store, ledger) = ledger_with(vec![
            RecordFixtures::unpaid_monthly(2, 2),
            RecordFixtures::unpaid_monthly(1, 1),
        ])
        .await;

        let outcome = ledger
            .apply_payment(&email(), AmountFixtures::one_and_a_half_bills())
            .await
            .unwrap();

        assert_eq!(received(&store, 1).await, AmountFixtures::monthly_bill());
        assert_eq!(received(&store, 2).await, dec!(50));
        assert_eq!(outcome.applied[0].record_id, ClientRecordId::new(1));
        assert!(outcome.overflow.is_none());
    }

    #[tokio::test]
    async fn test_zero_credit_changes_nothing() {
        let (store, ledger) =
            ledger_with(vec![obligation(1, Some((2024, 1)), dec!(100), dec!(0))]).await;

        let outcome = ledger.apply_payment(&email(), Decimal::ZERO).await.unwrap();

        assert!(outcome.applied.is_empty());
        assert!(outcome.overflow.is_none());
        assert_eq!(received(&store, 1).await, dec!(0));
    }

    #[tokio::test]
    async fn test_other_identities_are_untouched() {
        let other = ObligationRecordBuilder::new(9)
            .with_email(EmailFixtures::other_payer())
            .starting(2020, 1, 1)
            .build();
        let (store, ledger) =
            ledger_with(vec![other, obligation(1, Some((2024, 1)), dec!(100), dec!(0))]).await;

        ledger.apply_payment(&email(), dec!(60)).await.unwrap();

        assert_eq!(received(&store, 9).await, dec!(0));
        assert_eq!(received(&store, 1).await, dec!(60));
    }
}

// ============================================================================
// Overflow Tests
// ============================================================================

mod overflow_tests {
    use super::*;

    #[tokio::test]
    async fn test_residual_creates_overflow_with_advisors() {
        let (store, ledger) =
            ledger_with(vec![obligation(1, Some((2024, 1)), dec!(100), dec!(90))]).await;
        store.associate(ClientRecordId::new(1), AdvisorId::new(10)).await;
        store.associate(ClientRecordId::new(1), AdvisorId::new(11)).await;

        let outcome = ledger.apply_payment(&email(), dec!(25)).await.unwrap();

        assert_eq!(received(&store, 1).await, dec!(100));
        let buckets = store.overflow_records(&email()).await;
        assert_eq!(buckets.len(), 1);
        let bucket = &buckets[0];
        assert_eq!(bucket.total_payment_amount_received, dec!(15));
        assert_eq!(bucket.total_billing_amount, Decimal::ZERO);
        assert_eq!(bucket.client_name_first.as_deref(), Some("Grace"));
        assert_eq!(bucket.client_name_last.as_deref(), Some("Hopper"));
        assert!(bucket.payment_start_date.is_none());

        let mut advisors = store.advisors_of(bucket.id).await;
        advisors.sort();
        assert_eq!(advisors, vec![AdvisorId::new(10), AdvisorId::new(11)]);

        match outcome.overflow {
            Some(OverflowDeposit::Created { record_id, amount, .. }) => {
                assert_eq!(record_id, bucket.id);
                assert_eq!(amount, dec!(15));
            }
            other => panic!("expected a new overflow record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_residual_augments_existing_overflow() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(100)),
            overflow(2, dec!(40)),
        ])
        .await;

        let outcome = ledger.apply_payment(&email(), dec!(10)).await.unwrap();

        assert_eq!(received(&store, 2).await, dec!(50));
        assert_eq!(store.overflow_records(&email()).await.len(), 1);
        assert!(matches!(outcome.overflow, Some(OverflowDeposit::Augmented { .. })));
    }

    #[tokio::test]
    async fn test_unknown_identity_gets_placeholder_overflow() {
        let (store, ledger) = ledger_with(Vec::new()).await;

        let outcome = ledger.apply_payment(&email(), dec!(42.50)).await.unwrap();

        let buckets = store.overflow_records(&email()).await;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].client_name_first.as_deref(), Some(PLACEHOLDER_NAME));
        assert_eq!(buckets[0].client_name_last.as_deref(), Some(PLACEHOLDER_NAME));
        assert_eq!(buckets[0].total_payment_amount_received, dec!(42.50));
        assert!(store.advisors_of(buckets[0].id).await.is_empty());
        assert_eq!(outcome.total_credited(), dec!(42.50));
    }

    #[tokio::test]
    async fn test_repeated_overpayments_keep_single_bucket() {
        let (store, ledger) =
            ledger_with(vec![obligation(1, Some((2024, 1)), dec!(10), dec!(10))]).await;

        for _ in 0..3 {
            ledger.apply_payment(&email(), dec!(5)).await.unwrap();
        }

        let buckets = store.overflow_records(&email()).await;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_payment_amount_received, dec!(15));
    }

    #[tokio::test]
    async fn test_concurrent_overpayments_create_one_bucket() {
        let (store, ledger) = ledger_with(Vec::new()).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.apply_payment(&email(), dec!(1.25)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let buckets = store.overflow_records(&email()).await;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_payment_amount_received, dec!(10.00));
    }
}

// ============================================================================
// Refund Tests
// ============================================================================

mod refund_tests {
    use super::*;

    #[tokio::test]
    async fn test_refund_drains_overflow_first() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(100)),
            overflow(2, dec!(40)),
        ])
        .await;
        store.associate(ClientRecordId::new(2), AdvisorId::new(10)).await;

        let outcome = ledger.apply_refund(&email(), dec!(40)).await.unwrap();

        assert!(store.record(ClientRecordId::new(2)).await.is_none());
        assert!(store.advisors_of(ClientRecordId::new(2)).await.is_empty());
        assert_eq!(received(&store, 1).await, dec!(100));
        assert!(!outcome.exceeds_received());
    }

    #[tokio::test]
    async fn test_partial_refund_keeps_overflow() {
        let (store, ledger) = ledger_with(vec![overflow(2, dec!(40))]).await;

        ledger
            .apply_refund(&email(), AmountFixtures::small_refund())
            .await
            .unwrap();

        assert_eq!(received(&store, 2).await, dec!(15));
    }

    #[tokio::test]
    async fn test_copied_advisors_leave_with_the_overflow_record() {
        let (store, ledger) =
            ledger_with(vec![obligation(1, Some((2024, 1)), dec!(100), dec!(100))]).await;
        store.associate(ClientRecordId::new(1), AdvisorId::new(7)).await;
        store.associate(ClientRecordId::new(1), AdvisorId::new(8)).await;

        let payment = ledger.apply_payment(&email(), dec!(10)).await.unwrap();
        let bucket = match payment.overflow {
            Some(OverflowDeposit::Created { record_id, .. }) => record_id,
            other => panic!("expected a new overflow record, got {:?}", other),
        };
        let mut copied = store.advisors_of(bucket).await;
        copied.sort();
        assert_eq!(copied, vec![AdvisorId::new(7), AdvisorId::new(8)]);
        assert_eq!(store.association_count().await, 4);

        let refund = ledger.apply_refund(&email(), dec!(10)).await.unwrap();

        assert_eq!(
            refund.steps,
            vec![RefundStep::Delete {
                record_id: bucket,
                released: dec!(10),
            }]
        );
        assert!(store.record(bucket).await.is_none());
        assert!(store.advisors_of(bucket).await.is_empty());
        let mut kept = store.advisors_of(ClientRecordId::new(1)).await;
        kept.sort();
        assert_eq!(kept, vec![AdvisorId::new(7), AdvisorId::new(8)]);
        assert_eq!(store.association_count().await, 2);
        assert_eq!(received(&store, 1).await, dec!(100));
    }

    #[tokio::test]
    async fn test_refund_spills_into_obligations_most_recent_first() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(100)),
            obligation(2, Some((2024, 2)), dec!(50), dec!(50)),
            overflow(3, dec!(20)),
        ])
        .await;
        store.associate(ClientRecordId::new(1), AdvisorId::new(10)).await;

        let outcome = ledger.apply_refund(&email(), dec!(90)).await.unwrap();

        assert!(store.record(ClientRecordId::new(3)).await.is_none());
        assert_eq!(received(&store, 2).await, dec!(0));
        assert_eq!(received(&store, 1).await, dec!(80));
        assert!(store.record(ClientRecordId::new(2)).await.is_some());
        assert_eq!(
            store.advisors_of(ClientRecordId::new(1)).await,
            vec![AdvisorId::new(10)]
        );
        assert_eq!(outcome.total_reversed(), dec!(90));
        assert!(matches!(outcome.steps[0], RefundStep::Delete { .. }));
    }

    #[tokio::test]
    async fn test_refund_exceeding_total_zeroes_everything_and_reports() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(30)),
            overflow(2, dec!(10)),
        ])
        .await;

        let outcome = ledger.apply_refund(&email(), dec!(100)).await.unwrap();

        assert!(outcome.exceeds_received());
        assert_eq!(outcome.unrefunded, dec!(60));
        assert_eq!(received(&store, 1).await, dec!(0));
        assert!(store.overflow_records(&email()).await.is_empty());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_refund_for_unknown_identity_reports_whole_amount() {
        let (store, ledger) = ledger_with(Vec::new()).await;

        let outcome = ledger.apply_refund(&email(), dec!(12)).await.unwrap();

        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.unrefunded, dec!(12));
        assert!(store.records_for(&email()).await.is_empty());
    }

    #[tokio::test]
    async fn test_credit_then_refund_restores_balances() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(0)),
            obligation(2, Some((2024, 2)), dec!(100), dec!(0)),
        ])
        .await;

        ledger.apply_payment(&email(), dec!(250)).await.unwrap();
        ledger.apply_refund(&email(), dec!(250)).await.unwrap();

        assert_eq!(received(&store, 1).await, dec!(0));
        assert_eq!(received(&store, 2).await, dec!(0));
        assert!(store.overflow_records(&email()).await.is_empty());
        assert_eq!(store.association_count().await, 0);
    }

    #[tokio::test]
    async fn test_signed_refund_entry_routes_to_refund() {
        let (store, ledger) =
            ledger_with(vec![obligation(1, Some((2024, 1)), dec!(100), dec!(100))]).await;

        let entry = LedgerEntry::from_signed_amount(email(), dec!(-25)).unwrap();
        let outcome = ledger.apply(&entry).await.unwrap();

        assert!(matches!(outcome, LedgerOutcome::Refund(_)));
        assert_eq!(received(&store, 1).await, dec!(75));
    }
}

// ============================================================================
// Failure and Concurrency Tests
// ============================================================================

mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_store_failure_mid_refund_rolls_back() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(100), dec!(100)),
            overflow(2, dec!(20)),
        ])
        .await;
        store.associate(ClientRecordId::new(2), AdvisorId::new(10)).await;
        store.fail_after_writes(1);

        let result = ledger.apply_refund(&email(), dec!(50)).await;

        assert!(matches!(result, Err(BillingError::Store(_))));
        assert_eq!(received(&store, 2).await, dec!(20));
        assert_eq!(received(&store, 1).await, dec!(100));
        assert_eq!(
            store.advisors_of(ClientRecordId::new(2)).await,
            vec![AdvisorId::new(10)]
        );
    }

    #[tokio::test]
    async fn test_store_failure_during_overflow_creation_rolls_back() {
        let (store, ledger) =
            ledger_with(vec![obligation(1, Some((2024, 1)), dec!(10), dec!(0))]).await;
        store.associate(ClientRecordId::new(1), AdvisorId::new(10)).await;
        store.fail_after_writes(2);

        let result = ledger.apply_payment(&email(), dec!(15)).await;

        assert!(result.is_err());
        assert_eq!(received(&store, 1).await, dec!(0));
        assert!(store.overflow_records(&email()).await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_timeout_is_transient() {
        let store = Arc::new(MockBillingStore::new().with_lock_timeout(Duration::from_millis(20)));
        let ledger = LedgerService::new(store.clone());

        let held = domain_billing::BillingStore::begin(store.as_ref(), &email())
            .await
            .unwrap();
        let result = ledger.apply_payment(&email(), dec!(5)).await;
        drop(held);

        let err = result.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_concurrent_credits_and_refunds_conserve_total() {
        let (store, ledger) = ledger_with(vec![
            obligation(1, Some((2024, 1)), dec!(50), dec!(50)),
            obligation(2, Some((2024, 2)), dec!(50), dec!(50)),
        ])
        .await;

        let mut tasks = Vec::new();
        for i in 0..10 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.apply_payment(&email(), dec!(20)).await.map(|_| ())
                } else {
                    ledger.apply_refund(&email(), dec!(5)).await.map(|_| ())
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let total: Decimal = store
            .records_for(&email())
            .await
            .iter()
            .map(|r| r.total_payment_amount_received)
            .sum();
        assert_eq!(total, dec!(175));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use test_utils::{amount_strategy, identity_records_strategy};

    proptest! {
        #[test]
        fn allocation_conserves_amount(
            records in identity_records_strategy(email()),
            amount in amount_strategy(),
        ) {
            let plan = plan_allocation(&records, amount);
            prop_assert_eq!(plan.applied() + plan.residual, amount);
        }

        #[test]
        fn allocation_never_overfills(
            records in identity_records_strategy(email()),
            amount in amount_strategy(),
        ) {
            let plan = plan_allocation(&records, amount);
            for change in &plan.changes {
                let record = records.iter().find(|r| r.id == change.record_id).unwrap();
                prop_assert!(!record.is_overflow());
                prop_assert!(change.delta > Decimal::ZERO);
                prop_assert!(change.balance_after <= record.total_billing_amount);
            }
        }

        #[test]
        fn refund_conserves_amount(
            records in identity_records_strategy(email()),
            refund in amount_strategy(),
        ) {
            let plan = plan_refund(&records, refund);
            prop_assert_eq!(plan.released() + plan.unrefunded, refund);

            let held: Decimal = records.iter().map(|r| r.total_payment_amount_received).sum();
            prop_assert_eq!(plan.unrefunded, (refund - held).max(Decimal::ZERO));
        }

        #[test]
        fn refund_never_goes_negative(
            records in identity_records_strategy(email()),
            refund in amount_strategy(),
        ) {
            let plan = plan_refund(&records, refund);
            for step in &plan.steps {
                if let RefundStep::Debit { balance_after, .. } = step {
                    prop_assert!(*balance_after >= Decimal::ZERO);
                }
            }
        }
    }
}

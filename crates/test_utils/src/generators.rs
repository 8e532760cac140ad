//! Property-Based Test Generators
//!
//! Proptest strategies for amounts and identity record sets that respect the
//! ledger's stored-state invariants: received totals are non-negative,
//! obligations are never over-received and there is at most one overflow
//! record.

use chrono::NaiveDate;
use core_kernel::{ClientRecordId, Email};
use domain_billing::{ObligationRecord, PaymentChoice};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for non-negative amounts in minor units
pub fn amount_minor_strategy() -> impl Strategy<Value = i64> {
    0i64..10_000_000i64
}

/// Strategy for positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy for non-negative major-unit amounts with two decimal places
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    amount_minor_strategy().prop_map(|minor| Decimal::new(minor, 2))
}

/// Strategy for positive major-unit amounts with two decimal places
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    positive_amount_minor_strategy().prop_map(|minor| Decimal::new(minor, 2))
}

/// Strategy for optional payment start dates in 2023-2025
pub fn start_date_strategy() -> impl Strategy<Value = Option<NaiveDate>> {
    proptest::option::weighted(0.8, (2023i32..=2025, 1u32..=12, 1u32..=28))
        .prop_map(|date| date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)))
}

/// Strategy for a single obligation with `received <= billing`
pub fn obligation_strategy(id: i32, email: Email) -> impl Strategy<Value = ObligationRecord> {
    (amount_minor_strategy(), 0u32..=100, start_date_strategy()).prop_map(
        move |(billing_minor, paid_percent, payment_start_date)| {
            let billing = Decimal::new(billing_minor, 2);
            let received = (billing * Decimal::from(paid_percent) / Decimal::from(100)).round_dp(2);
            ObligationRecord {
                id: ClientRecordId::new(id),
                email: email.clone(),
                payment_choice: PaymentChoice::Plan("Monthly".to_string()),
                client_name_first: Some("Prop".to_string()),
                client_name_last: Some("Test".to_string()),
                total_billing_amount: billing,
                total_payment_amount_received: received.min(billing),
                payment_start_date,
            }
        },
    )
}

/// Strategy for all records of one identity, with an optional overflow record
pub fn identity_records_strategy(email: Email) -> impl Strategy<Value = Vec<ObligationRecord>> {
    let obligations_email = email.clone();
    (0usize..6, proptest::option::of(amount_strategy()))
        .prop_flat_map(move |(count, overflow)| {
            let obligations: Vec<_> = (0..count)
                .map(|i| obligation_strategy(i as i32 + 1, obligations_email.clone()))
                .collect();
            (obligations, Just(overflow))
        })
        .prop_map(move |(mut records, overflow)| {
            if let Some(received) = overflow {
                records.push(ObligationRecord {
                    id: ClientRecordId::new(1_000),
                    email: email.clone(),
                    payment_choice: PaymentChoice::Overflow,
                    client_name_first: Some("Prop".to_string()),
                    client_name_last: Some("Test".to_string()),
                    total_billing_amount: Decimal::ZERO,
                    total_payment_amount_received: received,
                    payment_start_date: None,
                });
            }
            records
        })
}

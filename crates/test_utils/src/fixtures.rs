//! Pre-built Test Fixtures
//!
//! Ready-to-use identities, records and webhook payloads. Fixtures are
//! deterministic unless the name says otherwise (`unique_*`).

use chrono::NaiveDate;
use core_kernel::{ClientRecordId, Email};
use domain_billing::{ObligationRecord, PaymentChoice};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

/// Fixture for payer identities
pub struct EmailFixtures;

impl EmailFixtures {
    /// The default payer used across tests
    pub fn payer() -> Email {
        Email::parse("payer@example.com").expect("fixture email is valid")
    }

    /// A second payer for isolation tests
    pub fn other_payer() -> Email {
        Email::parse("other.payer@example.com").expect("fixture email is valid")
    }

    /// A payer no other test uses, for tests sharing one database
    pub fn unique_payer() -> Email {
        Email::parse(&format!("payer-{}@example.com", Uuid::new_v4().simple()))
            .expect("generated email is valid")
    }
}

/// Fixture for ledger amounts
pub struct AmountFixtures;

impl AmountFixtures {
    /// A monthly plan billing amount
    pub fn monthly_bill() -> Decimal {
        dec!(100.00)
    }

    /// A payment covering one and a half monthly bills
    pub fn one_and_a_half_bills() -> Decimal {
        dec!(150.00)
    }

    /// A small refund
    pub fn small_refund() -> Decimal {
        dec!(25.00)
    }
}

/// Fixture for obligation records
pub struct RecordFixtures;

impl RecordFixtures {
    /// An unpaid monthly obligation starting on the first of `month` 2024
    pub fn unpaid_monthly(id: i32, month: u32) -> ObligationRecord {
        ObligationRecord {
            id: ClientRecordId::new(id),
            email: EmailFixtures::payer(),
            payment_choice: PaymentChoice::Plan("Monthly".to_string()),
            client_name_first: Some("Ada".to_string()),
            client_name_last: Some("Lovelace".to_string()),
            total_billing_amount: AmountFixtures::monthly_bill(),
            total_payment_amount_received: Decimal::ZERO,
            payment_start_date: NaiveDate::from_ymd_opt(2024, month, 1),
        }
    }

    /// An overflow record holding `received`
    pub fn overflow(id: i32, received: Decimal) -> ObligationRecord {
        ObligationRecord {
            id: ClientRecordId::new(id),
            email: EmailFixtures::payer(),
            payment_choice: PaymentChoice::Overflow,
            client_name_first: Some("Ada".to_string()),
            client_name_last: Some("Lovelace".to_string()),
            total_billing_amount: Decimal::ZERO,
            total_payment_amount_received: received,
            payment_start_date: None,
        }
    }
}

/// Fixture for billing-processor webhook events
pub struct WebhookFixtures;

impl WebhookFixtures {
    /// A `payment_intent.succeeded` event
    pub fn payment_succeeded(
        event_id: &str,
        amount_minor: i64,
        receipt_email: Option<&str>,
        customer: Option<&str>,
    ) -> Value {
        json!({
            "id": event_id,
            "object": "event",
            "type": "payment_intent.succeeded",
            "created": 1_704_067_200,
            "livemode": false,
            "data": {
                "object": {
                    "id": format!("pi_{}", event_id),
                    "object": "payment_intent",
                    "amount": amount_minor,
                    "currency": "usd",
                    "receipt_email": receipt_email,
                    "customer": customer,
                }
            }
        })
    }

    /// A `charge.refunded` event
    pub fn charge_refunded(
        event_id: &str,
        amount_refunded_minor: i64,
        receipt_email: Option<&str>,
        customer: Option<&str>,
    ) -> Value {
        json!({
            "id": event_id,
            "object": "event",
            "type": "charge.refunded",
            "created": 1_704_067_200,
            "livemode": false,
            "data": {
                "object": {
                    "id": format!("ch_{}", event_id),
                    "object": "charge",
                    "amount": amount_refunded_minor,
                    "amount_refunded": amount_refunded_minor,
                    "currency": "usd",
                    "receipt_email": receipt_email,
                    "customer": customer,
                }
            }
        })
    }

    /// An event kind the ledger does not handle
    pub fn unhandled(event_id: &str) -> Value {
        json!({
            "id": event_id,
            "object": "event",
            "type": "customer.created",
            "created": 1_704_067_200,
            "data": { "object": { "id": "cus_123", "object": "customer" } }
        })
    }
}

//! Overflow bucket management
//!
//! Credit beyond every known obligation lands in the identity's single
//! overflow record. An existing bucket is topped up. Otherwise a new one is
//! synthesized from the most recent record, whose advisor associations are
//! copied onto the new bucket so the client's advisors stay attached to it.

use rust_decimal::Decimal;

use core_kernel::{ClientRecordId, Email};

use crate::ordering::{find_overflow, most_recent};
use crate::record::{NewOverflowRecord, ObligationRecord};

/// What to do with an overflow residual
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverflowPlan {
    /// Add the residual to the existing bucket
    Augment {
        record_id: ClientRecordId,
        amount: Decimal,
        balance_after: Decimal,
    },
    /// Insert a new bucket, copying advisors from `advisors_from`
    Create {
        record: NewOverflowRecord,
        advisors_from: Option<ClientRecordId>,
    },
}

impl OverflowPlan {
    /// Amount deposited by this plan
    pub fn amount(&self) -> Decimal {
        match self {
            OverflowPlan::Augment { amount, .. } => *amount,
            OverflowPlan::Create { record, .. } => record.total_payment_amount_received,
        }
    }
}

/// Plans the deposit of `residual` into the identity's overflow bucket
///
/// `records` must hold every record of `email`, overflow included, as read
/// under lock. Returns `None` for a non-positive residual.
pub fn plan_overflow(
    records: &[ObligationRecord],
    email: &Email,
    residual: Decimal,
) -> Option<OverflowPlan> {
    if residual <= Decimal::ZERO {
        return None;
    }

    if let Some(existing) = find_overflow(records) {
        return Some(OverflowPlan::Augment {
            record_id: existing.id,
            amount: residual,
            balance_after: existing.total_payment_amount_received + residual,
        });
    }

    let source = most_recent(records);
    Some(OverflowPlan::Create {
        record: NewOverflowRecord::for_identity(email.clone(), source, residual),
        advisors_from: source.map(|s| s.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::record::{PaymentChoice, PLACEHOLDER_NAME};

    fn email() -> Email {
        Email::parse("payer@example.com").unwrap()
    }

    fn record(id: i32, choice: PaymentChoice, first: &str, received: Decimal) -> ObligationRecord {
        ObligationRecord {
            id: ClientRecordId::new(id),
            email: email(),
            payment_choice: choice,
            client_name_first: Some(first.to_string()),
            client_name_last: Some("Hopper".to_string()),
            total_billing_amount: dec!(100),
            total_payment_amount_received: received,
            payment_start_date: None,
        }
    }

    #[test]
    fn test_augments_existing_bucket() {
        let records = vec![
            record(1, PaymentChoice::Plan("Monthly".into()), "Grace", dec!(100)),
            record(2, PaymentChoice::Overflow, "Grace", dec!(30)),
        ];
        let plan = plan_overflow(&records, &email(), dec!(20)).unwrap();

        assert_eq!(
            plan,
            OverflowPlan::Augment {
                record_id: ClientRecordId::new(2),
                amount: dec!(20),
                balance_after: dec!(50),
            }
        );
    }

    #[test]
    fn test_creates_bucket_from_most_recent_record() {
        let records = vec![
            record(4, PaymentChoice::Plan("Monthly".into()), "Older", dec!(100)),
            record(7, PaymentChoice::Plan("Annual".into()), "Newer", dec!(100)),
        ];
        let plan = plan_overflow(&records, &email(), dec!(15)).unwrap();

        match plan {
            OverflowPlan::Create { record, advisors_from } => {
                assert_eq!(advisors_from, Some(ClientRecordId::new(7)));
                assert_eq!(record.client_name_first, "Newer");
                assert_eq!(record.client_name_last, "Hopper");
                assert_eq!(record.total_payment_amount_received, dec!(15));
            }
            other => panic!("expected Create, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_identity_gets_placeholder_bucket() {
        let plan = plan_overflow(&[], &email(), dec!(5)).unwrap();

        match plan {
            OverflowPlan::Create { record, advisors_from } => {
                assert!(advisors_from.is_none());
                assert_eq!(record.client_name_first, PLACEHOLDER_NAME);
                assert_eq!(record.email, email());
            }
            other => panic!("expected Create, got {:?}", other),
        }
    }

    #[test]
    fn test_no_plan_without_residual() {
        assert!(plan_overflow(&[], &email(), Decimal::ZERO).is_none());
    }
}

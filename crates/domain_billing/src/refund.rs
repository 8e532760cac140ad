//! Refund reversal
//!
//! A refund undoes the most recent credits first. The overflow bucket is
//! drained before any obligation is touched: an exhausted bucket is deleted
//! along with its advisor associations, while exhausted obligations are only
//! zeroed. Any amount left after every record is empty cannot be refunded and
//! is reported back in the plan.

use rust_decimal::Decimal;
use serde::Serialize;

use core_kernel::ClientRecordId;

use crate::ordering::AllocationOrder;
use crate::record::ObligationRecord;

/// One step of a refund reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RefundStep {
    /// Remove an overflow record and its advisor associations
    Delete {
        record_id: ClientRecordId,
        released: Decimal,
    },
    /// Reduce a record's received balance
    Debit {
        record_id: ClientRecordId,
        amount: Decimal,
        balance_after: Decimal,
    },
}

impl RefundStep {
    /// Amount of the refund absorbed by this step
    pub fn released(&self) -> Decimal {
        match self {
            RefundStep::Delete { released, .. } => *released,
            RefundStep::Debit { amount, .. } => *amount,
        }
    }

    pub fn record_id(&self) -> ClientRecordId {
        match self {
            RefundStep::Delete { record_id, .. } | RefundStep::Debit { record_id, .. } => {
                *record_id
            }
        }
    }
}

/// Result of planning a refund
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    /// Steps in application order
    pub steps: Vec<RefundStep>,
    /// Portion of the refund no record could absorb
    pub unrefunded: Decimal,
}

impl RefundPlan {
    /// Returns true if the whole refund was absorbed
    pub fn is_fully_refunded(&self) -> bool {
        self.unrefunded <= Decimal::ZERO
    }

    /// Total absorbed by all steps
    pub fn released(&self) -> Decimal {
        self.steps.iter().map(RefundStep::released).sum()
    }
}

/// Plans the reversal of `refund_amount` across an identity's records
///
/// `refund_amount` is the absolute value of the refund. A non-positive
/// amount yields an empty plan.
pub fn plan_refund(records: &[ObligationRecord], refund_amount: Decimal) -> RefundPlan {
    let mut plan = RefundPlan {
        steps: Vec::new(),
        unrefunded: refund_amount.max(Decimal::ZERO),
    };

    let overflow =
        AllocationOrder::MostRecentFirst.sort(records.iter().filter(|r| r.is_overflow()));
    for record in overflow {
        if plan.is_fully_refunded() {
            return plan;
        }
        let held = record.total_payment_amount_received;
        if plan.unrefunded < held {
            plan.steps.push(RefundStep::Debit {
                record_id: record.id,
                amount: plan.unrefunded,
                balance_after: held - plan.unrefunded,
            });
            plan.unrefunded = Decimal::ZERO;
        } else {
            plan.steps.push(RefundStep::Delete {
                record_id: record.id,
                released: held,
            });
            plan.unrefunded -= held;
        }
    }

    let obligations =
        AllocationOrder::MostRecentFirst.sort(records.iter().filter(|r| !r.is_overflow()));
    for record in obligations {
        if plan.is_fully_refunded() {
            break;
        }
        let held = record.total_payment_amount_received.max(Decimal::ZERO);
        let debit = plan.unrefunded.min(held);
        if debit > Decimal::ZERO {
            plan.steps.push(RefundStep::Debit {
                record_id: record.id,
                amount: debit,
                balance_after: held - debit,
            });
            plan.unrefunded -= debit;
        }
    }

    plan
}

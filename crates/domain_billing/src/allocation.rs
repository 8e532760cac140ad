//! Credit allocation
//!
//! A payment fills an identity's outstanding obligations oldest-first. Each
//! record absorbs at most its remaining capacity; whatever is left once every
//! obligation is full becomes the overflow residual.
//!
//! Planning is a pure fold over the locked records so the algorithm can be
//! tested without a store. The service applies the resulting changes inside
//! one transaction.

use rust_decimal::Decimal;
use serde::Serialize;

use core_kernel::ClientRecordId;

use crate::ordering::AllocationOrder;
use crate::record::ObligationRecord;

/// A change to one record's received balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    /// Record being adjusted
    pub record_id: ClientRecordId,
    /// Signed amount added to `total_payment_amount_received`
    pub delta: Decimal,
    /// Received balance once the change is applied
    pub balance_after: Decimal,
}

/// Result of planning a credit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Record updates in application order
    pub changes: Vec<BalanceChange>,
    /// Amount left for the overflow bucket
    pub residual: Decimal,
}

impl AllocationPlan {
    fn unallocated(amount: Decimal) -> Self {
        Self {
            changes: Vec::new(),
            residual: amount.max(Decimal::ZERO),
        }
    }

    /// Total applied to obligation records
    pub fn applied(&self) -> Decimal {
        self.changes.iter().map(|c| c.delta).sum()
    }

    /// Returns true if part of the amount must go to overflow
    pub fn has_residual(&self) -> bool {
        self.residual > Decimal::ZERO
    }
}

/// Plans how `amount` is spread over an identity's obligations
///
/// Overflow records are ignored here; they are handled by
/// [`plan_overflow`](crate::overflow::plan_overflow) once the residual is
/// known. A non-positive amount yields an empty plan.
pub fn plan_allocation(records: &[ObligationRecord], amount: Decimal) -> AllocationPlan {
    AllocationOrder::OldestFirst
        .sort(records.iter().filter(|r| !r.is_overflow()))
        .into_iter()
        .fold(AllocationPlan::unallocated(amount), |mut plan, record| {
            let applied = record.outstanding().min(plan.residual);
            if applied > Decimal::ZERO {
                plan.changes.push(BalanceChange {
                    record_id: record.id,
                    delta: applied,
                    balance_after: record.total_payment_amount_received + applied,
                });
                plan.residual -= applied;
            }
            plan
        })
}

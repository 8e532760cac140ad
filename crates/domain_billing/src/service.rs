//! Ledger service
//!
//! Applies credits and refunds to an identity's records. Each call plans
//! against the records read under lock and applies the plan inside the same
//! transaction, so a failure at any step leaves the store untouched.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{AdvisorId, ClientRecordId, Email};

use crate::allocation::{plan_allocation, BalanceChange};
use crate::error::BillingError;
use crate::event::LedgerEntry;
use crate::overflow::{plan_overflow, OverflowPlan};
use crate::ports::{BillingStore, BillingTransaction};
use crate::refund::{plan_refund, RefundStep};

/// Where a credit's residual ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OverflowDeposit {
    /// Added to the existing overflow record
    Augmented {
        record_id: ClientRecordId,
        amount: Decimal,
        balance_after: Decimal,
    },
    /// Stored in a newly created overflow record
    Created {
        record_id: ClientRecordId,
        amount: Decimal,
        advisors: Vec<AdvisorId>,
    },
}

impl OverflowDeposit {
    pub fn record_id(&self) -> ClientRecordId {
        match self {
            OverflowDeposit::Augmented { record_id, .. }
            | OverflowDeposit::Created { record_id, .. } => *record_id,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            OverflowDeposit::Augmented { amount, .. }
            | OverflowDeposit::Created { amount, .. } => *amount,
        }
    }
}

/// Result of applying a credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub email: Email,
    pub amount: Decimal,
    /// Obligation updates, oldest first
    pub applied: Vec<BalanceChange>,
    pub overflow: Option<OverflowDeposit>,
}

impl PaymentOutcome {
    fn unchanged(email: &Email, amount: Decimal) -> Self {
        Self {
            email: email.clone(),
            amount,
            applied: Vec::new(),
            overflow: None,
        }
    }

    /// Total credited to obligations and overflow
    pub fn total_credited(&self) -> Decimal {
        let applied: Decimal = self.applied.iter().map(|c| c.delta).sum();
        applied + self.overflow.as_ref().map_or(Decimal::ZERO, OverflowDeposit::amount)
    }
}

/// Result of applying a refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub email: Email,
    pub amount: Decimal,
    /// Reversal steps, most recent first
    pub steps: Vec<RefundStep>,
    /// Portion of the refund larger than everything the identity held
    pub unrefunded: Decimal,
}

impl RefundOutcome {
    fn unchanged(email: &Email, amount: Decimal) -> Self {
        Self {
            email: email.clone(),
            amount,
            steps: Vec::new(),
            unrefunded: Decimal::ZERO,
        }
    }

    /// Returns true if the refund exceeded the identity's total received
    pub fn exceeds_received(&self) -> bool {
        self.unrefunded > Decimal::ZERO
    }

    pub fn total_reversed(&self) -> Decimal {
        self.steps.iter().map(RefundStep::released).sum()
    }
}

/// Result of applying a [`LedgerEntry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Payment(PaymentOutcome),
    Refund(RefundOutcome),
}

impl LedgerOutcome {
    pub fn email(&self) -> &Email {
        match self {
            LedgerOutcome::Payment(p) => &p.email,
            LedgerOutcome::Refund(r) => &r.email,
        }
    }

    /// Returns the unrefunded remainder of an oversized refund
    pub fn refund_overage(&self) -> Option<Decimal> {
        match self {
            LedgerOutcome::Refund(r) if r.exceeds_received() => Some(r.unrefunded),
            _ => None,
        }
    }
}

/// Ledger service applying credits and refunds through a [`BillingStore`]
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn BillingStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store
    pub fn store(&self) -> &Arc<dyn BillingStore> {
        &self.store
    }

    /// Applies a classified ledger entry
    pub async fn apply(&self, entry: &LedgerEntry) -> Result<LedgerOutcome, BillingError> {
        match entry {
            LedgerEntry::Credit { email, amount } => {
                self.apply_payment(email, *amount).await.map(LedgerOutcome::Payment)
            }
            LedgerEntry::Refund { email, amount } => {
                self.apply_refund(email, *amount).await.map(LedgerOutcome::Refund)
            }
        }
    }

    /// Credits `amount` to the identity's obligations, oldest first
    ///
    /// Anything beyond the combined outstanding balance goes to the overflow
    /// record, which is created if the identity has none. A non-positive
    /// amount changes nothing.
    #[instrument(skip_all, fields(email = %email, amount = %amount))]
    pub async fn apply_payment(
        &self,
        email: &Email,
        amount: Decimal,
    ) -> Result<PaymentOutcome, BillingError> {
        if amount <= Decimal::ZERO {
            debug!("Ignoring non-positive payment");
            return Ok(PaymentOutcome::unchanged(email, amount));
        }

        let mut tx = self.store.begin(email).await?;
        match credit(tx.as_mut(), email, amount).await {
            Ok(outcome) => {
                tx.commit().await?;
                let overflow = outcome
                    .overflow
                    .as_ref()
                    .map_or(Decimal::ZERO, OverflowDeposit::amount);
                info!(
                    records = outcome.applied.len(),
                    overflow = %overflow,
                    "Payment applied"
                );
                Ok(outcome)
            }
            Err(e) => {
                abort(tx, &e).await;
                Err(e)
            }
        }
    }

    /// Reverses `amount` from the identity's records, most recent first
    ///
    /// The overflow record is drained first and deleted once empty. The part
    /// of a refund larger than the identity's total received is reported on
    /// the outcome and otherwise dropped. A non-positive amount changes
    /// nothing.
    #[instrument(skip_all, fields(email = %email, amount = %amount))]
    pub async fn apply_refund(
        &self,
        email: &Email,
        amount: Decimal,
    ) -> Result<RefundOutcome, BillingError> {
        if amount <= Decimal::ZERO {
            debug!("Ignoring non-positive refund");
            return Ok(RefundOutcome::unchanged(email, amount));
        }

        let mut tx = self.store.begin(email).await?;
        match reverse(tx.as_mut(), email, amount).await {
            Ok(outcome) => {
                tx.commit().await?;
                if outcome.exceeds_received() {
                    warn!(
                        unrefunded = %outcome.unrefunded,
                        "Refund exceeds total received; remainder not reversed"
                    );
                }
                info!(steps = outcome.steps.len(), "Refund applied");
                Ok(outcome)
            }
            Err(e) => {
                abort(tx, &e).await;
                Err(e)
            }
        }
    }
}

async fn credit(
    tx: &mut dyn BillingTransaction,
    email: &Email,
    amount: Decimal,
) -> Result<PaymentOutcome, BillingError> {
    let records = tx.records_for_update(email).await?;
    let plan = plan_allocation(&records, amount);

    for change in &plan.changes {
        debug!(record_id = %change.record_id, delta = %change.delta, "Crediting obligation");
        tx.adjust_received(change.record_id, change.delta).await?;
    }

    let overflow = match plan_overflow(&records, email, plan.residual) {
        None => None,
        Some(OverflowPlan::Augment { record_id, amount, balance_after }) => {
            debug!(record_id = %record_id, amount = %amount, "Topping up overflow record");
            tx.adjust_received(record_id, amount).await?;
            Some(OverflowDeposit::Augmented { record_id, amount, balance_after })
        }
        Some(OverflowPlan::Create { record, advisors_from }) => {
            let record_id = tx.insert_overflow(&record).await?;
            let advisors = match advisors_from {
                Some(source) => tx.advisor_ids(source).await?,
                None => Vec::new(),
            };
            for advisor_id in &advisors {
                tx.add_advisor(record_id, *advisor_id).await?;
            }
            debug!(record_id = %record_id, advisors = advisors.len(), "Created overflow record");
            Some(OverflowDeposit::Created {
                record_id,
                amount: record.total_payment_amount_received,
                advisors,
            })
        }
    };

    Ok(PaymentOutcome {
        email: email.clone(),
        amount,
        applied: plan.changes,
        overflow,
    })
}

async fn reverse(
    tx: &mut dyn BillingTransaction,
    email: &Email,
    amount: Decimal,
) -> Result<RefundOutcome, BillingError> {
    let records = tx.records_for_update(email).await?;
    let plan = plan_refund(&records, amount);

    for step in &plan.steps {
        match *step {
            RefundStep::Delete { record_id, released } => {
                let associations = tx.delete_record(record_id).await?;
                debug!(
                    record_id = %record_id,
                    released = %released,
                    associations,
                    "Deleted overflow record"
                );
            }
            RefundStep::Debit { record_id, amount, .. } => {
                debug!(record_id = %record_id, amount = %amount, "Debiting record");
                tx.adjust_received(record_id, -amount).await?;
            }
        }
    }

    Ok(RefundOutcome {
        email: email.clone(),
        amount,
        steps: plan.steps,
        unrefunded: plan.unrefunded,
    })
}

async fn abort(tx: Box<dyn BillingTransaction>, cause: &BillingError) {
    match tx.rollback().await {
        Ok(()) => warn!(error = %cause, "Ledger operation rolled back"),
        Err(rollback_error) => error!(
            error = %cause,
            rollback_error = %rollback_error,
            "Rollback failed"
        ),
    }
}

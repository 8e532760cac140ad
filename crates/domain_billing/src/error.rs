//! Billing domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur while applying a ledger operation
///
/// Every variant aborts the enclosing transaction. A refund larger than the
/// identity's balance is not an error; it is reported on
/// [`RefundOutcome`](crate::service::RefundOutcome).
#[derive(Debug, Error)]
pub enum BillingError {
    /// The store failed or a lock could not be acquired
    #[error("Billing store error: {0}")]
    Store(#[from] PortError),
}

impl BillingError {
    /// Returns true if the operation may succeed when redelivered
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::Store(e) => e.is_transient(),
        }
    }
}

//! Billing Domain - Payment Allocation Ledger
//!
//! This crate applies inbound payments and refunds to the billing records of
//! a payer identity (an email address).
//!
//! # Credits
//!
//! A payment fills outstanding obligations oldest-first by
//! (`payment_start_date`, `id`). Whatever exceeds the combined outstanding
//! balance lands in the identity's single overflow record, created on demand
//! with the names and advisors of the most recent record.
//!
//! # Refunds
//!
//! A refund walks the same records most-recent-first. The overflow record is
//! drained first and deleted once exhausted; obligations are only ever
//! reduced to zero. A refund larger than the identity's total received is
//! reported, not rejected.
//!
//! # Consistency
//!
//! Every operation reads the identity's records under lock and applies its
//! plan in one store transaction. Concurrent operations on the same identity
//! are serialized; different identities proceed independently.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::LedgerService;
//! use rust_decimal_macros::dec;
//!
//! let ledger = LedgerService::new(store);
//! let outcome = ledger.apply_payment(&email, dec!(120)).await?;
//! assert_eq!(outcome.total_credited(), dec!(120));
//! ```

pub mod allocation;
pub mod error;
pub mod event;
pub mod ordering;
pub mod overflow;
pub mod ports;
pub mod record;
pub mod refund;
pub mod service;

pub use allocation::{plan_allocation, AllocationPlan, BalanceChange};
pub use error::BillingError;
pub use event::LedgerEntry;
pub use ordering::AllocationOrder;
pub use overflow::{plan_overflow, OverflowPlan};
pub use ports::{BillingStore, BillingTransaction};
pub use record::{
    NewOverflowRecord, ObligationRecord, PaymentChoice, OVERFLOW_PAYMENT_CHOICE, PLACEHOLDER_NAME,
};
pub use refund::{plan_refund, RefundPlan, RefundStep};
pub use service::{LedgerOutcome, LedgerService, OverflowDeposit, PaymentOutcome, RefundOutcome};

//! Ledger entries
//!
//! The boundary turns an inbound event into a signed amount for an identity.
//! A positive amount is a credit, a negative one a refund; the sign decides
//! which engine runs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::Email;

/// A classified amount ready for the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// Payment received, applied oldest-first
    Credit { email: Email, amount: Decimal },
    /// Refund issued; `amount` is the absolute value refunded
    Refund { email: Email, amount: Decimal },
}

impl LedgerEntry {
    /// Classifies a signed amount
    ///
    /// Returns `None` for zero, which the ledger never applies.
    pub fn from_signed_amount(email: Email, amount: Decimal) -> Option<Self> {
        if amount > Decimal::ZERO {
            Some(LedgerEntry::Credit { email, amount })
        } else if amount < Decimal::ZERO {
            Some(LedgerEntry::Refund { email, amount: amount.abs() })
        } else {
            None
        }
    }

    pub fn email(&self) -> &Email {
        match self {
            LedgerEntry::Credit { email, .. } | LedgerEntry::Refund { email, .. } => email,
        }
    }

    /// Amount with its ledger sign restored
    pub fn signed_amount(&self) -> Decimal {
        match self {
            LedgerEntry::Credit { amount, .. } => *amount,
            LedgerEntry::Refund { amount, .. } => -*amount,
        }
    }
}

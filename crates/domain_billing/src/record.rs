//! Obligation records
//!
//! One record per billing commitment, plus at most one overflow bucket per
//! identity. Records are read from the store under a row lock before any
//! allocation decision is made.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ClientRecordId, Email};

/// Stored `payment_choice` value marking the overflow bucket
pub const OVERFLOW_PAYMENT_CHOICE: &str = "Overflow payment";

/// Name used for synthesized overflow records when the identity has no prior record
pub const PLACEHOLDER_NAME: &str = "Unknown";

/// Classification of an obligation record
///
/// Only `Overflow` carries meaning for the ledger. Every other stored value
/// is an ordinary billing plan kept verbatim so it round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentChoice {
    /// The excess-payment bucket
    Overflow,
    /// An ordinary billing plan, as provisioned
    Plan(String),
}

impl PaymentChoice {
    /// Classifies a stored `payment_choice` value
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some(OVERFLOW_PAYMENT_CHOICE) => PaymentChoice::Overflow,
            Some(other) => PaymentChoice::Plan(other.to_string()),
            None => PaymentChoice::Plan(String::new()),
        }
    }

    /// Returns the value as stored in `clients.payment_choice`
    pub fn as_stored(&self) -> &str {
        match self {
            PaymentChoice::Overflow => OVERFLOW_PAYMENT_CHOICE,
            PaymentChoice::Plan(plan) => plan,
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, PaymentChoice::Overflow)
    }
}

impl fmt::Display for PaymentChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_stored())
    }
}

/// A billing obligation or overflow bucket belonging to one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationRecord {
    /// Store-assigned identity
    pub id: ClientRecordId,
    /// Identity key grouping the payer's records
    pub email: Email,
    /// Billing plan or overflow bucket
    pub payment_choice: PaymentChoice,
    /// Client first name
    pub client_name_first: Option<String>,
    /// Client last name
    pub client_name_last: Option<String>,
    /// Amount owed; zero for overflow records
    pub total_billing_amount: Decimal,
    /// Cumulative amount credited to this record
    pub total_payment_amount_received: Decimal,
    /// Primary ordering key
    pub payment_start_date: Option<NaiveDate>,
}

impl ObligationRecord {
    /// Returns true if this record is the overflow bucket
    pub fn is_overflow(&self) -> bool {
        self.payment_choice.is_overflow()
    }

    /// Returns the credit this record can still absorb
    ///
    /// Overflow records have no capacity of their own; over-received plans
    /// report zero rather than a negative value.
    pub fn outstanding(&self) -> Decimal {
        if self.is_overflow() {
            return Decimal::ZERO;
        }
        (self.total_billing_amount - self.total_payment_amount_received).max(Decimal::ZERO)
    }
}

/// Data for inserting a new overflow record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOverflowRecord {
    pub email: Email,
    pub client_name_first: String,
    pub client_name_last: String,
    pub total_payment_amount_received: Decimal,
}

impl NewOverflowRecord {
    /// Builds the overflow record for `email`, copying names from `source`
    pub fn for_identity(email: Email, source: Option<&ObligationRecord>, amount: Decimal) -> Self {
        let name = |field: Option<&String>| {
            field
                .filter(|n| !n.is_empty())
                .cloned()
                .unwrap_or_else(|| PLACEHOLDER_NAME.to_string())
        };

        Self {
            email,
            client_name_first: name(source.and_then(|s| s.client_name_first.as_ref())),
            client_name_last: name(source.and_then(|s| s.client_name_last.as_ref())),
            total_payment_amount_received: amount,
        }
    }

    /// Classification of every synthesized record
    pub fn payment_choice(&self) -> PaymentChoice {
        PaymentChoice::Overflow
    }

    /// Overflow buckets carry no billing target
    pub fn total_billing_amount(&self) -> Decimal {
        Decimal::ZERO
    }
}

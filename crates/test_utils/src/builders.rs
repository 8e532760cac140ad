//! Test Data Builders
//!
//! Builders for obligation records with sensible defaults, so tests only
//! spell out the fields they care about. Names default to random fake
//! values; set them explicitly when a test asserts on them.

use chrono::NaiveDate;
use core_kernel::{ClientRecordId, Email};
use domain_billing::{ObligationRecord, PaymentChoice};
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rust_decimal::Decimal;

use crate::fixtures::{AmountFixtures, EmailFixtures};

/// Builder for constructing obligation and overflow records
pub struct ObligationRecordBuilder {
    id: ClientRecordId,
    email: Email,
    payment_choice: PaymentChoice,
    client_name_first: Option<String>,
    client_name_last: Option<String>,
    total_billing_amount: Decimal,
    total_payment_amount_received: Decimal,
    payment_start_date: Option<NaiveDate>,
}

impl ObligationRecordBuilder {
    /// Starts an unpaid monthly obligation with the given id
    pub fn new(id: i32) -> Self {
        Self {
            id: ClientRecordId::new(id),
            email: EmailFixtures::payer(),
            payment_choice: PaymentChoice::Plan("Monthly".to_string()),
            client_name_first: Some(FirstName().fake()),
            client_name_last: Some(LastName().fake()),
            total_billing_amount: AmountFixtures::monthly_bill(),
            total_payment_amount_received: Decimal::ZERO,
            payment_start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
        }
    }

    /// Starts an empty overflow record with the given id
    pub fn overflow(id: i32) -> Self {
        Self::new(id)
            .with_payment_choice(PaymentChoice::Overflow)
            .with_billing(Decimal::ZERO)
            .undated()
    }

    pub fn with_email(mut self, email: Email) -> Self {
        self.email = email;
        self
    }

    pub fn with_payment_choice(mut self, choice: PaymentChoice) -> Self {
        self.payment_choice = choice;
        self
    }

    /// Sets both names
    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.client_name_first = Some(first.into());
        self.client_name_last = Some(last.into());
        self
    }

    /// Clears both names, as on records provisioned without them
    pub fn without_names(mut self) -> Self {
        self.client_name_first = None;
        self.client_name_last = None;
        self
    }

    pub fn with_billing(mut self, amount: Decimal) -> Self {
        self.total_billing_amount = amount;
        self
    }

    pub fn with_received(mut self, amount: Decimal) -> Self {
        self.total_payment_amount_received = amount;
        self
    }

    /// Sets the payment start date; panics on an invalid date
    pub fn starting(mut self, year: i32, month: u32, day: u32) -> Self {
        self.payment_start_date =
            Some(NaiveDate::from_ymd_opt(year, month, day).expect("valid start date"));
        self
    }

    pub fn undated(mut self) -> Self {
        self.payment_start_date = None;
        self
    }

    pub fn build(self) -> ObligationRecord {
        ObligationRecord {
            id: self.id,
            email: self.email,
            payment_choice: self.payment_choice,
            client_name_first: self.client_name_first,
            client_name_last: self.client_name_last,
            total_billing_amount: self.total_billing_amount,
            total_payment_amount_received: self.total_payment_amount_received,
            payment_start_date: self.payment_start_date,
        }
    }
}

//! Webhook event payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::from_minor_units;
use domain_billing::LedgerOutcome;

use crate::error::ApiError;

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

/// Envelope of an inbound processor event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

/// The fields of a payment intent or charge the ledger reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventObject {
    pub id: Option<String>,
    /// Amount in minor units
    pub amount: Option<i64>,
    /// Refunded amount in minor units
    pub amount_refunded: Option<i64>,
    pub receipt_email: Option<String>,
    pub customer: Option<String>,
}

/// Event kinds the ledger acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentSucceeded,
    ChargeRefunded,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            PAYMENT_SUCCEEDED => Some(EventKind::PaymentSucceeded),
            CHARGE_REFUNDED => Some(EventKind::ChargeRefunded),
            _ => None,
        }
    }
}

impl WebhookEvent {
    /// Classifies the event and returns its signed amount in major units
    ///
    /// Credits are positive and refunds negative.
    ///
    /// # Errors
    ///
    /// - `ApiError::UnhandledEvent` for any other event type
    /// - `ApiError::BadRequest` if the amount is missing or not positive
    pub fn signed_amount(&self) -> Result<(EventKind, Decimal), ApiError> {
        let kind = EventKind::from_type(&self.event_type)
            .ok_or_else(|| ApiError::UnhandledEvent(self.event_type.clone()))?;

        let (field, minor) = match kind {
            EventKind::PaymentSucceeded => ("amount", self.data.object.amount),
            EventKind::ChargeRefunded => ("amount_refunded", self.data.object.amount_refunded),
        };
        let minor = minor
            .ok_or_else(|| ApiError::BadRequest(format!("event {} has no {}", self.id, field)))?;
        if minor <= 0 {
            return Err(ApiError::BadRequest(format!(
                "event {} has non-positive {}: {}",
                self.id, field, minor
            )));
        }

        let amount = from_minor_units(minor);
        Ok(match kind {
            EventKind::PaymentSucceeded => (kind, amount),
            EventKind::ChargeRefunded => (kind, -amount),
        })
    }

    /// Receipt email as sent, with blank values treated as absent
    pub fn receipt_email(&self) -> Option<&str> {
        self.data
            .object
            .receipt_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }

    pub fn customer(&self) -> Option<&str> {
        self.data.object.customer.as_deref().filter(|id| !id.is_empty())
    }
}

/// Flags an outcome that succeeded but needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    RefundExceedsReceived,
}

/// Response body for an accepted delivery
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub event_id: String,
    pub event_type: String,
    /// True if the event was already applied and nothing changed
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LedgerOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<Anomaly>,
}

impl WebhookResponse {
    pub fn applied(event: &WebhookEvent, outcome: LedgerOutcome) -> Self {
        let anomaly = outcome.refund_overage().map(|_| Anomaly::RefundExceedsReceived);
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            duplicate: false,
            outcome: Some(outcome),
            anomaly,
        }
    }

    pub fn duplicate(event: &WebhookEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            duplicate: true,
            outcome: None,
            anomaly: None,
        }
    }
}

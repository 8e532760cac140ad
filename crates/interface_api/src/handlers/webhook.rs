//! Processor webhook handler
//!
//! A delivery is verified, classified, deduplicated and resolved to a payer
//! identity before it reaches the ledger. Every rejection happens before the
//! ledger is called, so a rejected delivery never mutates anything.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use core_kernel::Email;
use domain_billing::LedgerEntry;

use crate::dto::{WebhookEvent, WebhookResponse};
use crate::error::ApiError;
use crate::identity::CustomerDirectory;
use crate::idempotency::Claim;
use crate::signature::SIGNATURE_HEADER;
use crate::AppState;

/// Receives a processor event
#[instrument(skip_all)]
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(error) = state.verifier.verify(signature, &body, Utc::now().timestamp()) {
        warn!(%error, "Rejected webhook signature");
        return Err(error.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed event: {}", e)))?;
    let (kind, signed_amount) = event.signed_amount()?;

    let claim = match state.events.claim(&event.id) {
        Claim::Fresh(claim) => claim,
        Claim::Duplicate => {
            warn!(event_id = %event.id, "Duplicate event delivery ignored");
            return Ok(Json(WebhookResponse::duplicate(&event)));
        }
        Claim::InFlight => {
            return Err(ApiError::Conflict(format!(
                "event {} is already being processed",
                event.id
            )));
        }
    };

    let email = resolve_email(state.directory.as_ref(), &event).await?;
    let entry = LedgerEntry::from_signed_amount(email, signed_amount)
        .ok_or_else(|| ApiError::BadRequest(format!("event {} has a zero amount", event.id)))?;

    let outcome = state.ledger.apply(&entry).await?;
    claim.complete();

    info!(
        event_id = %event.id,
        kind = ?kind,
        email = %entry.email(),
        amount = %signed_amount,
        "Event applied"
    );
    Ok(Json(WebhookResponse::applied(&event, outcome)))
}

/// Resolves the payer email, preferring the receipt email on the event
async fn resolve_email(
    directory: &dyn CustomerDirectory,
    event: &WebhookEvent,
) -> Result<Email, ApiError> {
    if let Some(raw) = event.receipt_email() {
        match Email::parse(raw) {
            Ok(email) => return Ok(email),
            Err(error) => warn!(event_id = %event.id, %error, "Unusable receipt email"),
        }
    }

    let customer_id = event.customer().ok_or_else(|| {
        ApiError::IdentityUnresolved(format!(
            "event {} has no receipt email or customer",
            event.id
        ))
    })?;

    directory
        .customer_email(customer_id)
        .await
        .map_err(ApiError::Upstream)?
        .ok_or_else(|| {
            ApiError::IdentityUnresolved(format!(
                "customer {} of event {} has no email",
                customer_id, event.id
            ))
        })
}

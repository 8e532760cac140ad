//! Webhook API Layer
//!
//! This crate receives billing-processor webhook events over HTTP using Axum
//! and applies them to the payment allocation ledger.
//!
//! # Architecture
//!
//! - **Handlers**: the webhook endpoint and health checks
//! - **Signature**: HMAC verification of each delivery
//! - **Identity**: payer email resolution, from the event or the customer API
//! - **Idempotency**: deduplication of redelivered events
//! - **Middleware**: tracing and audit logging
//! - **Error Handling**: consistent JSON error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(ledger, directory, config);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod idempotency;
pub mod middleware;
pub mod signature;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use domain_billing::LedgerService;

use crate::config::ApiConfig;
use crate::handlers::{health, webhook};
use crate::identity::CustomerDirectory;
use crate::idempotency::ProcessedEvents;
use crate::middleware::audit_middleware;
use crate::signature::SignatureVerifier;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
    pub directory: Arc<dyn CustomerDirectory>,
    pub events: Arc<ProcessedEvents>,
    pub verifier: SignatureVerifier,
    pub config: ApiConfig,
}

impl AppState {
    /// Builds the state, deriving the verifier and dedup set from `config`
    pub fn new(
        ledger: LedgerService,
        directory: Arc<dyn CustomerDirectory>,
        config: ApiConfig,
    ) -> Self {
        Self {
            ledger,
            directory,
            events: Arc::new(ProcessedEvents::new(config.dedup_capacity)),
            verifier: SignatureVerifier::new(
                config.webhook_secret.as_bytes(),
                config.signature_tolerance(),
            ),
            config,
        }
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook::receive_event))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(audit_middleware)),
        )
        .with_state(state)
}

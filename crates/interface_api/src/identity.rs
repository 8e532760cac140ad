//! Payer identity resolution
//!
//! Events carry a `receipt_email` when the payer supplied one at checkout.
//! Otherwise the email is looked up from the processor's customer record.
//!
//! Customer API errors are mapped to `PortError` variants:
//! - 404 -> no email
//! - 401/403 -> `PortError::Unauthorized`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - Timeouts -> `PortError::Timeout`
//! - Other -> `PortError::Internal`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use core_kernel::{DomainPort, Email, PortError};

/// Looks up the email registered on a processor customer
#[async_trait]
pub trait CustomerDirectory: DomainPort {
    /// Returns the customer's email, or `None` if there is none
    async fn customer_email(&self, customer_id: &str) -> Result<Option<Email>, PortError>;
}

/// Connection settings for the customer API
#[derive(Clone)]
pub struct CustomerApiConfig {
    pub api_base: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for CustomerApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerApiConfig")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    email: Option<String>,
}

/// Customer directory backed by the processor's REST API
#[derive(Debug, Clone)]
pub struct StripeCustomerDirectory {
    client: reqwest::Client,
    config: CustomerApiConfig,
}

impl StripeCustomerDirectory {
    pub fn new(config: CustomerApiConfig) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortError::Internal {
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client, config })
    }

    fn customer_url(&self, customer_id: &str) -> String {
        format!("{}/v1/customers/{}", self.config.api_base.trim_end_matches('/'), customer_id)
    }
}

fn status_to_port_error(status: StatusCode, retry_after: Option<u64>) -> PortError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: format!("customer API rejected credentials ({})", status),
        },
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(1),
        },
        s if s.is_server_error() => PortError::ServiceUnavailable {
            service: format!("customer API ({})", s),
        },
        s => PortError::internal(format!("unexpected customer API status {}", s)),
    }
}

fn request_to_port_error(error: reqwest::Error, timeout: Duration) -> PortError {
    if error.is_timeout() {
        PortError::Timeout {
            operation: "customer lookup".to_string(),
            duration_ms: timeout.as_millis() as u64,
        }
    } else if error.is_connect() {
        PortError::Connection {
            message: "customer API unreachable".to_string(),
            source: Some(Box::new(error)),
        }
    } else {
        PortError::Internal {
            message: "customer lookup failed".to_string(),
            source: Some(Box::new(error)),
        }
    }
}

impl DomainPort for StripeCustomerDirectory {}

#[async_trait]
impl CustomerDirectory for StripeCustomerDirectory {
    #[instrument(skip_all, fields(customer_id = %customer_id))]
    async fn customer_email(&self, customer_id: &str) -> Result<Option<Email>, PortError> {
        let timeout = self.config.timeout;
        let response = self
            .client
            .get(self.customer_url(customer_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| request_to_port_error(e, timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("customer not found");
            return Ok(None);
        }
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(status_to_port_error(status, retry_after));
        }

        let customer: CustomerResponse = response
            .json()
            .await
            .map_err(|e| request_to_port_error(e, timeout))?;
        Ok(parse_customer_email(customer.email.as_deref()))
    }
}

fn parse_customer_email(raw: Option<&str>) -> Option<Email> {
    let raw = raw?;
    match Email::parse(raw) {
        Ok(email) => Some(email),
        Err(error) => {
            warn!(%error, "customer record has an unusable email");
            None
        }
    }
}

/// Fixed customer-to-email map, for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct StaticCustomerDirectory {
    customers: HashMap<String, Email>,
}

impl StaticCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>, email: Email) -> Self {
        self.customers.insert(customer_id.into(), email);
        self
    }
}

impl DomainPort for StaticCustomerDirectory {}

#[async_trait]
impl CustomerDirectory for StaticCustomerDirectory {
    async fn customer_email(&self, customer_id: &str) -> Result<Option<Email>, PortError> {
        Ok(self.customers.get(customer_id).cloned())
    }
}

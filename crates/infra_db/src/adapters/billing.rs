//! PostgreSQL Billing Store Adapter
//!
//! Implements [`BillingStore`] on PostgreSQL. Each ledger operation maps to
//! one database transaction:
//!
//! 1. `BEGIN`
//! 2. `set_config('lock_timeout', …, true)` bounds every lock wait below
//! 3. `pg_advisory_xact_lock(hashtextextended(email, 0))` serializes the identity
//! 4. `SELECT … FOR UPDATE` over the identity's `clients` rows
//! 5. updates, inserts and deletes planned by the ledger
//! 6. `COMMIT` or `ROLLBACK`
//!
//! The advisory lock covers identities with no rows yet, which `FOR UPDATE`
//! alone cannot; the `clients_one_overflow_per_email` index backs it up.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingStore;
//! use domain_billing::{BillingStore, LedgerService};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn BillingStore> = Arc::new(PostgresBillingStore::new(pool));
//! let ledger = LedgerService::new(store);
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, AdvisorId, ClientRecordId, DomainPort, Email, HealthCheckResult,
    HealthCheckable, PortError,
};
use domain_billing::{BillingStore, BillingTransaction, NewOverflowRecord, ObligationRecord};

use crate::error::DatabaseError;
use crate::repositories::clients;

const ADAPTER_ID: &str = "postgres-billing-store";

/// Default bound on advisory and row lock waits
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL-backed implementation of the BillingStore port
///
/// Database errors are translated to `PortError` variants:
/// - `DatabaseError::LockTimeout` -> `PortError::Timeout`
/// - `DatabaseError::DuplicateEntry` / `TransactionAborted` -> `PortError::Conflict`
/// - constraint violations -> `PortError::Validation`
/// - connection failures -> `PortError::Connection`
/// - other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a transaction waits for the identity and row locks
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };

        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    #[instrument(skip_all, fields(email = %email))]
    async fn begin(&self, email: &Email) -> Result<Box<dyn BillingTransaction>, PortError> {
        let lock_timeout = self.lock_timeout;
        let to_port = move |e: DatabaseError| db_to_port_error(e, lock_timeout);

        let mut tx = self.pool.begin().await.map_err(|e| to_port(e.into()))?;
        clients::set_lock_timeout(&mut tx, lock_timeout.as_millis() as u64)
            .await
            .map_err(to_port)?;
        clients::lock_identity(&mut tx, email).await.map_err(to_port)?;
        debug!("Identity lock acquired");

        Ok(Box::new(PgBillingTransaction { tx, lock_timeout }))
    }
}

/// An open ledger transaction holding the identity's advisory lock
pub struct PgBillingTransaction {
    tx: Transaction<'static, Postgres>,
    lock_timeout: Duration,
}

#[async_trait]
impl BillingTransaction for PgBillingTransaction {
    async fn records_for_update(
        &mut self,
        email: &Email,
    ) -> Result<Vec<ObligationRecord>, PortError> {
        let lock_timeout = self.lock_timeout;
        let rows = clients::select_for_update(&mut self.tx, email)
            .await
            .map_err(|e| db_to_port_error(e, lock_timeout))?;
        debug!(rows = rows.len(), "Locked client records");

        rows.into_iter()
            .map(|row| {
                ObligationRecord::try_from(row).map_err(|e| db_to_port_error(e, lock_timeout))
            })
            .collect()
    }

    async fn advisor_ids(
        &mut self,
        record_id: ClientRecordId,
    ) -> Result<Vec<AdvisorId>, PortError> {
        let lock_timeout = self.lock_timeout;
        let ids = clients::advisor_ids(&mut self.tx, record_id.get())
            .await
            .map_err(|e| db_to_port_error(e, lock_timeout))?;
        Ok(ids.into_iter().map(AdvisorId::new).collect())
    }

    async fn adjust_received(
        &mut self,
        record_id: ClientRecordId,
        delta: Decimal,
    ) -> Result<(), PortError> {
        let lock_timeout = self.lock_timeout;
        let updated = clients::add_to_received(&mut self.tx, record_id.get(), delta)
            .await
            .map_err(|e| db_to_port_error(e, lock_timeout))?;
        if updated == 0 {
            return Err(PortError::not_found("ClientRecord", record_id));
        }
        Ok(())
    }

    async fn insert_overflow(
        &mut self,
        record: &NewOverflowRecord,
    ) -> Result<ClientRecordId, PortError> {
        let lock_timeout = self.lock_timeout;
        let id = clients::insert_overflow(&mut self.tx, record)
            .await
            .map_err(|e| db_to_port_error(e, lock_timeout))?;
        Ok(ClientRecordId::new(id))
    }

    async fn add_advisor(
        &mut self,
        record_id: ClientRecordId,
        advisor_id: AdvisorId,
    ) -> Result<(), PortError> {
        let lock_timeout = self.lock_timeout;
        clients::insert_association(&mut self.tx, record_id.get(), advisor_id.get())
            .await
            .map_err(|e| db_to_port_error(e, lock_timeout))
    }

    async fn delete_record(&mut self, record_id: ClientRecordId) -> Result<u64, PortError> {
        let lock_timeout = self.lock_timeout;
        let (associations, deleted) = clients::delete_client(&mut self.tx, record_id.get())
            .await
            .map_err(|e| db_to_port_error(e, lock_timeout))?;
        if deleted == 0 {
            return Err(PortError::not_found("ClientRecord", record_id));
        }
        Ok(associations)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let PgBillingTransaction { tx, lock_timeout } = *self;
        tx.commit()
            .await
            .map_err(|e| db_to_port_error(e.into(), lock_timeout))
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        let PgBillingTransaction { tx, lock_timeout } = *self;
        tx.rollback()
            .await
            .map_err(|e| db_to_port_error(e.into(), lock_timeout))
    }
}

/// Converts a DatabaseError to a PortError
fn db_to_port_error(e: DatabaseError, lock_timeout: Duration) -> PortError {
    match e {
        DatabaseError::LockTimeout(message) => PortError::Timeout {
            operation: message,
            duration_ms: lock_timeout.as_millis() as u64,
        },
        DatabaseError::DuplicateEntry(message) | DatabaseError::TransactionAborted(message) => {
            PortError::conflict(message)
        }
        DatabaseError::ForeignKeyViolation(message)
        | DatabaseError::ConstraintViolation(message) => PortError::validation(message),
        DatabaseError::ConnectionFailed(message) => PortError::connection(message),
        DatabaseError::PoolExhausted => PortError::ServiceUnavailable {
            service: "postgres connection pool".to_string(),
        },
        DatabaseError::NotFound(message) => PortError::NotFound {
            entity_type: "ClientRecord".to_string(),
            id: message,
        },
        other => PortError::Internal {
            message: other.to_string(),
            source: Some(Box::new(other)),
        },
    }
}

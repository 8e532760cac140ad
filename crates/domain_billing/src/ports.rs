//! Billing Store Ports
//!
//! The ledger reads and mutates obligation records only through these
//! traits. Every top-level ledger operation runs inside one
//! [`BillingTransaction`] scoped to a single identity:
//!
//! 1. [`BillingStore::begin`] opens the transaction and takes the identity's
//!    write lock, waiting a bounded time for it.
//! 2. [`BillingTransaction::records_for_update`] reads every record of the
//!    identity under row locks.
//! 3. The service applies the planned changes.
//! 4. [`BillingTransaction::commit`] publishes all of them at once, or
//!    [`BillingTransaction::rollback`] discards all of them.
//!
//! Adapters:
//!
//! - **PostgreSQL**: `infra_db::adapters::PostgresBillingStore`
//! - **Mock**: [`mock::MockBillingStore`], in memory, for tests
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_billing::{BillingStore, LedgerService};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn BillingStore> = Arc::new(PostgresBillingStore::new(pool));
//! let ledger = LedgerService::new(store);
//! ledger.apply_payment(&email, dec!(120)).await?;
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;

use core_kernel::{AdvisorId, ClientRecordId, DomainPort, Email, HealthCheckable, PortError};

use crate::record::{NewOverflowRecord, ObligationRecord};

/// Entry point to the billing store
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    /// Opens a transaction holding the write lock for `email`
    ///
    /// # Errors
    ///
    /// `PortError::Timeout` if the lock is not acquired in time, or a
    /// connection error if the store is unreachable.
    async fn begin(&self, email: &Email) -> Result<Box<dyn BillingTransaction>, PortError>;
}

/// A single-identity unit of work
///
/// Dropping a transaction without committing discards its changes.
#[async_trait]
pub trait BillingTransaction: Send {
    /// Returns every record of `email`, overflow included, locked for update
    ///
    /// Order is unspecified; callers sort with
    /// [`AllocationOrder`](crate::ordering::AllocationOrder).
    async fn records_for_update(
        &mut self,
        email: &Email,
    ) -> Result<Vec<ObligationRecord>, PortError>;

    /// Returns the advisors associated with a record
    async fn advisor_ids(&mut self, record_id: ClientRecordId) -> Result<Vec<AdvisorId>, PortError>;

    /// Adds `delta` to a record's `total_payment_amount_received`
    async fn adjust_received(
        &mut self,
        record_id: ClientRecordId,
        delta: Decimal,
    ) -> Result<(), PortError>;

    /// Inserts a new overflow record and returns its id
    async fn insert_overflow(
        &mut self,
        record: &NewOverflowRecord,
    ) -> Result<ClientRecordId, PortError>;

    /// Associates an advisor with a record
    async fn add_advisor(
        &mut self,
        record_id: ClientRecordId,
        advisor_id: AdvisorId,
    ) -> Result<(), PortError>;

    /// Deletes a record and all its advisor associations
    ///
    /// Returns the number of associations removed.
    async fn delete_record(&mut self, record_id: ClientRecordId) -> Result<u64, PortError>;

    /// Publishes every change made in this transaction
    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    /// Discards every change made in this transaction
    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}

/// In-memory implementation of the billing store for testing
///
/// Changes are staged per transaction and replayed onto the shared tables on
/// commit. A per-identity async mutex stands in for the PostgreSQL advisory
/// and row locks.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{Mutex, OwnedMutexGuard};

    use core_kernel::{AdapterHealth, HealthCheckResult};

    use crate::record::PaymentChoice;

    const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, Default)]
    struct Tables {
        clients: BTreeMap<ClientRecordId, ObligationRecord>,
        associations: Vec<(ClientRecordId, AdvisorId)>,
    }

    impl Tables {
        fn record_mut(&mut self, id: ClientRecordId) -> Result<&mut ObligationRecord, PortError> {
            self.clients
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("ClientRecord", id))
        }

        fn apply(&mut self, op: &StagedOp) -> Result<(), PortError> {
            match op {
                StagedOp::Adjust { record_id, delta } => {
                    let record = self.record_mut(*record_id)?;
                    let balance = record.total_payment_amount_received + *delta;
                    if balance < Decimal::ZERO {
                        return Err(PortError::validation(format!(
                            "total_payment_amount_received of {} would become {}",
                            record_id, balance
                        )));
                    }
                    record.total_payment_amount_received = balance;
                }
                StagedOp::Insert(record) => {
                    if record.is_overflow()
                        && self
                            .clients
                            .values()
                            .any(|r| r.is_overflow() && r.email == record.email)
                    {
                        return Err(PortError::conflict(format!(
                            "overflow record already exists for {}",
                            record.email
                        )));
                    }
                    self.clients.insert(record.id, record.clone());
                }
                StagedOp::Associate { record_id, advisor_id } => {
                    if !self.clients.contains_key(record_id) {
                        return Err(PortError::not_found("ClientRecord", record_id));
                    }
                    self.associations.push((*record_id, *advisor_id));
                }
                StagedOp::Delete { record_id } => {
                    self.associations.retain(|(client, _)| client != record_id);
                    self.clients
                        .remove(record_id)
                        .ok_or_else(|| PortError::not_found("ClientRecord", record_id))?;
                }
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone)]
    enum StagedOp {
        Adjust { record_id: ClientRecordId, delta: Decimal },
        Insert(ObligationRecord),
        Associate { record_id: ClientRecordId, advisor_id: AdvisorId },
        Delete { record_id: ClientRecordId },
    }

    /// In-memory mock implementation of BillingStore
    #[derive(Debug, Clone)]
    pub struct MockBillingStore {
        tables: Arc<Mutex<Tables>>,
        identity_locks: Arc<Mutex<HashMap<Email, Arc<Mutex<()>>>>>,
        next_id: Arc<AtomicI32>,
        write_budget: Arc<AtomicUsize>,
        commits: Arc<AtomicUsize>,
        lock_timeout: Duration,
    }

    impl Default for MockBillingStore {
        fn default() -> Self {
            Self {
                tables: Arc::default(),
                identity_locks: Arc::default(),
                next_id: Arc::new(AtomicI32::new(1)),
                write_budget: Arc::new(AtomicUsize::new(usize::MAX)),
                commits: Arc::new(AtomicUsize::new(0)),
                lock_timeout: DEFAULT_LOCK_TIMEOUT,
            }
        }
    }

    impl MockBillingStore {
        /// Creates an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates the store with records, keeping their ids
        pub async fn with_records(records: Vec<ObligationRecord>) -> Self {
            let store = Self::new();
            for record in records {
                store.insert(record).await;
            }
            store
        }

        /// Sets how long `begin` waits for an identity lock
        pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
            self.lock_timeout = timeout;
            self
        }

        /// Lets the next `writes` mutations succeed, then fails every later one
        pub fn fail_after_writes(&self, writes: usize) {
            self.write_budget.store(writes, Ordering::SeqCst);
        }

        /// Inserts or replaces a record outside of any transaction
        pub async fn insert(&self, record: ObligationRecord) {
            self.next_id.fetch_max(record.id.get() + 1, Ordering::SeqCst);
            self.tables.lock().await.clients.insert(record.id, record);
        }

        /// Associates an advisor outside of any transaction
        pub async fn associate(&self, record_id: ClientRecordId, advisor_id: AdvisorId) {
            self.tables.lock().await.associations.push((record_id, advisor_id));
        }

        /// Returns a committed record
        pub async fn record(&self, id: ClientRecordId) -> Option<ObligationRecord> {
            self.tables.lock().await.clients.get(&id).cloned()
        }

        /// Returns every committed record of an identity, ordered by id
        pub async fn records_for(&self, email: &Email) -> Vec<ObligationRecord> {
            self.tables
                .lock()
                .await
                .clients
                .values()
                .filter(|r| &r.email == email)
                .cloned()
                .collect()
        }

        /// Returns the committed overflow records of an identity
        pub async fn overflow_records(&self, email: &Email) -> Vec<ObligationRecord> {
            self.records_for(email)
                .await
                .into_iter()
                .filter(|r| r.payment_choice == PaymentChoice::Overflow)
                .collect()
        }

        /// Returns the committed advisors of a record
        pub async fn advisors_of(&self, id: ClientRecordId) -> Vec<AdvisorId> {
            self.tables
                .lock()
                .await
                .associations
                .iter()
                .filter(|(client, _)| *client == id)
                .map(|(_, advisor)| *advisor)
                .collect()
        }

        /// Total number of committed associations
        pub async fn association_count(&self) -> usize {
            self.tables.lock().await.associations.len()
        }

        /// Number of transactions committed so far
        pub fn commit_count(&self) -> usize {
            self.commits.load(Ordering::SeqCst)
        }

        async fn identity_lock(&self, email: &Email) -> Arc<Mutex<()>> {
            self.identity_locks
                .lock()
                .await
                .entry(email.clone())
                .or_default()
                .clone()
        }
    }

    impl DomainPort for MockBillingStore {}

    #[async_trait]
    impl HealthCheckable for MockBillingStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-billing-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl BillingStore for MockBillingStore {
        async fn begin(&self, email: &Email) -> Result<Box<dyn BillingTransaction>, PortError> {
            let lock = self.identity_lock(email).await;
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| PortError::Timeout {
                    operation: format!("lock identity {}", email),
                    duration_ms: self.lock_timeout.as_millis() as u64,
                })?;

            let snapshot = self.tables.lock().await.clone();
            Ok(Box::new(MockTransaction {
                store: self.clone(),
                working: snapshot,
                staged: Vec::new(),
                _guard: guard,
            }))
        }
    }

    struct MockTransaction {
        store: MockBillingStore,
        working: Tables,
        staged: Vec<StagedOp>,
        _guard: OwnedMutexGuard<()>,
    }

    impl MockTransaction {
        fn stage(&mut self, op: StagedOp) -> Result<(), PortError> {
            let allowed = self
                .store
                .write_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(PortError::connection("injected store failure"));
            }
            self.working.apply(&op)?;
            self.staged.push(op);
            Ok(())
        }
    }

    #[async_trait]
    impl BillingTransaction for MockTransaction {
        async fn records_for_update(
            &mut self,
            email: &Email,
        ) -> Result<Vec<ObligationRecord>, PortError> {
            Ok(self
                .working
                .clients
                .values()
                .filter(|r| &r.email == email)
                .cloned()
                .collect())
        }

        async fn advisor_ids(
            &mut self,
            record_id: ClientRecordId,
        ) -> Result<Vec<AdvisorId>, PortError> {
            Ok(self
                .working
                .associations
                .iter()
                .filter(|(client, _)| *client == record_id)
                .map(|(_, advisor)| *advisor)
                .collect())
        }

        async fn adjust_received(
            &mut self,
            record_id: ClientRecordId,
            delta: Decimal,
        ) -> Result<(), PortError> {
            self.stage(StagedOp::Adjust { record_id, delta })
        }

        async fn insert_overflow(
            &mut self,
            record: &NewOverflowRecord,
        ) -> Result<ClientRecordId, PortError> {
            let id = ClientRecordId::new(self.store.next_id.fetch_add(1, Ordering::SeqCst));
            self.stage(StagedOp::Insert(ObligationRecord {
                id,
                email: record.email.clone(),
                payment_choice: record.payment_choice(),
                client_name_first: Some(record.client_name_first.clone()),
                client_name_last: Some(record.client_name_last.clone()),
                total_billing_amount: record.total_billing_amount(),
                total_payment_amount_received: record.total_payment_amount_received,
                payment_start_date: None,
            }))?;
            Ok(id)
        }

        async fn add_advisor(
            &mut self,
            record_id: ClientRecordId,
            advisor_id: AdvisorId,
        ) -> Result<(), PortError> {
            self.stage(StagedOp::Associate { record_id, advisor_id })
        }

        async fn delete_record(&mut self, record_id: ClientRecordId) -> Result<u64, PortError> {
            let removed = self
                .working
                .associations
                .iter()
                .filter(|(client, _)| *client == record_id)
                .count() as u64;
            self.stage(StagedOp::Delete { record_id })?;
            Ok(removed)
        }

        async fn commit(self: Box<Self>) -> Result<(), PortError> {
            let mut tables = self.store.tables.lock().await;
            let mut next = tables.clone();
            for op in &self.staged {
                next.apply(op)?;
            }
            *tables = next;
            self.store.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), PortError> {
            Ok(())
        }
    }
}

//! Domain Adapters
//!
//! Adapter implementations connecting domain ports to PostgreSQL.
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingStore;
//!
//! let store = PostgresBillingStore::new(pool).with_lock_timeout(Duration::from_secs(5));
//! let tx = store.begin(&email).await?;
//! ```

pub mod billing;

pub use billing::{PgBillingTransaction, PostgresBillingStore, DEFAULT_LOCK_TIMEOUT};

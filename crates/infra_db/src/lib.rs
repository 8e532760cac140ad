//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the payment allocation ledger, built on SQLx.
//!
//! # Architecture
//!
//! - [`repositories`] hold the SQL, one function per statement, running on a
//!   caller-supplied connection
//! - [`adapters`] implement the domain ports on top of them and own the
//!   transaction and locking protocol
//! - [`pool`] creates the connection pool and applies migrations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresBillingStore;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/ledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::PostgresBillingStore;
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::ClientRow;

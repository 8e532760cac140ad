//! Test Utilities Crate
//!
//! Shared test infrastructure for the payment allocation ledger.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built identities, records and webhook payloads
//! - `builders`: Builder for obligation and overflow records
//! - `database`: PostgreSQL testcontainer and seed helpers
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use generators::*;

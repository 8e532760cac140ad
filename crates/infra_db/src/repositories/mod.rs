//! Repository implementations for the ledger tables
//!
//! Repositories encapsulate SQL and map between database rows and domain
//! types. They take a borrowed connection so adapters decide the
//! transaction boundaries.

pub mod clients;

pub use clients::ClientRow;

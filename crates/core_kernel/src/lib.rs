//! Core Kernel - Foundational types for the payment allocation ledger
//!
//! This crate provides the building blocks shared by every other crate:
//! - Amount conversion between minor and major currency units
//! - Strongly-typed record identifiers and the email identity key
//! - Port error types and marker traits for the ports and adapters layout

pub mod money;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{MoneyError, from_minor_units, to_minor_units};
pub use identifiers::{ClientRecordId, AdvisorId, Email};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
pub use error::CoreError;

//! Data transfer objects
//!
//! Inbound webhook payloads and the response bodies returned to the sender.

pub mod events;

pub use events::*;

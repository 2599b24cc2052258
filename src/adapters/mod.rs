//! Adapters implementing the domain ports.

pub mod agents;
pub mod memory;
pub mod sinks;
pub mod sqlite;

//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//!
//! Storage and escalation delivery adapters live under `adapters`.

pub mod config;
pub mod logging;

//! CLI command implementations.

pub mod simulate;
pub mod validate;

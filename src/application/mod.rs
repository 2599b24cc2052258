//! Application layer: the coordinator facade collaborators talk to.

pub mod coordinator;

pub use coordinator::Coordinator;

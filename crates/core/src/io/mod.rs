//! Input/output layer: consumed evidence documents, produced documents,
//! and deterministic serialization.

pub mod loader;
pub mod schema;
pub mod writer;

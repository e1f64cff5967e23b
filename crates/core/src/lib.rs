//! align-core
//!
//! Core library for building a labeled dataset that correlates three
//! independently produced views of one compiled binary: ground-truth
//! debug-symbol identity (DWARF), a structural parse of the preprocessed
//! source, and a decompiler's reconstruction of the stripped binary.
//!
//! The crate hosts the two alignment engines (line-evidence scoring and
//! address-interval joining), eligibility and confidence classification,
//! an invariant auditor, deterministic IO for the produced documents, and
//! a small SQLite ledger of engine runs.
//!
//! All substantive logic lives here so it is fully testable and reusable
//! from multiple frontends (CLI, batch drivers, etc.).

pub mod addrjoin;
pub mod align;
pub mod db;
pub mod io;
pub mod model;
pub mod policy;
pub mod rank;
pub mod stats;

/// Package name stamped into every produced document.
pub const PACKAGE_NAME: &str = "symjoin";

/// Schema version of the produced documents.
pub const SCHEMA_VERSION: &str = "1.0";

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

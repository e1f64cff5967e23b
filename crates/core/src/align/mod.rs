//! Source-alignment joiner: maps debug-symbol functions to parsed
//! source spans by line-attribution overlap.
//!
//! Pipeline: per-TU origin maps ([`origin_map`]) -> candidate scoring and
//! selection ([`candidate`]) -> verdict assembly and reporting ([`join`]).

pub mod candidate;
pub mod join;
pub mod origin_map;

pub use candidate::{score_candidates, select_best, Candidate, SpanInfo};
pub use join::run_alignment;
pub use origin_map::{build_origin_map, OriginMap};

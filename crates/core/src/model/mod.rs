//! Shared value types for the three evidence views.
//!
//! These are the building blocks both engines agree on: byte intervals,
//! oracle verdicts, the per-line instruction-attribution multiset, and
//! source declaration sites. Everything here is a plain value -- no IO,
//! no derived state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Half-open byte interval `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressRange {
    pub low: u64,
    pub high: u64,
}

impl AddressRange {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// Interval length in bytes. Zero for degenerate intervals.
    pub fn size(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    /// Number of bytes shared with `other` (zero when disjoint).
    pub fn overlap_bytes(&self, other: &AddressRange) -> u64 {
        let start = self.low.max(other.low);
        let end = self.high.min(other.high);
        end.saturating_sub(start)
    }
}

/// Verdict assigned to a function by the debug-symbol oracle.
///
/// REJECT functions never enter either joiner; they are retained as
/// non-target entries for lifecycle accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OracleVerdict {
    Accept,
    Warn,
    Reject,
}

impl OracleVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleVerdict::Accept => "ACCEPT",
            OracleVerdict::Warn => "WARN",
            OracleVerdict::Reject => "REJECT",
        }
    }

    /// Parse an oracle verdict string; anything unrecognized is REJECT,
    /// so a malformed upstream row can never become a join target.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "ACCEPT" => OracleVerdict::Accept,
            "WARN" => OracleVerdict::Warn,
            _ => OracleVerdict::Reject,
        }
    }
}

/// Key of the line-attribution multiset: one original source line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineKey {
    pub file: String,
    pub line: u32,
}

impl LineKey {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

/// Multiset of instructions attributed per original (file, line).
///
/// The count is the number of instructions the compiler attributed to
/// that line -- it must be summed as-is during overlap scoring, never
/// collapsed to presence.
pub type EvidenceMultiset = BTreeMap<LineKey, u64>;

/// Sum of all attribution counts in a multiset.
pub fn evidence_total(evidence: &EvidenceMultiset) -> u64 {
    evidence.values().sum()
}

/// Source declaration site propagated from the debug oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclSite {
    #[serde(default)]
    pub decl_file: Option<String>,
    #[serde(default)]
    pub decl_line: Option<u32>,
    #[serde(default)]
    pub decl_column: Option<u32>,
    #[serde(default)]
    pub comp_dir: Option<String>,
}

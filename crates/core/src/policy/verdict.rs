//! Verdict and match-kind classification for both joiners.
//!
//! Pure functions; no IO, no state. The high-confidence ladder reports
//! which gate failed first so a row's rejection is diagnosable without
//! re-running the pipeline.

use serde::{Deserialize, Serialize};

use crate::model::OracleVerdict;

/// Final alignment verdict for one debug function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlignVerdict {
    Match,
    Ambiguous,
    NoMatch,
}

impl AlignVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignVerdict::Match => "MATCH",
            AlignVerdict::Ambiguous => "AMBIGUOUS",
            AlignVerdict::NoMatch => "NO_MATCH",
        }
    }
}

/// Pairing-strength classification of the address join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    JoinedStrong,
    JoinedWeak,
    MultiMatch,
    NoMatch,
    NoRange,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::JoinedStrong => "JOINED_STRONG",
            MatchKind::JoinedWeak => "JOINED_WEAK",
            MatchKind::MultiMatch => "MULTI_MATCH",
            MatchKind::NoMatch => "NO_MATCH",
            MatchKind::NoRange => "NO_RANGE",
        }
    }

    /// True for JOINED_STRONG and JOINED_WEAK.
    pub fn is_joined(&self) -> bool {
        matches!(self, MatchKind::JoinedStrong | MatchKind::JoinedWeak)
    }
}

/// Reason tags attached to alignment verdicts.
pub mod reason {
    pub const UNIQUE_BEST: &str = "UNIQUE_BEST";
    pub const NEAR_TIE: &str = "NEAR_TIE";
    pub const NO_CANDIDATES: &str = "NO_CANDIDATES";
    pub const LOW_OVERLAP_RATIO: &str = "LOW_OVERLAP_RATIO";
    pub const ORIGIN_MAP_MISSING: &str = "ORIGIN_MAP_MISSING";
    pub const PC_LINE_GAP: &str = "PC_LINE_GAP";
    pub const HEADER_REPLICATION_COLLISION: &str = "HEADER_REPLICATION_COLLISION";
    pub const MULTI_FILE_RANGE_PROPAGATED: &str = "MULTI_FILE_RANGE_PROPAGATED";
    /// Oracle-side reason this joiner reacts to (set upstream).
    pub const MULTI_FILE_RANGE: &str = "MULTI_FILE_RANGE";
}

/// Warning tags attached to address-join results.
pub mod join_warning {
    pub const DWARF_RANGE_MISSING: &str = "DWARF_RANGE_MISSING";
    pub const NO_GHIDRA_OVERLAP: &str = "NO_GHIDRA_OVERLAP";
    pub const NEAR_TIE_CANDIDATES: &str = "NEAR_TIE_CANDIDATES";
    pub const LOW_PC_OVERLAP: &str = "LOW_PC_OVERLAP";
}

/// Classify a debug->decompiler mapping by PC-range overlap.
///
/// A near-tie forces MULTI_MATCH unconditionally: when two decompiled
/// bodies cover the debug range almost equally, picking either would be
/// arbitrary, and arbitrary picks are worse than an explicit ambiguity.
pub fn classify_match_kind(
    pc_overlap_ratio: f64,
    n_near_ties: u32,
    has_range: bool,
    strong_threshold: f64,
    weak_threshold: f64,
) -> MatchKind {
    if !has_range {
        return MatchKind::NoRange;
    }
    if pc_overlap_ratio <= 0.0 {
        return MatchKind::NoMatch;
    }
    if n_near_ties >= 1 {
        return MatchKind::MultiMatch;
    }
    if pc_overlap_ratio >= strong_threshold {
        return MatchKind::JoinedStrong;
    }
    if pc_overlap_ratio >= weak_threshold {
        return MatchKind::JoinedWeak;
    }
    MatchKind::NoMatch
}

/// Minimum alignment overlap ratio accepted by the high-confidence gate.
pub const HC_ALIGN_RATIO_THRESHOLD: f64 = 0.95;

/// Gate names, in ladder order, as reported in `hc_reject_reason` and
/// mirrored by the confidence funnel.
pub mod gate {
    pub const ORACLE_ACCEPT: &str = "ORACLE_ACCEPT";
    pub const ALIGN_MATCH: &str = "ALIGN_MATCH";
    pub const ALIGN_UNIQUE: &str = "ALIGN_UNIQUE";
    pub const ALIGN_RATIO: &str = "ALIGN_RATIO";
    pub const JOINED_STRONG: &str = "JOINED_STRONG";
    pub const NOT_NOISE: &str = "NOT_NOISE";
    pub const CFG_NOT_LOW: &str = "CFG_NOT_LOW";
    pub const NO_FATAL_WARNING: &str = "NO_FATAL_WARNING";
}

/// Everything the high-confidence ladder looks at for one row.
#[derive(Debug, Clone)]
pub struct ConfidenceEvidence<'a> {
    pub oracle_verdict: OracleVerdict,
    pub align_verdict: Option<AlignVerdict>,
    pub align_n_candidates: Option<u32>,
    pub align_overlap_ratio: Option<f64>,
    pub match_kind: MatchKind,
    pub is_external_block: bool,
    pub is_thunk: bool,
    pub is_aux_function: bool,
    pub is_import_proxy: bool,
    pub cfg_completeness: Option<&'a str>,
    pub warning_tags: &'a [String],
    pub fatal_warnings: &'a [String],
}

/// Ordered high-confidence gate ladder.
///
/// Returns whether the row qualifies and, when it does not, the name of
/// the first gate it failed. High-confidence rows form the GOLD tier --
/// evaluation ground truth where alignment certainty must be maximal.
pub fn high_confidence(ev: &ConfidenceEvidence<'_>) -> (bool, Option<&'static str>) {
    if ev.oracle_verdict != OracleVerdict::Accept {
        return (false, Some(gate::ORACLE_ACCEPT));
    }
    if ev.align_verdict != Some(AlignVerdict::Match) {
        return (false, Some(gate::ALIGN_MATCH));
    }
    if ev.align_n_candidates != Some(1) {
        return (false, Some(gate::ALIGN_UNIQUE));
    }
    match ev.align_overlap_ratio {
        Some(r) if r >= HC_ALIGN_RATIO_THRESHOLD => {}
        _ => return (false, Some(gate::ALIGN_RATIO)),
    }
    if ev.match_kind != MatchKind::JoinedStrong {
        return (false, Some(gate::JOINED_STRONG));
    }
    if ev.is_external_block || ev.is_thunk || ev.is_aux_function || ev.is_import_proxy {
        return (false, Some(gate::NOT_NOISE));
    }
    if ev.cfg_completeness == Some("LOW") {
        return (false, Some(gate::CFG_NOT_LOW));
    }
    if ev.warning_tags.iter().any(|w| ev.fatal_warnings.contains(w)) {
        return (false, Some(gate::NO_FATAL_WARNING));
    }
    (true, None)
}

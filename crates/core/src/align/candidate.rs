//! Candidate generation and overlap scoring.
//!
//! For one debug function, every parsed source span in a TU is scored by
//! scanning the span's preprocessed lines through the origin map and
//! summing the attribution counts of the original lines that hit the
//! function's evidence multiset. The full multiplicity is added on every
//! hit -- a line with four attributed instructions contributes four, not
//! one -- because multiplicity encodes how much of the function's body a
//! span actually covers.

use std::cmp::Ordering;

use crate::align::origin_map::OriginMap;
use crate::model::{evidence_total, EvidenceMultiset, LineKey};
use crate::policy::verdict::reason;
use crate::rank::{cmp_score_desc, RankedCandidate};
use crate::stats::round6;

/// Minimal parsed-span data needed for candidate scoring.
#[derive(Debug, Clone)]
pub struct SpanInfo {
    pub span_id: String,
    pub tu_path: String,
    pub name: Option<String>,
    pub content_hash: String,
    /// 0-based preprocessed line bounds, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u64,
    pub end_byte: u64,
}

/// One scored alignment candidate: a source span for one debug function.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub span_id: String,
    pub tu_path: String,
    pub name: Option<String>,
    pub content_hash: String,

    /// Evidence multiplicity covered by this span.
    pub overlap_count: u64,
    /// Total evidence multiplicity of the debug function.
    pub total_count: u64,
    /// `overlap_count / total_count`, rounded to six decimals.
    pub overlap_ratio: f64,
    /// `total_count - overlap_count`.
    pub gap_count: u64,

    /// Span extent for tie-breaking.
    pub span_size: u64,
    pub start_byte: u64,
}

impl RankedCandidate for Candidate {
    /// Best-first order: highest overlap_ratio, then highest
    /// overlap_count, then smallest span, then (tu_path, start_byte)
    /// for a stable, total tie-break.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        cmp_score_desc(self.overlap_ratio, other.overlap_ratio)
            .then_with(|| other.overlap_count.cmp(&self.overlap_count))
            .then_with(|| self.span_size.cmp(&other.span_size))
            .then_with(|| self.tu_path.cmp(&other.tu_path))
            .then_with(|| self.start_byte.cmp(&other.start_byte))
    }
}

/// Score all spans of one TU against a debug function's line evidence.
///
/// Returns one candidate per span with `overlap_count > 0`, unsorted.
/// A function with zero total evidence yields no candidates. Never fails.
pub fn score_candidates(
    evidence: &EvidenceMultiset,
    spans: &[SpanInfo],
    origin_map: &OriginMap,
) -> Vec<Candidate> {
    let total_count = evidence_total(evidence);
    if total_count == 0 {
        return Vec::new();
    }

    let mut results = Vec::new();

    for span in spans {
        let mut overlap_count: u64 = 0;
        for line in span.start_line..=span.end_line {
            let Some((file, orig_line)) = origin_map.lookup(line as usize) else {
                continue;
            };
            let key = LineKey::new(file, orig_line);
            if let Some(count) = evidence.get(&key) {
                overlap_count += count;
            }
        }

        if overlap_count == 0 {
            continue;
        }

        results.push(Candidate {
            span_id: span.span_id.clone(),
            tu_path: span.tu_path.clone(),
            name: span.name.clone(),
            content_hash: span.content_hash.clone(),
            overlap_count,
            total_count,
            overlap_ratio: round6(overlap_count as f64 / total_count as f64),
            gap_count: total_count - overlap_count,
            span_size: span.end_byte.saturating_sub(span.start_byte),
            start_byte: span.start_byte,
        });
    }

    results
}

/// Select the best candidate and collect the verdict reasons.
///
/// `candidates` must already be sorted best-first. Returns the best
/// candidate (if one survives the minimum-lines cut), the near-tie set
/// (competitors within `epsilon` of the best ratio), and reason tags.
/// A below-threshold best is kept for transparency with the
/// `LOW_OVERLAP_RATIO` tag; the caller maps that to NO_MATCH.
pub fn select_best(
    candidates: &[Candidate],
    overlap_threshold: f64,
    epsilon: f64,
    min_overlap_lines: u64,
) -> (Option<Candidate>, Vec<Candidate>, Vec<&'static str>) {
    let mut reasons = Vec::new();

    let Some(best) = candidates.first() else {
        reasons.push(reason::NO_CANDIDATES);
        return (None, Vec::new(), reasons);
    };

    if best.overlap_count < min_overlap_lines {
        reasons.push(reason::NO_CANDIDATES);
        return (None, Vec::new(), reasons);
    }

    if best.overlap_ratio < overlap_threshold {
        reasons.push(reason::LOW_OVERLAP_RATIO);
    }

    let near_ties: Vec<Candidate> = candidates[1..]
        .iter()
        .filter(|c| (c.overlap_ratio - best.overlap_ratio).abs() <= epsilon)
        .cloned()
        .collect();

    if !near_ties.is_empty() {
        reasons.push(reason::NEAR_TIE);
    } else if !reasons.contains(&reason::LOW_OVERLAP_RATIO) {
        reasons.push(reason::UNIQUE_BEST);
    }

    if best.gap_count > 0 {
        reasons.push(reason::PC_LINE_GAP);
    }

    (Some(best.clone()), near_ties, reasons)
}

/// Header-replication check: the best candidate and every near-tie carry
/// the same content hash but live in different TUs. The same textual
/// function was compiled into several translation units, so no span is
/// more "the" definition than another.
pub fn detect_header_replication(best: &Candidate, near_ties: &[Candidate]) -> bool {
    !near_ties.is_empty()
        && near_ties
            .iter()
            .all(|tie| tie.content_hash == best.content_hash && tie.tu_path != best.tu_path)
}

//! Interval-overlap join between debug address ranges and decompiler
//! body intervals.
//!
//! For every debug function with usable ranges, scan the sorted interval
//! index per sub-range and accumulate overlap bytes per decompiler
//! function id -- this handles both fragmented debug ranges and oversized
//! decompiler bodies that swallow several source functions. Pure
//! function of the two tables and the profile; no side effects.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::info;

use crate::addrjoin::tables::{DwarfFunctionRow, GhidraFunctionRow, IntervalEntry};
use crate::model::AddressRange;
use crate::policy::profile::AddressJoinProfile;
use crate::policy::verdict::{classify_match_kind, join_warning, MatchKind};
use crate::rank::{sort_ranked, RankedCandidate};

/// One decompiler function overlapping a debug function's ranges.
#[derive(Debug, Clone)]
pub struct OverlapCandidate {
    pub function_id: String,
    pub entry_va: u64,
    pub name: String,
    pub overlap_bytes: u64,
    pub is_thunk: bool,
    pub is_external_block: bool,
    /// First range low of the debug function, for the distance tie-break.
    debug_low: u64,
}

impl RankedCandidate for OverlapCandidate {
    /// Best-first order: most overlap bytes, then entry closest to the
    /// debug low address, then non-thunk, then non-external, then
    /// (entry_va, function_id) for a total tie-break.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .overlap_bytes
            .cmp(&self.overlap_bytes)
            .then_with(|| {
                self.entry_va
                    .abs_diff(self.debug_low)
                    .cmp(&other.entry_va.abs_diff(other.debug_low))
            })
            .then_with(|| self.is_thunk.cmp(&other.is_thunk))
            .then_with(|| self.is_external_block.cmp(&other.is_external_block))
            .then_with(|| self.entry_va.cmp(&other.entry_va))
            .then_with(|| self.function_id.cmp(&other.function_id))
    }
}

/// Join outcome for one debug function, before diagnostics.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub function_id: String,
    pub match_kind: MatchKind,

    pub ghidra_func_id: Option<String>,
    pub ghidra_entry_va: Option<u64>,
    pub ghidra_name: Option<String>,

    pub pc_overlap_bytes: u64,
    pub pc_overlap_ratio: f64,
    pub n_near_ties: u32,
    pub join_warnings: Vec<String>,
}

impl JoinOutcome {
    fn unmatched(function_id: &str, match_kind: MatchKind, warning: &str) -> Self {
        Self {
            function_id: function_id.to_string(),
            match_kind,
            ghidra_func_id: None,
            ghidra_entry_va: None,
            ghidra_name: None,
            pc_overlap_bytes: 0,
            pc_overlap_ratio: 0.0,
            n_near_ties: 0,
            join_warnings: vec![warning.to_string()],
        }
    }
}

/// Accumulate overlap bytes per decompiler function across all debug
/// sub-ranges.
///
/// The index is sorted by body start, so the scan per sub-range stops as
/// soon as an entry starts at or beyond the sub-range's high bound.
fn find_overlaps(
    ranges: &[AddressRange],
    interval_index: &[IntervalEntry],
) -> BTreeMap<String, u64> {
    let mut overlaps: BTreeMap<String, u64> = BTreeMap::new();

    for range in ranges {
        for entry in interval_index {
            if entry.body_start >= range.high {
                break;
            }
            if entry.body_end <= range.low {
                continue;
            }
            let body = AddressRange::new(entry.body_start, entry.body_end);
            let overlap_bytes = range.overlap_bytes(&body);
            if overlap_bytes > 0 {
                *overlaps.entry(entry.function_id.clone()).or_insert(0) += overlap_bytes;
            }
        }
    }

    overlaps
}

/// Execute the debug->decompiler mapping. One outcome per debug row.
///
/// Rows without usable ranges get NO_RANGE immediately -- no join is ever
/// fabricated for them. Near-ties force MULTI_MATCH.
pub fn join_dwarf_to_ghidra(
    dwarf_table: &BTreeMap<String, DwarfFunctionRow>,
    ghidra_table: &BTreeMap<String, GhidraFunctionRow>,
    interval_index: &[IntervalEntry],
    profile: &AddressJoinProfile,
) -> Vec<JoinOutcome> {
    let mut outcomes = Vec::with_capacity(dwarf_table.len());

    for (fid, drow) in dwarf_table {
        if !drow.has_range {
            outcomes.push(JoinOutcome::unmatched(
                fid,
                MatchKind::NoRange,
                join_warning::DWARF_RANGE_MISSING,
            ));
            continue;
        }

        let overlaps = find_overlaps(&drow.ranges, interval_index);
        if overlaps.is_empty() {
            outcomes.push(JoinOutcome::unmatched(
                fid,
                MatchKind::NoMatch,
                join_warning::NO_GHIDRA_OVERLAP,
            ));
            continue;
        }

        let debug_low = drow.low_pc.unwrap_or(0);
        let mut candidates: Vec<OverlapCandidate> = overlaps
            .iter()
            .filter_map(|(gfid, overlap_bytes)| {
                let grow = ghidra_table.get(gfid)?;
                Some(OverlapCandidate {
                    function_id: gfid.clone(),
                    entry_va: grow.entry_va,
                    name: grow.name.clone(),
                    overlap_bytes: *overlap_bytes,
                    is_thunk: grow.is_thunk,
                    is_external_block: grow.is_external_block,
                    debug_low,
                })
            })
            .collect();

        if candidates.is_empty() {
            outcomes.push(JoinOutcome::unmatched(
                fid,
                MatchKind::NoMatch,
                join_warning::NO_GHIDRA_OVERLAP,
            ));
            continue;
        }

        sort_ranked(&mut candidates);
        let best = &candidates[0];
        let best_overlap = best.overlap_bytes;
        let pc_ratio = best_overlap as f64 / drow.total_range_bytes.max(1) as f64;

        // Near-tie margin is relative to the best candidate's overlap.
        let margin = best_overlap as f64 * profile.near_tie_epsilon;
        let n_near_ties = candidates[1..]
            .iter()
            .filter(|c| (best_overlap - c.overlap_bytes) as f64 <= margin)
            .count() as u32;

        let match_kind = classify_match_kind(
            pc_ratio,
            n_near_ties,
            true,
            profile.strong_overlap_threshold,
            profile.weak_overlap_threshold,
        );

        let mut warnings = Vec::new();
        if n_near_ties > 0 {
            warnings.push(join_warning::NEAR_TIE_CANDIDATES.to_string());
        }
        if pc_ratio < profile.weak_overlap_threshold {
            warnings.push(join_warning::LOW_PC_OVERLAP.to_string());
        }

        outcomes.push(JoinOutcome {
            function_id: fid.clone(),
            match_kind,
            ghidra_func_id: Some(best.function_id.clone()),
            ghidra_entry_va: Some(best.entry_va),
            ghidra_name: Some(best.name.clone()),
            pc_overlap_bytes: best_overlap,
            pc_overlap_ratio: pc_ratio,
            n_near_ties,
            join_warnings: warnings,
        });
    }

    info!(n_processed = outcomes.len(), "interval join completed");
    outcomes
}

//! Address-join engine: maps debug-symbol functions to decompiler
//! functions by byte-range overlap, then classifies, tiers, and audits
//! the merged rows.
//!
//! Stages: table build ([`tables`]) -> eligibility stamping -> interval
//! join ([`engine`]) -> row diagnostics ([`diagnostics`]) -> report
//! assembly ([`report`]) -> invariant audit ([`invariants`]).

pub mod diagnostics;
pub mod engine;
pub mod invariants;
pub mod report;
pub mod tables;

use thiserror::Error;
use tracing::info;

use crate::io::loader::{CfgRecord, DebugFunctionsDoc, DecompFunctionRecord, VariableRecord};
use crate::io::schema::{AlignmentPairsDoc, BuildContext, JoinReport, JoinedFunctionRow};
use crate::policy::profile::AddressJoinProfile;

/// Fatal computation-corruption errors.
///
/// A derived bound escaping its mathematical range signals an upstream
/// defect that would silently poison every downstream experiment, so it
/// aborts the run instead of becoming a violation record.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error(
        "quality_weight out of [0,1] bounds: {value:.9} \
         (function_id={function_id}, overlap_ratio={overlap_ratio:?}, \
         n_candidates={n_candidates:?})"
    )]
    QualityWeightOutOfBounds {
        function_id: String,
        value: f64,
        overlap_ratio: Option<f64>,
        n_candidates: Option<u32>,
    },
}

/// Evidence tables consumed by one address-join run.
#[derive(Debug, Clone, Copy)]
pub struct AddressJoinInputs<'a> {
    pub debug_doc: &'a DebugFunctionsDoc,
    pub alignment: &'a AlignmentPairsDoc,
    pub decomp_functions: &'a [DecompFunctionRecord],
    pub decomp_cfg: &'a [CfgRecord],
    pub decomp_variables: &'a [VariableRecord],
    /// Image base to subtract from decompiler virtual addresses
    /// (position-independent binaries load at a synthetic base).
    pub image_base: u64,
}

/// Execute the full address join for one binary variant.
///
/// Pure function of its inputs and the profile. The returned rows are
/// unsorted; [`crate::io::writer::write_join_outputs`] sorts before
/// serialization. The report carries every invariant violation found,
/// row-level and report-level -- violations never abort the run.
pub fn run_address_join(
    inputs: AddressJoinInputs<'_>,
    ctx: &BuildContext,
    profile: &AddressJoinProfile,
) -> Result<(Vec<JoinedFunctionRow>, JoinReport), JoinError> {
    let mut dwarf_table = tables::build_dwarf_function_table(inputs.debug_doc, inputs.alignment)?;
    let (ghidra_table, interval_index) = tables::build_ghidra_function_table(
        inputs.decomp_functions,
        inputs.decomp_cfg,
        inputs.decomp_variables,
        inputs.image_base,
    );

    tables::apply_eligibility(&mut dwarf_table, &profile.aux_function_names);

    let outcomes = engine::join_dwarf_to_ghidra(&dwarf_table, &ghidra_table, &interval_index, profile);

    let mut rows =
        diagnostics::build_joined_function_rows(&outcomes, &dwarf_table, &ghidra_table, ctx, profile);

    let mut violations = invariants::check_rows(&rows, profile);

    let mut report = report::build_join_report(&rows, ctx, profile);
    violations.extend(invariants::check_report(&report));

    if !violations.is_empty() {
        tracing::warn!(n = violations.len(), "invariant violations detected");
    }
    report.invariant_violations = violations;

    info!(
        n_rows = rows.len(),
        n_joined = report.yield_counts.n_joined_to_ghidra,
        n_high_confidence = report.high_confidence.high_confidence_count,
        "address join finished"
    );

    // Keep row order deterministic even before the writer's final sort.
    rows.sort_by(|a, b| a.dwarf_function_id.cmp(&b.dwarf_function_id));

    Ok((rows, report))
}

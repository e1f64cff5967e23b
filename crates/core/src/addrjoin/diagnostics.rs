//! Post-join diagnostics: noise tagging, the high-confidence ladder,
//! confidence-tier assignment, quality flags, and many-to-one
//! relabeling. Converts engine outcomes into output rows.

use std::collections::BTreeMap;

use crate::addrjoin::engine::JoinOutcome;
use crate::addrjoin::tables::{DwarfFunctionRow, GhidraFunctionRow};
use crate::io::schema::{BuildContext, JoinedFunctionRow};
use crate::model::OracleVerdict;
use crate::policy::noise::normalize_versioned_name;
use crate::policy::profile::AddressJoinProfile;
use crate::policy::verdict::{high_confidence, ConfidenceEvidence, MatchKind};

/// Goto density above this flags `HIGH_GOTO_DENSITY`.
pub const HIGH_GOTO_DENSITY_THRESHOLD: f64 = 0.1;

/// Placeholder-type rate above this flags `HIGH_PLACEHOLDER_TYPES`.
pub const HIGH_PLACEHOLDER_THRESHOLD: f64 = 0.3;

/// Decompiler quality concern flags.
pub mod quality_flag {
    pub const CFG_LOW: &str = "CFG_LOW";
    pub const FATAL_WARNING: &str = "FATAL_WARNING";
    pub const HIGH_GOTO_DENSITY: &str = "HIGH_GOTO_DENSITY";
    pub const HIGH_PLACEHOLDER_TYPES: &str = "HIGH_PLACEHOLDER_TYPES";
}

/// True when the matched decompiler function's name is a known
/// auxiliary symbol (after version-suffix normalization).
fn classify_aux(ghidra_name: &str, aux_names: &[String]) -> bool {
    let norm = normalize_versioned_name(ghidra_name.trim());
    aux_names.iter().any(|aux| aux == norm)
}

/// Thunks and PLT stubs both proxy an import rather than carry a body.
fn classify_import_proxy(is_thunk: bool, is_plt_or_stub: bool) -> bool {
    is_thunk || is_plt_or_stub
}

/// Assign the confidence tier label.
///
/// GOLD -- high confidence. SILVER -- gold-eligible with a strong join
/// but some other gate failed. BRONZE -- joined at all (strong or weak)
/// without gold eligibility, or weakly joined even when gold-eligible.
/// Empty -- everything else (NO_RANGE, NO_MATCH, MULTI_MATCH).
pub fn assign_confidence_tier(
    is_high_confidence: bool,
    match_kind: MatchKind,
    eligible_for_gold: bool,
) -> &'static str {
    if is_high_confidence {
        return "GOLD";
    }
    if match_kind == MatchKind::JoinedStrong && eligible_for_gold {
        return "SILVER";
    }
    if match_kind.is_joined() {
        return "BRONZE";
    }
    ""
}

/// Detect when a function was already lost by an upstream stage.
fn detect_upstream_collapse(drow: &DwarfFunctionRow) -> Option<&'static str> {
    if !drow.has_range {
        return Some("NO_DWARF_RANGE");
    }
    if drow.is_non_target {
        return Some("ALIGNMENT_NON_TARGET");
    }
    if drow.oracle_verdict == OracleVerdict::Reject {
        return Some("DWARF_ORACLE_REJECT");
    }
    None
}

/// Collect decompiler quality concern flags for one row.
fn decompiler_quality_flags(
    cfg_completeness: Option<&str>,
    warning_tags: &[String],
    goto_count: u32,
    loc_decompiled: u32,
    placeholder_type_rate: f64,
    fatal_warnings: &[String],
) -> Vec<String> {
    let mut flags = Vec::new();
    if cfg_completeness == Some("LOW") {
        flags.push(quality_flag::CFG_LOW.to_string());
    }
    if warning_tags.iter().any(|w| fatal_warnings.contains(w)) {
        flags.push(quality_flag::FATAL_WARNING.to_string());
    }
    let goto_density = goto_count as f64 / loc_decompiled.max(1) as f64;
    if goto_density > HIGH_GOTO_DENSITY_THRESHOLD {
        flags.push(quality_flag::HIGH_GOTO_DENSITY.to_string());
    }
    if placeholder_type_rate > HIGH_PLACEHOLDER_THRESHOLD {
        flags.push(quality_flag::HIGH_PLACEHOLDER_TYPES.to_string());
    }
    flags
}

/// Many-to-one relabeling: index decompiler id -> debug members, then
/// flag every member of a group with two or more. Two passes over
/// immutable-then-mutable rows; no shared counter during the scan.
fn relabel_many_to_one(rows: &mut [JoinedFunctionRow]) {
    let mut members: BTreeMap<String, u32> = BTreeMap::new();
    for row in rows.iter() {
        if let Some(gfid) = &row.ghidra_func_id {
            *members.entry(gfid.clone()).or_insert(0) += 1;
        }
    }
    for row in rows.iter_mut() {
        if let Some(gfid) = &row.ghidra_func_id {
            let count = members[gfid];
            row.n_dwarf_funcs_per_ghidra_func = count;
            row.fat_function_multi_dwarf = count >= 2;
        }
    }
}

/// Convert engine outcomes to fully tagged output rows.
pub fn build_joined_function_rows(
    outcomes: &[JoinOutcome],
    dwarf_table: &BTreeMap<String, DwarfFunctionRow>,
    ghidra_table: &BTreeMap<String, GhidraFunctionRow>,
    ctx: &BuildContext,
    profile: &AddressJoinProfile,
) -> Vec<JoinedFunctionRow> {
    let mut rows = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        let Some(drow) = dwarf_table.get(&outcome.function_id) else { continue };
        let grow: Option<&GhidraFunctionRow> =
            outcome.ghidra_func_id.as_ref().and_then(|id| ghidra_table.get(id));

        let is_external_block = grow.is_some_and(|g| g.is_external_block);
        let is_thunk = grow.is_some_and(|g| g.is_thunk);
        let is_aux_function =
            classify_aux(grow.map_or("", |g| g.name.as_str()), &profile.aux_function_names);
        let is_import_proxy = classify_import_proxy(
            is_thunk,
            grow.is_some_and(|g| g.is_plt_or_stub),
        );

        let cfg_completeness = grow.map(|g| g.cfg_completeness.clone());
        let warning_tags = grow.map_or_else(Vec::new, |g| g.warnings.clone());
        let goto_count = grow.map_or(0, |g| g.goto_count);
        let loc_decompiled = grow.map_or(0, |g| g.c_line_count);
        let placeholder_type_rate = grow.map_or(0.0, |g| g.placeholder_type_rate);

        let (is_hc, hc_reject) = high_confidence(&ConfidenceEvidence {
            oracle_verdict: drow.oracle_verdict,
            align_verdict: drow.align_verdict,
            align_n_candidates: drow.align_n_candidates,
            align_overlap_ratio: drow.align_overlap_ratio,
            match_kind: outcome.match_kind,
            is_external_block,
            is_thunk,
            is_aux_function,
            is_import_proxy,
            cfg_completeness: cfg_completeness.as_deref(),
            warning_tags: &warning_tags,
            fatal_warnings: &profile.fatal_warnings,
        });
        // A gate pass without gold eligibility must not mint GOLD rows.
        let is_hc = is_hc && drow.eligible_for_gold;

        let tier = assign_confidence_tier(is_hc, outcome.match_kind, drow.eligible_for_gold);

        rows.push(JoinedFunctionRow {
            binary_sha256: ctx.binary_sha256.clone(),
            job_id: ctx.job_id.clone(),
            test_case: ctx.test_case.clone(),
            opt: ctx.opt.clone(),
            variant: ctx.variant.clone(),
            builder_profile_id: ctx.builder_profile_id.clone(),
            ghidra_binary_sha256: ctx.ghidra_binary_sha256.clone(),
            ghidra_variant: ctx.ghidra_variant.clone(),

            dwarf_function_id: drow.function_id.clone(),
            dwarf_function_name: drow.name.clone(),
            dwarf_function_name_norm: drow.name_norm.clone(),
            decl: drow.decl.clone(),
            low_pc: drow.low_pc,
            high_pc: drow.high_pc,
            dwarf_total_range_bytes: drow.total_range_bytes,
            dwarf_oracle_verdict: drow.oracle_verdict,

            align_verdict: drow.align_verdict,
            align_overlap_ratio: drow.align_overlap_ratio,
            align_gap_count: drow.align_gap_count,
            align_n_candidates: drow.align_n_candidates,
            quality_weight: drow.quality_weight,
            align_reason_tags: drow.align_reason_tags.clone(),

            ghidra_match_kind: outcome.match_kind,
            ghidra_func_id: outcome.ghidra_func_id.clone(),
            ghidra_entry_va: outcome.ghidra_entry_va,
            ghidra_name: outcome.ghidra_name.clone(),

            decompile_status: grow.map(|g| g.decompile_status.clone()),
            cfg_completeness,
            bb_count: grow.map(|g| g.bb_count),
            edge_count: grow.map(|g| g.edge_count),
            warning_tags: warning_tags.clone(),
            goto_count,
            loc_decompiled,
            temp_var_count: grow.map_or(0, |g| g.temp_var_count),
            placeholder_type_rate,

            pc_overlap_bytes: outcome.pc_overlap_bytes,
            pc_overlap_ratio: outcome.pc_overlap_ratio,
            n_near_ties: outcome.n_near_ties,
            join_warnings: outcome.join_warnings.clone(),

            n_dwarf_funcs_per_ghidra_func: 0,
            fat_function_multi_dwarf: false,

            is_high_confidence: is_hc,
            is_aux_function,
            is_import_proxy,
            is_external_block,
            is_non_target: drow.is_non_target,
            is_thunk,

            eligible_for_join: drow.eligible_for_join,
            eligible_for_gold: drow.eligible_for_gold,
            exclusion_reason: drow.exclusion_reason.clone(),

            confidence_tier: tier.to_string(),
            hc_reject_reason: hc_reject.map(str::to_string),
            upstream_collapse_reason: detect_upstream_collapse(drow).map(str::to_string),
            decompiler_quality_flags: decompiler_quality_flags(
                grow.map(|g| g.cfg_completeness.as_str()),
                &warning_tags,
                goto_count,
                loc_decompiled,
                placeholder_type_rate,
                &profile.fatal_warnings,
            ),
        });
    }

    relabel_many_to_one(&mut rows);
    rows
}

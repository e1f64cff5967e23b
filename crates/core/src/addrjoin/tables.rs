//! Function tables -- indexed lookup structures for the debug-symbol and
//! decompiler function inventories.
//!
//! The debug table merges oracle identity, integer-parsed address
//! ranges, and source-alignment evidence into one row per function. The
//! decompiler table carries rebased body intervals plus derived quality
//! metrics, and feeds a sorted interval index for the range scan.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::addrjoin::JoinError;
use crate::io::loader::{CfgRecord, DebugFunctionsDoc, DecompFunctionRecord, VariableRecord};
use crate::io::schema::{AlignmentPair, AlignmentPairsDoc};
use crate::model::{AddressRange, DeclSite, OracleVerdict};
use crate::policy::eligibility::classify_eligibility;
use crate::policy::verdict::AlignVerdict;

/// Tolerance for the quality-weight bounds check.
const QW_EPS: f64 = 1e-9;

/// Merged view of one debug-symbol function.
#[derive(Debug, Clone)]
pub struct DwarfFunctionRow {
    pub function_id: String,
    pub name: Option<String>,
    /// Lower-cased, trimmed name for normalized comparison.
    pub name_norm: Option<String>,
    pub decl: DeclSite,
    pub oracle_verdict: OracleVerdict,
    pub oracle_reasons: Vec<String>,

    pub ranges: Vec<AddressRange>,
    pub total_range_bytes: u64,
    pub has_range: bool,
    /// First range bounds, for convenience and tie-breaking.
    pub low_pc: Option<u64>,
    pub high_pc: Option<u64>,

    pub align_verdict: Option<AlignVerdict>,
    pub align_overlap_ratio: Option<f64>,
    pub align_gap_count: Option<u64>,
    pub align_n_candidates: Option<u32>,
    pub quality_weight: f64,
    pub align_reason_tags: Vec<String>,
    pub is_non_target: bool,

    // Stamped by apply_eligibility before the interval scan.
    pub eligible_for_join: bool,
    pub eligible_for_gold: bool,
    pub exclusion_reason: Option<String>,
}

/// Parse an oracle hex address string (`0x401000`).
fn parse_hex_va(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).ok()
}

/// Convert oracle range records to intervals, dropping anything
/// unparsable or non-positive.
fn parse_ranges(raw: &[crate::io::loader::RawRange]) -> Vec<AddressRange> {
    let mut parsed = Vec::new();
    for r in raw {
        match (parse_hex_va(&r.low), parse_hex_va(&r.high)) {
            (Some(low), Some(high)) if high > low => parsed.push(AddressRange::new(low, high)),
            (Some(_), Some(_)) => {}
            _ => warn!(low = %r.low, high = %r.high, "unparsable address range"),
        }
    }
    parsed
}

fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(|n| n.trim().to_lowercase())
}

/// Derive `quality_weight` from the alignment evidence.
///
/// `overlap_ratio / n_candidates` for MATCH rows, else 0. Values inside
/// the +/-1e-9 tolerance band are clamped to [0, 1]; anything further out
/// is a fatal upstream defect.
fn derive_quality_weight(
    function_id: &str,
    align_verdict: Option<AlignVerdict>,
    overlap_ratio: Option<f64>,
    n_candidates: Option<u32>,
) -> Result<f64, JoinError> {
    let (Some(AlignVerdict::Match), Some(ratio), Some(n)) =
        (align_verdict, overlap_ratio, n_candidates)
    else {
        return Ok(0.0);
    };
    if n == 0 {
        return Ok(0.0);
    }
    let qw = ratio / n as f64;
    if !(-QW_EPS..=1.0 + QW_EPS).contains(&qw) {
        return Err(JoinError::QualityWeightOutOfBounds {
            function_id: function_id.to_string(),
            value: qw,
            overlap_ratio,
            n_candidates,
        });
    }
    Ok(qw.clamp(0.0, 1.0))
}

/// Build the indexed debug function table from the oracle functions
/// document and the alignment pairs document.
pub fn build_dwarf_function_table(
    debug_doc: &DebugFunctionsDoc,
    alignment: &AlignmentPairsDoc,
) -> Result<BTreeMap<String, DwarfFunctionRow>, JoinError> {
    let align_idx: BTreeMap<&str, &AlignmentPair> =
        alignment.pairs.iter().map(|p| (p.function_id.as_str(), p)).collect();
    let non_target_ids: Vec<&str> =
        alignment.non_targets.iter().map(|nt| nt.function_id.as_str()).collect();

    let mut table = BTreeMap::new();

    for func in &debug_doc.functions {
        if func.function_id.is_empty() {
            continue;
        }

        let ranges = parse_ranges(&func.ranges);
        let total_range_bytes: u64 = ranges.iter().map(AddressRange::size).sum();
        let has_range = !ranges.is_empty() && total_range_bytes > 0;

        let pair = align_idx.get(func.function_id.as_str());
        let align_verdict = pair.map(|p| p.verdict);
        let align_overlap_ratio = pair.map(|p| p.overlap_ratio);
        let align_gap_count = pair.map(|p| p.gap_count);
        let align_n_candidates = pair.and_then(|p| {
            let n = p.candidates.len() as u32;
            (n > 0).then_some(n)
        });
        let align_reason_tags = match pair {
            Some(p) => p.reasons.clone(),
            None => alignment
                .non_targets
                .iter()
                .find(|nt| nt.function_id == func.function_id)
                .map(|nt| nt.oracle_reasons.clone())
                .unwrap_or_default(),
        };

        let quality_weight = derive_quality_weight(
            &func.function_id,
            align_verdict,
            align_overlap_ratio,
            align_n_candidates,
        )?;

        let name = func.display_name().map(str::to_string);

        let row = DwarfFunctionRow {
            function_id: func.function_id.clone(),
            name_norm: normalize_name(name.as_deref()),
            name,
            decl: func.decl.clone(),
            oracle_verdict: OracleVerdict::parse_lenient(&func.verdict),
            oracle_reasons: func.reasons.clone(),
            low_pc: ranges.first().map(|r| r.low),
            high_pc: ranges.first().map(|r| r.high),
            ranges,
            total_range_bytes,
            has_range,
            align_verdict,
            align_overlap_ratio,
            align_gap_count,
            align_n_candidates,
            quality_weight,
            align_reason_tags,
            // A rangeless function in the non-target list is NO_RANGE,
            // not policy NON_TARGET -- eligibility checks has_range first.
            is_non_target: non_target_ids.contains(&func.function_id.as_str()) && has_range,
            eligible_for_join: true,
            eligible_for_gold: false,
            exclusion_reason: None,
        };
        table.insert(row.function_id.clone(), row);
    }

    Ok(table)
}

// Decompiler function table

/// Merged view of one decompiled function with derived metrics.
#[derive(Debug, Clone)]
pub struct GhidraFunctionRow {
    pub function_id: String,
    pub entry_va: u64,
    pub entry_hex: String,
    pub name: String,
    pub namespace: Option<String>,

    pub body: Option<AddressRange>,
    pub size_bytes: Option<u64>,

    pub is_external_block: bool,
    pub is_thunk: bool,
    pub is_import: bool,
    pub is_plt_or_stub: bool,
    pub is_init_fini_aux: bool,
    pub is_compiler_aux: bool,
    pub is_library_like: bool,

    pub decompile_status: String,
    pub verdict: String,
    pub warnings: Vec<String>,

    pub c_line_count: u32,
    pub goto_count: u32,
    pub goto_density: f64,
    pub temp_var_count: u32,
    pub asm_insn_count: u32,
    pub insn_to_c_ratio: f64,

    pub total_vars_in_func: u32,
    pub placeholder_type_rate: f64,

    pub bb_count: u32,
    pub edge_count: u32,
    pub cyclomatic: u32,
    pub cfg_completeness: String,
    pub has_indirect_jumps: bool,

    pub fat_function_flag: bool,
}

/// Entry in the sorted body-range interval index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalEntry {
    pub body_start: u64,
    pub body_end: u64,
    pub function_id: String,
}

/// Count `goto` tokens (word-boundary matches) in decompiled C.
fn count_goto_tokens(c_raw: &str) -> u32 {
    let bytes = c_raw.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut count = 0u32;
    for (idx, _) in c_raw.match_indices("goto") {
        let before_ok = idx == 0 || !is_word(bytes[idx - 1]);
        let after = idx + 4;
        let after_ok = after >= bytes.len() || !is_word(bytes[after]);
        if before_ok && after_ok {
            count += 1;
        }
    }
    count
}

/// Placeholder decompiler types: `undefined`, `undefined4`, ...
fn is_placeholder_type(type_str: &str) -> bool {
    let lower = type_str.to_ascii_lowercase();
    match lower.strip_prefix("undefined") {
        Some(rest) => rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Build the indexed decompiler function table plus the interval index.
///
/// `image_base` is subtracted from every virtual address so decompiler
/// addresses line up with the raw VAs the debug oracle reports.
pub fn build_ghidra_function_table(
    functions: &[DecompFunctionRecord],
    cfg: &[CfgRecord],
    variables: &[VariableRecord],
    image_base: u64,
) -> (BTreeMap<String, GhidraFunctionRow>, Vec<IntervalEntry>) {
    if image_base != 0 {
        info!(image_base, "rebasing decompiler addresses");
    }

    let cfg_idx: BTreeMap<&str, &CfgRecord> =
        cfg.iter().filter(|c| !c.function_id.is_empty()).map(|c| (c.function_id.as_str(), c)).collect();

    // (total, placeholder) variable counts per function.
    let mut var_stats: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for v in variables {
        if v.function_id.is_empty() {
            continue;
        }
        let st = var_stats.entry(v.function_id.as_str()).or_insert((0, 0));
        st.0 += 1;
        if is_placeholder_type(&v.type_str) {
            st.1 += 1;
        }
    }

    let mut table = BTreeMap::new();
    let mut interval_index = Vec::new();

    for gf in functions {
        if gf.function_id.is_empty() {
            continue;
        }

        let entry_va = gf.entry_va.saturating_sub(image_base);
        let body_start = gf.body_start_va.map(|v| v.saturating_sub(image_base));
        let body_end = gf.body_end_va.map(|v| v.saturating_sub(image_base));
        let body = match (body_start, body_end) {
            (Some(start), Some(end)) => Some(AddressRange::new(start, end)),
            _ => None,
        };

        let goto_count = count_goto_tokens(&gf.c_raw);
        let goto_density = goto_count as f64 / gf.c_line_count.max(1) as f64;

        let (total_vars, placeholder_vars) =
            var_stats.get(gf.function_id.as_str()).copied().unwrap_or((0, 0));
        let placeholder_type_rate = placeholder_vars as f64 / total_vars.max(1) as f64;

        let cfg_row = cfg_idx.get(gf.function_id.as_str());

        let row = GhidraFunctionRow {
            function_id: gf.function_id.clone(),
            entry_va,
            entry_hex: gf.entry_hex.clone(),
            name: gf.name.clone(),
            namespace: gf.namespace.clone(),
            body,
            size_bytes: gf.size_bytes,
            is_external_block: gf.is_external_block,
            is_thunk: gf.is_thunk,
            is_import: gf.is_import,
            is_plt_or_stub: gf.is_plt_or_stub,
            is_init_fini_aux: gf.is_init_fini_aux,
            is_compiler_aux: gf.is_compiler_aux,
            is_library_like: gf.is_library_like,
            decompile_status: gf.decompile_status.clone(),
            verdict: gf.verdict.clone(),
            warnings: gf.warnings.clone(),
            c_line_count: gf.c_line_count,
            goto_count,
            goto_density,
            temp_var_count: gf.temp_var_count,
            asm_insn_count: gf.asm_insn_count,
            insn_to_c_ratio: gf.insn_to_c_ratio,
            total_vars_in_func: total_vars,
            placeholder_type_rate,
            bb_count: cfg_row.map_or(0, |c| c.bb_count),
            edge_count: cfg_row.map_or(0, |c| c.edge_count),
            cyclomatic: cfg_row.map_or(0, |c| c.cyclomatic),
            cfg_completeness: cfg_row
                .map_or_else(|| "HIGH".to_string(), |c| c.cfg_completeness.clone()),
            has_indirect_jumps: cfg_row.is_some_and(|c| c.has_indirect_jumps),
            fat_function_flag: gf.fat_function_flag,
        };

        if let Some(body) = row.body {
            if body.low < body.high {
                interval_index.push(IntervalEntry {
                    body_start: body.low,
                    body_end: body.high,
                    function_id: row.function_id.clone(),
                });
            }
        }
        table.insert(row.function_id.clone(), row);
    }

    interval_index.sort_by(|a, b| {
        a.body_start
            .cmp(&b.body_start)
            .then_with(|| a.body_end.cmp(&b.body_end))
            .then_with(|| a.function_id.cmp(&b.function_id))
    });

    info!(
        n_functions = table.len(),
        n_with_body = interval_index.len(),
        "decompiler function table built"
    );
    (table, interval_index)
}

// Eligibility stamping

/// Stamp `eligible_for_join`, `eligible_for_gold`, and
/// `exclusion_reason` on every row (in place). Runs before the interval
/// scan so later statistics exclude unjoinable rows by construction.
///
/// Returns a counter of exclusion reasons for reporting.
pub fn apply_eligibility(
    dwarf_table: &mut BTreeMap<String, DwarfFunctionRow>,
    aux_names: &[String],
) -> BTreeMap<String, u32> {
    let mut reason_counts: BTreeMap<String, u32> = BTreeMap::new();

    for row in dwarf_table.values_mut() {
        let (ej, eg, reason) = classify_eligibility(
            row.has_range,
            row.is_non_target,
            row.oracle_verdict,
            row.name.as_deref(),
            aux_names,
        );
        row.eligible_for_join = ej;
        row.eligible_for_gold = eg;
        row.exclusion_reason = reason.map(str::to_string);

        if let Some(reason) = reason {
            *reason_counts.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    let n_join = dwarf_table.values().filter(|r| r.eligible_for_join).count();
    let n_gold = dwarf_table.values().filter(|r| r.eligible_for_gold).count();
    info!(
        n_total = dwarf_table.len(),
        n_eligible_for_join = n_join,
        n_eligible_for_gold = n_gold,
        "eligibility stamped"
    );
    reason_counts
}

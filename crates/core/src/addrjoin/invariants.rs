//! Invariant auditor -- post-pipeline consistency checks.
//!
//! Runs after row assembly and again after report assembly. Each check
//! returns structured violation records; nothing here ever raises, so a
//! batch completes and defects are reviewed afterward.

use tracing::warn;

use crate::io::schema::{InvariantViolation, JoinReport, JoinedFunctionRow};
use crate::policy::profile::AddressJoinProfile;
use crate::policy::verdict::{AlignVerdict, MatchKind};

const RATIO_EPS: f64 = 1e-4;
const QW_FORMULA_EPS: f64 = 1e-9;

fn violation(check: &str, ids: Vec<String>, message: String) -> InvariantViolation {
    warn!(check, %message, "invariant violation");
    InvariantViolation::with_ids(check, ids, message)
}

/// Run all row-level checks. Returns a (possibly empty) violation list.
pub fn check_rows(
    rows: &[JoinedFunctionRow],
    profile: &AddressJoinProfile,
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    violations.extend(check_hc_implies_gold(rows));
    violations.extend(check_overlap_ratio_bounds(rows));
    violations.extend(check_no_range_has_no_match(rows));
    violations.extend(check_exclusion_reason_present(rows));
    violations.extend(check_quality_weight_formula(rows));
    violations.extend(check_match_kind_ratio_consistency(rows, profile));
    violations
}

/// High-confidence rows must be gold-eligible.
fn check_hc_implies_gold(rows: &[JoinedFunctionRow]) -> Vec<InvariantViolation> {
    let bad: Vec<String> = rows
        .iter()
        .filter(|r| r.is_high_confidence && !r.eligible_for_gold)
        .map(|r| r.dwarf_function_id.clone())
        .collect();
    if bad.is_empty() {
        return Vec::new();
    }
    vec![violation("hc_implies_gold", bad.clone(), format!("HC but not gold-eligible: {bad:?}"))]
}

/// `pc_overlap_ratio` must stay in [0, 1] (epsilon-tolerant).
fn check_overlap_ratio_bounds(rows: &[JoinedFunctionRow]) -> Vec<InvariantViolation> {
    let bad: Vec<String> = rows
        .iter()
        .filter(|r| r.pc_overlap_ratio < 0.0 || r.pc_overlap_ratio > 1.0 + RATIO_EPS)
        .map(|r| format!("{}={:.6}", r.dwarf_function_id, r.pc_overlap_ratio))
        .collect();
    if bad.is_empty() {
        return Vec::new();
    }
    vec![violation(
        "overlap_ratio_bounds",
        bad.clone(),
        format!("pc_overlap_ratio out of [0,1]: {bad:?}"),
    )]
}

/// NO_RANGE rows must not carry a matched decompiler id.
fn check_no_range_has_no_match(rows: &[JoinedFunctionRow]) -> Vec<InvariantViolation> {
    let bad: Vec<String> = rows
        .iter()
        .filter(|r| r.ghidra_match_kind == MatchKind::NoRange && r.ghidra_func_id.is_some())
        .map(|r| r.dwarf_function_id.clone())
        .collect();
    if bad.is_empty() {
        return Vec::new();
    }
    vec![violation(
        "no_range_no_match",
        bad.clone(),
        format!("NO_RANGE with matched decompiler id: {bad:?}"),
    )]
}

/// Every join-ineligible row must carry an exclusion reason.
fn check_exclusion_reason_present(rows: &[JoinedFunctionRow]) -> Vec<InvariantViolation> {
    let bad: Vec<String> = rows
        .iter()
        .filter(|r| !r.eligible_for_join && r.exclusion_reason.is_none())
        .map(|r| r.dwarf_function_id.clone())
        .collect();
    if bad.is_empty() {
        return Vec::new();
    }
    vec![violation(
        "exclusion_reason_present",
        bad.clone(),
        format!("ineligible without exclusion_reason: {bad:?}"),
    )]
}

/// `quality_weight` must echo its formula: `overlap_ratio /
/// n_candidates` for MATCH rows (clamped to [0, 1]), zero otherwise.
fn check_quality_weight_formula(rows: &[JoinedFunctionRow]) -> Vec<InvariantViolation> {
    let mut bad = Vec::new();
    for r in rows {
        let expected = match (r.align_verdict, r.align_overlap_ratio, r.align_n_candidates) {
            (Some(AlignVerdict::Match), Some(ratio), Some(n)) if n > 0 => {
                (ratio / n as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        };
        if (r.quality_weight - expected).abs() > QW_FORMULA_EPS {
            bad.push(format!(
                "{}: stored={:.9} expected={:.9}",
                r.dwarf_function_id, r.quality_weight, expected
            ));
        }
    }
    if bad.is_empty() {
        return Vec::new();
    }
    vec![violation(
        "quality_weight_formula",
        bad.clone(),
        format!("quality_weight does not match its formula: {bad:?}"),
    )]
}

/// `match_kind` must be consistent with the stored overlap ratio.
fn check_match_kind_ratio_consistency(
    rows: &[JoinedFunctionRow],
    profile: &AddressJoinProfile,
) -> Vec<InvariantViolation> {
    let mut bad = Vec::new();
    for r in rows {
        let ratio = r.pc_overlap_ratio;
        let consistent = match r.ghidra_match_kind {
            MatchKind::JoinedStrong => ratio >= profile.strong_overlap_threshold - RATIO_EPS,
            MatchKind::JoinedWeak => {
                ratio >= profile.weak_overlap_threshold - RATIO_EPS
                    && ratio < profile.strong_overlap_threshold + RATIO_EPS
            }
            MatchKind::NoRange => ratio == 0.0 && r.pc_overlap_bytes == 0,
            // MULTI_MATCH and NO_MATCH carry any ratio.
            MatchKind::MultiMatch | MatchKind::NoMatch => true,
        };
        if !consistent {
            bad.push(format!(
                "{}: {}={:.6}",
                r.dwarf_function_id,
                r.ghidra_match_kind.as_str(),
                ratio
            ));
        }
    }
    if bad.is_empty() {
        return Vec::new();
    }
    vec![violation(
        "match_kind_ratio_consistency",
        bad.clone(),
        format!("match_kind inconsistent with stored ratio: {bad:?}"),
    )]
}

// Report-level checks

/// Run all report-level checks. Returns a (possibly empty) violation list.
pub fn check_report(report: &JoinReport) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    violations.extend(check_exclusion_partition(report));
    violations.extend(check_funnel_monotonicity(report));
    violations.extend(check_verdict_histograms(report));
    violations.extend(check_quality_weight_bin_partition(report));
    violations.extend(check_quality_weight_audit(report));
    violations
}

/// Exclusion categories plus join-eligible rows must partition the total.
fn check_exclusion_partition(report: &JoinReport) -> Vec<InvariantViolation> {
    let es = &report.exclusion_summary;
    let expected = es.n_no_range + es.n_non_target + es.n_noise_aux + es.n_eligible_for_join;
    if expected == es.n_total_dwarf {
        return Vec::new();
    }
    vec![violation(
        "exclusion_partition",
        Vec::new(),
        format!(
            "exclusion partition mismatch: n_total_dwarf={} != n_no_range={} + \
             n_non_target={} + n_noise_aux={} + n_eligible_for_join={} = {}",
            es.n_total_dwarf,
            es.n_no_range,
            es.n_non_target,
            es.n_noise_aux,
            es.n_eligible_for_join,
            expected
        ),
    )]
}

/// Funnel gate counts must be non-increasing along the ladder.
fn check_funnel_monotonicity(report: &JoinReport) -> Vec<InvariantViolation> {
    let f = &report.confidence_funnel;
    let gates = [
        ("n_eligible_for_gold", f.n_eligible_for_gold),
        ("n_pass_oracle_accept", f.n_pass_oracle_accept),
        ("n_pass_align_match", f.n_pass_align_match),
        ("n_pass_align_unique", f.n_pass_align_unique),
        ("n_pass_align_ratio", f.n_pass_align_ratio),
        ("n_pass_joined_strong", f.n_pass_joined_strong),
        ("n_pass_not_noise", f.n_pass_not_noise),
        ("n_pass_cfg_not_low", f.n_pass_cfg_not_low),
        ("n_pass_no_fatal_warnings", f.n_pass_no_fatal_warnings),
        ("n_high_confidence", f.n_high_confidence),
    ];
    let mut violations = Vec::new();
    for window in gates.windows(2) {
        let (prev_name, prev) = window[0];
        let (curr_name, curr) = window[1];
        if curr > prev {
            violations.push(violation(
                "funnel_monotonicity",
                Vec::new(),
                format!("funnel not monotonic: {curr_name}={curr} > {prev_name}={prev}"),
            ));
        }
    }
    violations
}

/// Align-verdict histogram must be consistent with the exclusion summary
/// and must sum to the total.
fn check_verdict_histograms(report: &JoinReport) -> Vec<InvariantViolation> {
    let es = &report.exclusion_summary;
    let hist = &report.yield_by_align_verdict;
    let mut violations = Vec::new();

    let hist_no_range = hist.get("NO_RANGE").copied().unwrap_or(0);
    if hist_no_range != es.n_no_range {
        violations.push(violation(
            "verdict_vs_exclusion_no_range",
            Vec::new(),
            format!(
                "yield_by_align_verdict[NO_RANGE]={} != exclusion_summary.n_no_range={}",
                hist_no_range, es.n_no_range
            ),
        ));
    }

    let hist_non_target = hist.get("NON_TARGET").copied().unwrap_or(0);
    if hist_non_target != es.n_non_target {
        violations.push(violation(
            "verdict_vs_exclusion_non_target",
            Vec::new(),
            format!(
                "yield_by_align_verdict[NON_TARGET]={} != exclusion_summary.n_non_target={}",
                hist_non_target, es.n_non_target
            ),
        ));
    }

    let hist_sum: u32 = hist.values().sum();
    if hist_sum != es.n_total_dwarf {
        violations.push(violation(
            "verdict_histogram_sum",
            Vec::new(),
            format!("sum(yield_by_align_verdict)={hist_sum} != n_total_dwarf={}", es.n_total_dwarf),
        ));
    }

    violations
}

/// Quality-weight bins must partition all rows exactly.
fn check_quality_weight_bin_partition(report: &JoinReport) -> Vec<InvariantViolation> {
    let hist_sum: u32 = report.yield_by_quality_weight_bin.values().sum();
    let expected = report.exclusion_summary.n_total_dwarf;
    if hist_sum == expected {
        return Vec::new();
    }
    vec![violation(
        "qw_bin_partition",
        Vec::new(),
        format!("sum(yield_by_quality_weight_bin)={hist_sum} != n_total_dwarf={expected}"),
    )]
}

/// Audit counters must show every derived ratio inside [0, 1].
fn check_quality_weight_audit(report: &JoinReport) -> Vec<InvariantViolation> {
    let audit = &report.quality_weight_audit;
    let mut violations = Vec::new();
    if audit.n_quality_weight_gt_1 > 0 {
        violations.push(violation(
            "qw_bounds_gt1",
            Vec::new(),
            format!(
                "quality_weight > 1.0 in {} rows (max={:.9})",
                audit.n_quality_weight_gt_1, audit.max_quality_weight
            ),
        ));
    }
    if audit.n_quality_weight_lt_0 > 0 {
        violations.push(violation(
            "qw_bounds_lt0",
            Vec::new(),
            format!("quality_weight < 0.0 in {} rows", audit.n_quality_weight_lt_0),
        ));
    }
    if audit.n_align_overlap_ratio_gt_1 > 0 {
        violations.push(violation(
            "overlap_ratio_bounds_gt1",
            Vec::new(),
            format!(
                "align_overlap_ratio > 1.0 in {} rows (max={:.9})",
                audit.n_align_overlap_ratio_gt_1, audit.max_align_overlap_ratio
            ),
        ));
    }
    violations
}

//! Join-report assembly: yield counts, exclusion accounting, the
//! high-confidence slice, the confidence funnel, collision diagnostics,
//! stratified histograms, and decompiler quality distributions.

use std::collections::BTreeMap;

use crate::io::schema::{
    BuildContext, CollisionEntry, CollisionSummary, ConfidenceFunnel, DecompilerDistributions,
    ExclusionSummary, HighConfidenceSlice, JoinReport, JoinYieldCounts, JoinedFunctionRow,
    QualityWeightAudit,
};
use crate::model::OracleVerdict;
use crate::policy::eligibility::{EXCL_NOISE_AUX, EXCL_NON_TARGET, EXCL_NO_RANGE};
use crate::policy::profile::AddressJoinProfile;
use crate::policy::verdict::{AlignVerdict, MatchKind, HC_ALIGN_RATIO_THRESHOLD};
use crate::stats::{
    n_candidates_bin, overlap_ratio_bin, percentiles, quality_weight_bin_detailed, round6,
};

/// How many collision groups the report lists explicitly.
const TOP_COLLISIONS: usize = 5;

/// Gate-by-gate attrition over the gold-eligible rows.
///
/// Each gate filters the survivors of the previous one, so the counts
/// are non-increasing by construction; the invariant auditor re-checks
/// that property on the finished report.
fn build_confidence_funnel(
    rows: &[&JoinedFunctionRow],
    profile: &AddressJoinProfile,
) -> ConfidenceFunnel {
    let survivors: Vec<&JoinedFunctionRow> = rows.to_vec();

    let pass_oracle: Vec<_> = survivors
        .into_iter()
        .filter(|r| r.dwarf_oracle_verdict == OracleVerdict::Accept)
        .collect();
    let pass_align: Vec<_> = pass_oracle
        .iter()
        .copied()
        .filter(|r| r.align_verdict == Some(AlignVerdict::Match))
        .collect();
    let pass_unique: Vec<_> =
        pass_align.iter().copied().filter(|r| r.align_n_candidates == Some(1)).collect();
    let pass_ratio: Vec<_> = pass_unique
        .iter()
        .copied()
        .filter(|r| r.align_overlap_ratio.is_some_and(|v| v >= HC_ALIGN_RATIO_THRESHOLD))
        .collect();
    let pass_strong: Vec<_> = pass_ratio
        .iter()
        .copied()
        .filter(|r| r.ghidra_match_kind == MatchKind::JoinedStrong)
        .collect();
    let pass_noise: Vec<_> = pass_strong
        .iter()
        .copied()
        .filter(|r| {
            !(r.is_external_block || r.is_thunk || r.is_aux_function || r.is_import_proxy)
        })
        .collect();
    let pass_cfg: Vec<_> = pass_noise
        .iter()
        .copied()
        .filter(|r| r.cfg_completeness.as_deref() != Some("LOW"))
        .collect();
    let pass_fatal: Vec<_> = pass_cfg
        .iter()
        .copied()
        .filter(|r| !r.warning_tags.iter().any(|w| profile.fatal_warnings.contains(w)))
        .collect();

    ConfidenceFunnel {
        n_eligible_for_gold: rows.len() as u32,
        n_pass_oracle_accept: pass_oracle.len() as u32,
        n_pass_align_match: pass_align.len() as u32,
        n_pass_align_unique: pass_unique.len() as u32,
        n_pass_align_ratio: pass_ratio.len() as u32,
        n_pass_joined_strong: pass_strong.len() as u32,
        n_pass_not_noise: pass_noise.len() as u32,
        n_pass_cfg_not_low: pass_cfg.len() as u32,
        n_pass_no_fatal_warnings: pass_fatal.len() as u32,
        n_high_confidence: pass_fatal.len() as u32,
    }
}

/// Many-to-one collision diagnostics over the matched rows.
fn build_collision_summary(rows: &[JoinedFunctionRow]) -> CollisionSummary {
    let mut ghidra_to_dwarf: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for row in rows {
        if let Some(gfid) = &row.ghidra_func_id {
            ghidra_to_dwarf.entry(gfid).or_default().push(&row.dwarf_function_id);
        }
    }

    let multi: Vec<(&str, &Vec<&str>)> =
        ghidra_to_dwarf.iter().filter(|(_, ids)| ids.len() >= 2).map(|(g, v)| (*g, v)).collect();
    let max_per = ghidra_to_dwarf.values().map(Vec::len).max().unwrap_or(0);

    let mut ranked = multi.clone();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    CollisionSummary {
        n_unique_ghidra_funcs_matched: ghidra_to_dwarf.len() as u32,
        n_ghidra_funcs_with_multi_dwarf: multi.len() as u32,
        max_dwarf_per_ghidra: max_per as u32,
        top_collisions: ranked
            .into_iter()
            .take(TOP_COLLISIONS)
            .map(|(gfid, dids)| CollisionEntry {
                ghidra_func_id: gfid.to_string(),
                n_dwarf: dids.len() as u32,
                dwarf_ids: dids.iter().map(|s| s.to_string()).collect(),
            })
            .collect(),
    }
}

/// Assemble the join report from the finished rows.
pub fn build_join_report(
    rows: &[JoinedFunctionRow],
    ctx: &BuildContext,
    profile: &AddressJoinProfile,
) -> JoinReport {
    let n_total = rows.len() as u32;

    // Yield counts
    let mut match_counts: BTreeMap<String, u32> = BTreeMap::new();
    for r in rows {
        *match_counts.entry(r.ghidra_match_kind.as_str().to_string()).or_insert(0) += 1;
    }
    let count = |kind: MatchKind| match_counts.get(kind.as_str()).copied().unwrap_or(0);
    let n_strong = count(MatchKind::JoinedStrong);
    let n_weak = count(MatchKind::JoinedWeak);

    let yield_counts = JoinYieldCounts {
        n_dwarf_funcs: n_total,
        n_joined_to_ghidra: n_strong + n_weak,
        n_joined_strong: n_strong,
        n_joined_weak: n_weak,
        n_no_range: count(MatchKind::NoRange),
        n_multi_match: count(MatchKind::MultiMatch),
        n_no_match: count(MatchKind::NoMatch),
    };

    // Exclusion summary
    let mut by_exclusion_reason: BTreeMap<String, u32> = BTreeMap::new();
    let mut n_eligible_join = 0u32;
    let mut n_eligible_gold = 0u32;
    for r in rows {
        if let Some(reason) = &r.exclusion_reason {
            *by_exclusion_reason.entry(reason.clone()).or_insert(0) += 1;
        }
        if r.eligible_for_join {
            n_eligible_join += 1;
        }
        if r.eligible_for_gold {
            n_eligible_gold += 1;
        }
    }
    let excl_count = |key: &str| by_exclusion_reason.get(key).copied().unwrap_or(0);

    let exclusion_summary = ExclusionSummary {
        n_total_dwarf: n_total,
        n_no_range: excl_count(EXCL_NO_RANGE),
        n_non_target: excl_count(EXCL_NON_TARGET),
        n_noise_aux: excl_count(EXCL_NOISE_AUX),
        n_oracle_reject: rows
            .iter()
            .filter(|r| {
                r.eligible_for_join
                    && !r.eligible_for_gold
                    && r.dwarf_oracle_verdict != OracleVerdict::Accept
            })
            .count() as u32,
        n_eligible_for_join: n_eligible_join,
        n_eligible_for_gold: n_eligible_gold,
        by_exclusion_reason,
    };

    // High-confidence slice (denominator: gold-eligible)
    let hc_count = rows.iter().filter(|r| r.is_high_confidence).count() as u32;
    let mut by_opt_groups: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for r in rows {
        let entry = by_opt_groups.entry(r.opt.clone()).or_insert((0, 0));
        if r.is_high_confidence {
            entry.0 += 1;
        }
        if r.eligible_for_gold {
            entry.1 += 1;
        }
    }
    let high_confidence = HighConfidenceSlice {
        total: n_eligible_gold,
        high_confidence_count: hc_count,
        yield_rate: round6(hc_count as f64 / n_eligible_gold.max(1) as f64),
        by_opt: by_opt_groups
            .into_iter()
            .map(|(opt, (hc, gold))| (opt, round6(hc as f64 / gold.max(1) as f64)))
            .collect(),
    };

    // Confidence funnel over gold-eligible rows
    let gold_rows: Vec<&JoinedFunctionRow> = rows.iter().filter(|r| r.eligible_for_gold).collect();
    let confidence_funnel = build_confidence_funnel(&gold_rows, profile);

    // Stratifications + audit counters
    let mut yield_by_align: BTreeMap<String, u32> = BTreeMap::new();
    let mut yield_by_ncand: BTreeMap<String, u32> = BTreeMap::new();
    let mut yield_by_qw: BTreeMap<String, u32> = BTreeMap::new();
    let mut yield_by_overlap: BTreeMap<String, u32> = BTreeMap::new();
    let mut yield_by_opt: BTreeMap<String, u32> = BTreeMap::new();

    let mut audit = QualityWeightAudit::default();

    for r in rows {
        // Align-verdict histogram is exclusion-aware: excluded rows are
        // binned under their exclusion reason, not a verdict.
        let align_key = match &r.exclusion_reason {
            Some(reason) => reason.clone(),
            None => r.align_verdict.map_or("NONE".to_string(), |v| v.as_str().to_string()),
        };
        *yield_by_align.entry(align_key).or_insert(0) += 1;

        *yield_by_ncand.entry(n_candidates_bin(r.align_n_candidates).to_string()).or_insert(0) +=
            1;

        // quality_weight bins key off the debug-side range property
        // (exclusion_reason == NO_RANGE), not the join outcome.
        let dwarf_has_range = r.exclusion_reason.as_deref() != Some(EXCL_NO_RANGE);
        let is_match = r.align_verdict == Some(AlignVerdict::Match);
        let qw_for_bin = is_match.then_some(r.quality_weight);
        *yield_by_qw
            .entry(quality_weight_bin_detailed(qw_for_bin, dwarf_has_range, is_match).to_string())
            .or_insert(0) += 1;

        let ratio_for_bin = if is_match { r.align_overlap_ratio } else { None };
        *yield_by_overlap.entry(overlap_ratio_bin(ratio_for_bin).to_string()).or_insert(0) += 1;

        *yield_by_opt.entry(r.opt.clone()).or_insert(0) += 1;

        if r.quality_weight > 1.0 {
            audit.n_quality_weight_gt_1 += 1;
        }
        if r.quality_weight < 0.0 {
            audit.n_quality_weight_lt_0 += 1;
        }
        audit.max_quality_weight = audit.max_quality_weight.max(r.quality_weight);
        if let Some(ratio) = r.align_overlap_ratio {
            if ratio > 1.0 {
                audit.n_align_overlap_ratio_gt_1 += 1;
            }
            audit.max_align_overlap_ratio = audit.max_align_overlap_ratio.max(ratio);
        }
    }

    // Decompiler distributions over matched rows
    let joined: Vec<&JoinedFunctionRow> =
        rows.iter().filter(|r| r.ghidra_func_id.is_some()).collect();
    let mut cfg_counter: BTreeMap<String, u32> = BTreeMap::new();
    let mut warning_prevalence: BTreeMap<String, u32> = BTreeMap::new();
    let mut goto_densities = Vec::with_capacity(joined.len());
    let mut placeholder_rates = Vec::with_capacity(joined.len());
    for r in &joined {
        let cfg = r.cfg_completeness.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        *cfg_counter.entry(cfg).or_insert(0) += 1;
        for w in &r.warning_tags {
            *warning_prevalence.entry(w.clone()).or_insert(0) += 1;
        }
        goto_densities.push(r.goto_count as f64 / r.loc_decompiled.max(1) as f64);
        placeholder_rates.push(r.placeholder_type_rate);
    }
    let n_joined_total = joined.len().max(1) as f64;

    let decompiler = DecompilerDistributions {
        cfg_completeness_fractions: cfg_counter
            .into_iter()
            .map(|(k, v)| (k, round6(v as f64 / n_joined_total)))
            .collect(),
        warning_prevalence,
        goto_density_percentiles: percentiles(&goto_densities),
        placeholder_type_rate_percentiles: percentiles(&placeholder_rates),
        n_fat_functions: rows.iter().filter(|r| r.fat_function_multi_dwarf).count() as u32,
        n_many_to_one_ghidra_funcs: {
            let mut ids: Vec<&str> = rows
                .iter()
                .filter(|r| r.fat_function_multi_dwarf)
                .filter_map(|r| r.ghidra_func_id.as_deref())
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids.len() as u32
        },
    };

    let (package_name, joiner_version, schema_version) = crate::io::schema::contract_fields();

    JoinReport {
        package_name,
        joiner_version,
        schema_version,
        profile_id: profile.profile_id.clone(),
        binary_sha256: ctx.binary_sha256.clone(),
        build_context: ctx.clone(),
        yield_counts,
        high_confidence,
        exclusion_summary,
        confidence_funnel,
        collision_summary: build_collision_summary(rows),
        yield_by_align_verdict: yield_by_align,
        yield_by_n_candidates_bin: yield_by_ncand,
        yield_by_quality_weight_bin: yield_by_qw,
        yield_by_align_overlap_ratio_bin: yield_by_overlap,
        yield_by_opt,
        yield_by_match_kind: match_counts,
        quality_weight_audit: audit,
        decompiler,
        variable_join: Default::default(),
        invariant_violations: Vec::new(),
        timestamp: String::new(),
    }
}

use align_core::addrjoin::{invariants, run_address_join, AddressJoinInputs};
use align_core::io::loader::{DebugFunctionRecord, DebugFunctionsDoc, DecompFunctionRecord, RawRange};
use align_core::io::schema::{
    AlignmentPair, AlignmentPairsDoc, BuildContext, CandidateScore, NonTargetEntry,
};
use align_core::model::{DeclSite, OracleVerdict};
use align_core::policy::profile::AddressJoinProfile;
use align_core::policy::verdict::{AlignVerdict, MatchKind};

fn oracle(id: &str, verdict: &str, ranges: &[(u64, u64)]) -> DebugFunctionRecord {
    DebugFunctionRecord {
        function_id: id.to_string(),
        name: Some(id.to_string()),
        verdict: verdict.to_string(),
        ranges: ranges
            .iter()
            .map(|(low, high)| RawRange { low: format!("{low:#x}"), high: format!("{high:#x}") })
            .collect(),
        ..Default::default()
    }
}

fn match_pair(id: &str, ratio: f64, n_candidates: usize) -> AlignmentPair {
    AlignmentPair {
        function_id: id.to_string(),
        function_name: Some(id.to_string()),
        oracle_verdict: OracleVerdict::Accept,
        decl: DeclSite::default(),
        best_span_id: Some(format!("tu.i:0:40:{id}")),
        best_tu_path: Some("tu.i".to_string()),
        best_span_name: None,
        overlap_count: 4,
        total_count: 4,
        overlap_ratio: ratio,
        gap_count: 0,
        verdict: AlignVerdict::Match,
        reasons: vec!["UNIQUE_BEST".to_string()],
        candidates: (0..n_candidates)
            .map(|i| CandidateScore {
                span_id: format!("tu.i:{i}:40:h{i}"),
                tu_path: "tu.i".to_string(),
                name: None,
                content_hash: format!("h{i}"),
                overlap_count: 4,
                overlap_ratio: ratio,
                gap_count: 0,
            })
            .collect(),
    }
}

fn decomp(id: &str, low: u64, high: u64) -> DecompFunctionRecord {
    DecompFunctionRecord {
        function_id: id.to_string(),
        name: id.to_string(),
        entry_va: low,
        body_start_va: Some(low),
        body_end_va: Some(high),
        ..Default::default()
    }
}

/// A mixed population: one GOLD row, one WARN row, one rangeless
/// non-target, one unmatched row.
fn fixture() -> (DebugFunctionsDoc, AlignmentPairsDoc, Vec<DecompFunctionRecord>) {
    let debug_doc = DebugFunctionsDoc {
        binary_sha256: "sha".to_string(),
        functions: vec![
            oracle("f_gold", "ACCEPT", &[(0x1000, 0x1040)]),
            oracle("f_warn", "WARN", &[(0x2000, 0x2040)]),
            oracle("f_norange", "REJECT", &[]),
            oracle("f_lost", "ACCEPT", &[(0x9000, 0x9040)]),
        ],
        ..Default::default()
    };
    let alignment = AlignmentPairsDoc {
        package_name: String::new(),
        joiner_version: String::new(),
        schema_version: String::new(),
        profile_id: String::new(),
        binary_sha256: "sha".to_string(),
        build_id: None,
        oracle_profile_id: String::new(),
        source_profile_id: String::new(),
        pairs: vec![
            match_pair("f_gold", 1.0, 1),
            match_pair("f_warn", 1.0, 1),
            match_pair("f_lost", 1.0, 1),
        ],
        non_targets: vec![NonTargetEntry {
            function_id: "f_norange".to_string(),
            name: None,
            oracle_verdict: OracleVerdict::Reject,
            oracle_reasons: Vec::new(),
            decl: DeclSite::default(),
        }],
    };
    let decomp_functions = vec![decomp("g1", 0x1000, 0x1040), decomp("g2", 0x2000, 0x2040)];
    (debug_doc, alignment, decomp_functions)
}

fn run(
    debug_doc: &DebugFunctionsDoc,
    alignment: &AlignmentPairsDoc,
    decomp_functions: &[DecompFunctionRecord],
) -> (Vec<align_core::io::schema::JoinedFunctionRow>, align_core::io::schema::JoinReport) {
    run_address_join(
        AddressJoinInputs {
            debug_doc,
            alignment,
            decomp_functions,
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &BuildContext {
            binary_sha256: "sha".to_string(),
            job_id: "job1".to_string(),
            test_case: "t01".to_string(),
            opt: "O0".to_string(),
            variant: "debug".to_string(),
            builder_profile_id: "builder-v1".to_string(),
            ghidra_binary_sha256: None,
            ghidra_variant: None,
        },
        &AddressJoinProfile::v1(),
    )
    .unwrap()
}

#[test]
fn clean_pipeline_has_no_violations() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (_, report) = run(&debug_doc, &alignment, &decomp_functions);
    assert!(report.invariant_violations.is_empty(), "{:?}", report.invariant_violations);
}

#[test]
fn exclusion_categories_partition_the_total() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (_, report) = run(&debug_doc, &alignment, &decomp_functions);

    let es = &report.exclusion_summary;
    assert_eq!(es.n_total_dwarf, 4);
    assert_eq!(
        es.n_total_dwarf,
        es.n_no_range + es.n_non_target + es.n_noise_aux + es.n_eligible_for_join
    );
}

#[test]
fn yield_counts_cover_every_row() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (_, report) = run(&debug_doc, &alignment, &decomp_functions);

    let yc = &report.yield_counts;
    assert_eq!(yc.n_dwarf_funcs, 4);
    assert_eq!(
        yc.n_dwarf_funcs,
        yc.n_joined_strong + yc.n_joined_weak + yc.n_no_range + yc.n_multi_match + yc.n_no_match
    );
    assert_eq!(yc.n_joined_to_ghidra, yc.n_joined_strong + yc.n_joined_weak);
}

#[test]
fn funnel_is_monotone_and_ends_at_high_confidence() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (rows, report) = run(&debug_doc, &alignment, &decomp_functions);

    let f = &report.confidence_funnel;
    let gates = [
        f.n_eligible_for_gold,
        f.n_pass_oracle_accept,
        f.n_pass_align_match,
        f.n_pass_align_unique,
        f.n_pass_align_ratio,
        f.n_pass_joined_strong,
        f.n_pass_not_noise,
        f.n_pass_cfg_not_low,
        f.n_pass_no_fatal_warnings,
        f.n_high_confidence,
    ];
    for pair in gates.windows(2) {
        assert!(pair[1] <= pair[0], "funnel not monotone: {gates:?}");
    }
    let hc_rows = rows.iter().filter(|r| r.is_high_confidence).count() as u32;
    assert_eq!(f.n_high_confidence, hc_rows);
}

#[test]
fn histograms_sum_to_the_total() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (_, report) = run(&debug_doc, &alignment, &decomp_functions);

    let n = report.exclusion_summary.n_total_dwarf;
    assert_eq!(report.yield_by_align_verdict.values().sum::<u32>(), n);
    assert_eq!(report.yield_by_quality_weight_bin.values().sum::<u32>(), n);
    assert_eq!(report.yield_by_align_overlap_ratio_bin.values().sum::<u32>(), n);
    assert_eq!(report.yield_by_match_kind.values().sum::<u32>(), n);
    assert_eq!(report.yield_by_opt.values().sum::<u32>(), n);
}

#[test]
fn two_runs_produce_byte_identical_outputs() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (rows_a, report_a) = run(&debug_doc, &alignment, &decomp_functions);
    let (rows_b, report_b) = run(&debug_doc, &alignment, &decomp_functions);

    assert_eq!(
        serde_json::to_string(&rows_a).unwrap(),
        serde_json::to_string(&rows_b).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&report_a).unwrap(),
        serde_json::to_string(&report_b).unwrap()
    );
}

#[test]
fn doctored_rows_are_caught_by_the_row_auditor() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (rows, _) = run(&debug_doc, &alignment, &decomp_functions);
    let profile = AddressJoinProfile::v1();

    // HC without gold eligibility.
    let mut doctored = rows.clone();
    doctored[0].is_high_confidence = true;
    doctored[0].eligible_for_gold = false;
    let violations = invariants::check_rows(&doctored, &profile);
    assert!(violations.iter().any(|v| v.check == "hc_implies_gold"));

    // Ratio out of bounds.
    let mut doctored = rows.clone();
    doctored[0].pc_overlap_ratio = 1.5;
    let violations = invariants::check_rows(&doctored, &profile);
    assert!(violations.iter().any(|v| v.check == "overlap_ratio_bounds"));

    // NO_RANGE with a matched id.
    let mut doctored = rows.clone();
    doctored[0].ghidra_match_kind = MatchKind::NoRange;
    doctored[0].ghidra_func_id = Some("g1".to_string());
    let violations = invariants::check_rows(&doctored, &profile);
    assert!(violations.iter().any(|v| v.check == "no_range_no_match"));

    // Ineligible without a reason.
    let mut doctored = rows.clone();
    doctored[0].eligible_for_join = false;
    doctored[0].exclusion_reason = None;
    let violations = invariants::check_rows(&doctored, &profile);
    assert!(violations.iter().any(|v| v.check == "exclusion_reason_present"));

    // Quality weight diverging from its formula.
    let mut doctored = rows.clone();
    let target = doctored.iter_mut().find(|r| r.align_verdict == Some(AlignVerdict::Match)).unwrap();
    target.quality_weight = 0.123;
    let violations = invariants::check_rows(&doctored, &profile);
    assert!(violations.iter().any(|v| v.check == "quality_weight_formula"));

    // Strong match kind with a weak stored ratio.
    let mut doctored = rows.clone();
    let target = doctored.iter_mut().find(|r| r.ghidra_match_kind == MatchKind::JoinedStrong).unwrap();
    target.pc_overlap_ratio = 0.2;
    let violations = invariants::check_rows(&doctored, &profile);
    assert!(violations.iter().any(|v| v.check == "match_kind_ratio_consistency"));
}

#[test]
fn doctored_reports_are_caught_by_the_report_auditor() {
    let (debug_doc, alignment, decomp_functions) = fixture();
    let (_, report) = run(&debug_doc, &alignment, &decomp_functions);

    // Break the exclusion partition.
    let mut doctored = report.clone();
    doctored.exclusion_summary.n_no_range += 1;
    let violations = invariants::check_report(&doctored);
    assert!(violations.iter().any(|v| v.check == "exclusion_partition"));

    // Break funnel monotonicity.
    let mut doctored = report.clone();
    doctored.confidence_funnel.n_high_confidence =
        doctored.confidence_funnel.n_pass_no_fatal_warnings + 5;
    let violations = invariants::check_report(&doctored);
    assert!(violations.iter().any(|v| v.check == "funnel_monotonicity"));

    // Break the audit counters.
    let mut doctored = report.clone();
    doctored.quality_weight_audit.n_quality_weight_gt_1 = 2;
    let violations = invariants::check_report(&doctored);
    assert!(violations.iter().any(|v| v.check == "qw_bounds_gt1"));
}

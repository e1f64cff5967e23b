use align_core::addrjoin::{run_address_join, AddressJoinInputs};
use align_core::io::loader::{
    DebugFunctionRecord, DebugFunctionsDoc, DecompFunctionRecord, RawRange,
};
use align_core::io::schema::{
    AlignmentPair, AlignmentPairsDoc, BuildContext, CandidateScore, JoinedFunctionRow,
    NonTargetEntry,
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
        best_span_name: Some(id.to_string()),
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
        decompile_status: "OK".to_string(),
        ..Default::default()
    }
}

fn context() -> BuildContext {
    BuildContext {
        binary_sha256: "sha".to_string(),
        job_id: "job1".to_string(),
        test_case: "t01".to_string(),
        opt: "O0".to_string(),
        variant: "debug".to_string(),
        builder_profile_id: "builder-v1".to_string(),
        ghidra_binary_sha256: None,
        ghidra_variant: None,
    }
}

fn alignment(pairs: Vec<AlignmentPair>, non_targets: Vec<NonTargetEntry>) -> AlignmentPairsDoc {
    AlignmentPairsDoc {
        package_name: String::new(),
        joiner_version: String::new(),
        schema_version: String::new(),
        profile_id: String::new(),
        binary_sha256: "sha".to_string(),
        build_id: None,
        oracle_profile_id: String::new(),
        source_profile_id: String::new(),
        pairs,
        non_targets,
    }
}

fn row<'a>(rows: &'a [JoinedFunctionRow], id: &str) -> &'a JoinedFunctionRow {
    rows.iter().find(|r| r.dwarf_function_id == id).unwrap()
}

#[test]
fn perfect_row_is_gold() {
    let debug_doc = DebugFunctionsDoc {
        binary_sha256: "sha".to_string(),
        functions: vec![oracle("f1", "ACCEPT", &[(0x1000, 0x1040)])],
        ..Default::default()
    };
    let align_doc = alignment(vec![match_pair("f1", 1.0, 1)], Vec::new());
    let decomp_functions = vec![decomp("g1", 0x1000, 0x1040)];

    let (rows, report) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &decomp_functions,
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert_eq!(r.ghidra_match_kind, MatchKind::JoinedStrong);
    assert!(r.is_high_confidence);
    assert_eq!(r.confidence_tier, "GOLD");
    assert_eq!(r.hc_reject_reason, None);
    assert!(report.invariant_violations.is_empty());
    assert_eq!(report.high_confidence.high_confidence_count, 1);
}

#[test]
fn multiple_candidates_drop_to_silver_with_gate_name() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![oracle("f1", "ACCEPT", &[(0x1000, 0x1040)])],
        ..Default::default()
    };
    let align_doc = alignment(vec![match_pair("f1", 1.0, 2)], Vec::new());
    let decomp_functions = vec![decomp("g1", 0x1000, 0x1040)];

    let (rows, _) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &decomp_functions,
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert!(!r.is_high_confidence);
    assert_eq!(r.hc_reject_reason.as_deref(), Some("ALIGN_UNIQUE"));
    assert_eq!(r.confidence_tier, "SILVER");
}

#[test]
fn warn_verdict_with_strong_join_is_bronze() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![oracle("f1", "WARN", &[(0x1000, 0x1040)])],
        ..Default::default()
    };
    let align_doc = alignment(vec![match_pair("f1", 1.0, 1)], Vec::new());
    let decomp_functions = vec![decomp("g1", 0x1000, 0x1040)];

    let (rows, _) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &decomp_functions,
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert_eq!(r.hc_reject_reason.as_deref(), Some("ORACLE_ACCEPT"));
    assert_eq!(r.confidence_tier, "BRONZE");
    assert!(r.eligible_for_join);
    assert!(!r.eligible_for_gold);
}

#[test]
fn rangeless_function_is_no_range_never_non_target() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![oracle("f1", "REJECT", &[])],
        ..Default::default()
    };
    let align_doc = alignment(
        Vec::new(),
        vec![NonTargetEntry {
            function_id: "f1".to_string(),
            name: Some("f1".to_string()),
            oracle_verdict: OracleVerdict::Reject,
            oracle_reasons: Vec::new(),
            decl: DeclSite::default(),
        }],
    );
    let decomp_functions = vec![decomp("g1", 0x1000, 0x1040)];

    let (rows, report) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &decomp_functions,
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert_eq!(r.ghidra_match_kind, MatchKind::NoRange);
    assert_eq!(r.ghidra_func_id, None);
    assert_eq!(r.exclusion_reason.as_deref(), Some("NO_RANGE"));
    assert_eq!(r.confidence_tier, "");
    assert_eq!(report.exclusion_summary.n_no_range, 1);
    assert_eq!(report.exclusion_summary.n_non_target, 0);
    assert!(report.invariant_violations.is_empty());
}

#[test]
fn two_functions_in_one_decompiled_body_are_flagged_fat() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![
            oracle("f1", "ACCEPT", &[(0x1000, 0x1040)]),
            oracle("f2", "ACCEPT", &[(0x1040, 0x1080)]),
        ],
        ..Default::default()
    };
    let align_doc =
        alignment(vec![match_pair("f1", 1.0, 1), match_pair("f2", 1.0, 1)], Vec::new());
    // One oversized decompiled function swallowing both.
    let decomp_functions = vec![decomp("g_big", 0x1000, 0x1080)];

    let (rows, report) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &decomp_functions,
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    for id in ["f1", "f2"] {
        let r = row(&rows, id);
        assert!(r.fat_function_multi_dwarf);
        assert_eq!(r.n_dwarf_funcs_per_ghidra_func, 2);
        assert_eq!(r.ghidra_func_id.as_deref(), Some("g_big"));
    }
    assert_eq!(report.decompiler.n_fat_functions, 2);
    assert_eq!(report.decompiler.n_many_to_one_ghidra_funcs, 1);
    assert_eq!(report.collision_summary.max_dwarf_per_ghidra, 2);
    assert_eq!(report.collision_summary.top_collisions.len(), 1);
}

#[test]
fn thunk_match_fails_the_noise_gate() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![oracle("f1", "ACCEPT", &[(0x1000, 0x1040)])],
        ..Default::default()
    };
    let align_doc = alignment(vec![match_pair("f1", 1.0, 1)], Vec::new());
    let mut g = decomp("g1", 0x1000, 0x1040);
    g.is_thunk = true;

    let (rows, _) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &[g],
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert!(!r.is_high_confidence);
    assert_eq!(r.hc_reject_reason.as_deref(), Some("NOT_NOISE"));
    assert!(r.is_thunk);
    assert!(r.is_import_proxy);
}

#[test]
fn fatal_warning_blocks_high_confidence_and_is_flagged() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![oracle("f1", "ACCEPT", &[(0x1000, 0x1040)])],
        ..Default::default()
    };
    let align_doc = alignment(vec![match_pair("f1", 1.0, 1)], Vec::new());
    let mut g = decomp("g1", 0x1000, 0x1040);
    g.warnings = vec!["DECOMPILE_TIMEOUT".to_string()];

    let (rows, _) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &[g],
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert_eq!(r.hc_reject_reason.as_deref(), Some("NO_FATAL_WARNING"));
    assert!(r.decompiler_quality_flags.iter().any(|f| f == "FATAL_WARNING"));
    assert_eq!(r.confidence_tier, "SILVER");
}

#[test]
fn goto_heavy_decompilation_is_flagged() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![oracle("f1", "ACCEPT", &[(0x1000, 0x1040)])],
        ..Default::default()
    };
    let align_doc = alignment(vec![match_pair("f1", 1.0, 1)], Vec::new());
    let mut g = decomp("g1", 0x1000, 0x1040);
    g.c_raw = "goto a;\ngoto b;\ngoto c;\n".to_string();
    g.c_line_count = 10;

    let (rows, _) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &align_doc,
            decomp_functions: &[g],
            decomp_cfg: &[],
            decomp_variables: &[],
            image_base: 0,
        },
        &context(),
        &AddressJoinProfile::v1(),
    )
    .unwrap();

    let r = row(&rows, "f1");
    assert!(r.decompiler_quality_flags.iter().any(|f| f == "HIGH_GOTO_DENSITY"));
    // Goto density alone does not gate high confidence.
    assert!(r.is_high_confidence);
}

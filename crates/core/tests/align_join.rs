use std::collections::BTreeMap;

use align_core::align::run_alignment;
use align_core::io::loader::{
    DebugFunctionRecord, DebugFunctionsDoc, LineRow, SourceInventoryDoc, SourceSpanRecord,
    TuReport,
};
use align_core::model::OracleVerdict;
use align_core::policy::profile::AlignProfile;
use align_core::policy::verdict::AlignVerdict;

fn debug_function(id: &str, verdict: &str, line_rows: &[(&str, u32, u64)]) -> DebugFunctionRecord {
    DebugFunctionRecord {
        function_id: id.to_string(),
        name: Some(id.to_string()),
        verdict: verdict.to_string(),
        line_rows: line_rows
            .iter()
            .map(|(file, line, count)| LineRow {
                file: file.to_string(),
                line: *line,
                count: *count,
            })
            .collect(),
        ..Default::default()
    }
}

fn span(tu: &str, hash: &str, start_line: u32, end_line: u32) -> SourceSpanRecord {
    SourceSpanRecord {
        span_id: format!("{tu}:0:40:{hash}"),
        name: Some("f".to_string()),
        content_hash: hash.to_string(),
        start_line,
        end_line,
        start_byte: 0,
        end_byte: 40,
    }
}

fn profile() -> AlignProfile {
    AlignProfile::v1()
}

#[test]
fn unique_match_with_full_overlap() {
    let debug_doc = DebugFunctionsDoc {
        binary_sha256: "sha".to_string(),
        functions: vec![debug_function("f1", "ACCEPT", &[("main.c", 10, 4), ("main.c", 11, 1)])],
        ..Default::default()
    };
    let inventory = SourceInventoryDoc {
        functions: vec![span("main.i", "h1", 1, 2)],
        tu_reports: vec![TuReport { tu_path: "main.i".to_string(), tu_hash: "t1".to_string() }],
        ..Default::default()
    };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "# 10 \"main.c\"\na\nb\nc\n".to_string());

    let (pairs_doc, report) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    assert_eq!(pairs_doc.pairs.len(), 1);
    let pair = &pairs_doc.pairs[0];
    assert_eq!(pair.verdict, AlignVerdict::Match);
    assert!(pair.reasons.iter().any(|r| r == "UNIQUE_BEST"));
    assert_eq!(pair.best_span_id.as_deref(), Some("main.i:0:40:h1"));
    assert_eq!(pair.overlap_count, 5);
    assert_eq!(pair.total_count, 5);
    assert_eq!(report.pair_counts.matched, 1);
    assert_eq!(report.tu_hashes.get("main.i").map(String::as_str), Some("t1"));
}

#[test]
fn reject_functions_become_non_targets() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![
            debug_function("f1", "ACCEPT", &[("main.c", 10, 1)]),
            debug_function("f2", "REJECT", &[]),
        ],
        ..Default::default()
    };
    let inventory = SourceInventoryDoc::default();
    let tus = BTreeMap::new();

    let (pairs_doc, report) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    assert_eq!(pairs_doc.pairs.len(), 1);
    assert_eq!(pairs_doc.non_targets.len(), 1);
    assert_eq!(pairs_doc.non_targets[0].function_id, "f2");
    assert_eq!(pairs_doc.non_targets[0].oracle_verdict, OracleVerdict::Reject);
    assert_eq!(report.pair_counts.non_target, 1);
}

#[test]
fn header_replication_in_two_tus_is_ambiguous() {
    // The same textual function compiled into two TUs: identical content
    // hash, full overlap in both.
    let debug_doc = DebugFunctionsDoc {
        functions: vec![debug_function("f1", "ACCEPT", &[("shared.h", 3, 2), ("shared.h", 4, 1)])],
        ..Default::default()
    };
    let inventory = SourceInventoryDoc {
        functions: vec![span("a.i", "h", 1, 2), span("b.i", "h", 1, 2)],
        ..Default::default()
    };
    let header_tu = "# 3 \"shared.h\"\nx\ny\n";
    let mut tus = BTreeMap::new();
    tus.insert("a.i".to_string(), header_tu.to_string());
    tus.insert("b.i".to_string(), header_tu.to_string());

    let (pairs_doc, report) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    let pair = &pairs_doc.pairs[0];
    assert_eq!(pair.verdict, AlignVerdict::Ambiguous);
    assert!(pair.reasons.iter().any(|r| r == "HEADER_REPLICATION_COLLISION"));
    assert!(pair.reasons.iter().any(|r| r == "NEAR_TIE"));
    assert_eq!(pair.candidates.len(), 2);
    assert_eq!(report.pair_counts.ambiguous, 1);
}

#[test]
fn warn_multi_file_range_is_propagated() {
    let mut func = debug_function("f1", "WARN", &[("main.c", 10, 2)]);
    func.reasons = vec!["MULTI_FILE_RANGE".to_string()];
    let debug_doc = DebugFunctionsDoc { functions: vec![func], ..Default::default() };
    let inventory =
        SourceInventoryDoc { functions: vec![span("main.i", "h1", 1, 1)], ..Default::default() };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "# 10 \"main.c\"\na\n".to_string());

    let (pairs_doc, _) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    assert!(pairs_doc.pairs[0].reasons.iter().any(|r| r == "MULTI_FILE_RANGE_PROPAGATED"));
}

#[test]
fn accept_verdict_does_not_propagate_multi_file_range() {
    let mut func = debug_function("f1", "ACCEPT", &[("main.c", 10, 2)]);
    func.reasons = vec!["MULTI_FILE_RANGE".to_string()];
    let debug_doc = DebugFunctionsDoc { functions: vec![func], ..Default::default() };
    let inventory =
        SourceInventoryDoc { functions: vec![span("main.i", "h1", 1, 1)], ..Default::default() };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "# 10 \"main.c\"\na\n".to_string());

    let (pairs_doc, _) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    assert!(!pairs_doc.pairs[0].reasons.iter().any(|r| r == "MULTI_FILE_RANGE_PROPAGATED"));
}

#[test]
fn bare_filename_contents_are_rekeyed_to_full_span_paths() {
    // Preprocessed contents keyed by bare filename, spans by full path.
    let debug_doc = DebugFunctionsDoc {
        functions: vec![debug_function("f1", "ACCEPT", &[("main.c", 10, 1)])],
        ..Default::default()
    };
    let inventory = SourceInventoryDoc {
        functions: vec![SourceSpanRecord {
            span_id: "/files/job/main.i:0:40:h1".to_string(),
            name: Some("f".to_string()),
            content_hash: "h1".to_string(),
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 40,
        }],
        ..Default::default()
    };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "# 10 \"main.c\"\na\n".to_string());

    let (pairs_doc, _) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    assert_eq!(pairs_doc.pairs[0].verdict, AlignVerdict::Match);
    assert_eq!(pairs_doc.pairs[0].best_tu_path.as_deref(), Some("/files/job/main.i"));
}

#[test]
fn markerless_tu_adds_origin_map_missing_on_no_match() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![debug_function("f1", "ACCEPT", &[("main.c", 10, 1)])],
        ..Default::default()
    };
    let inventory =
        SourceInventoryDoc { functions: vec![span("main.i", "h1", 0, 1)], ..Default::default() };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "no markers here\nat all\n".to_string());

    let (pairs_doc, report) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    let pair = &pairs_doc.pairs[0];
    assert_eq!(pair.verdict, AlignVerdict::NoMatch);
    assert!(pair.reasons.iter().any(|r| r == "NO_CANDIDATES"));
    assert!(pair.reasons.iter().any(|r| r == "ORIGIN_MAP_MISSING"));
    assert_eq!(report.pair_counts.no_match, 1);
}

#[test]
fn low_overlap_best_is_no_match_but_recorded() {
    let debug_doc = DebugFunctionsDoc {
        functions: vec![debug_function(
            "f1",
            "ACCEPT",
            &[("main.c", 10, 1), ("main.c", 11, 1), ("main.c", 12, 1), ("main.c", 13, 1)],
        )],
        ..Default::default()
    };
    // Span covers only line 10 -> ratio 0.25 < 0.7.
    let inventory =
        SourceInventoryDoc { functions: vec![span("main.i", "h1", 1, 1)], ..Default::default() };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "# 10 \"main.c\"\na\nb\nc\nd\n".to_string());

    let (pairs_doc, _) = run_alignment(&debug_doc, &inventory, &tus, &profile());

    let pair = &pairs_doc.pairs[0];
    assert_eq!(pair.verdict, AlignVerdict::NoMatch);
    assert!(pair.reasons.iter().any(|r| r == "LOW_OVERLAP_RATIO"));
    // Best is kept for transparency.
    assert_eq!(pair.best_span_id.as_deref(), Some("main.i:0:40:h1"));
    assert_eq!(pair.candidates.len(), 1);
}

#[test]
fn two_runs_serialize_byte_identical() {
    let debug_doc = DebugFunctionsDoc {
        binary_sha256: "sha".to_string(),
        functions: vec![
            debug_function("f1", "ACCEPT", &[("main.c", 10, 4), ("main.c", 11, 1)]),
            debug_function("f2", "REJECT", &[]),
        ],
        ..Default::default()
    };
    let inventory = SourceInventoryDoc {
        functions: vec![span("main.i", "h1", 1, 2)],
        tu_reports: vec![TuReport { tu_path: "main.i".to_string(), tu_hash: "t1".to_string() }],
        ..Default::default()
    };
    let mut tus = BTreeMap::new();
    tus.insert("main.i".to_string(), "# 10 \"main.c\"\na\nb\nc\n".to_string());

    let profile = profile();
    let (pairs_a, report_a) = run_alignment(&debug_doc, &inventory, &tus, &profile);
    let (pairs_b, report_b) = run_alignment(&debug_doc, &inventory, &tus, &profile);

    assert_eq!(
        serde_json::to_string(&pairs_a).unwrap(),
        serde_json::to_string(&pairs_b).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&report_a).unwrap(),
        serde_json::to_string(&report_b).unwrap()
    );
}

//! Source-alignment join orchestration.
//!
//! Ties origin maps, candidate scoring, and verdict assignment together:
//! partitions debug functions into targets and non-targets, scores every
//! parsed span against each target's line evidence, and emits the
//! alignment pairs document plus a summary report.
//!
//! Pure function of (evidence documents, preprocessed contents, profile);
//! missing translation units degrade to zero evidence, never to an error.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::align::candidate::{
    detect_header_replication, score_candidates, select_best, SpanInfo,
};
use crate::align::origin_map::{build_origin_map, OriginMap};
use crate::io::loader::{DebugFunctionsDoc, SourceInventoryDoc};
use crate::io::schema::{
    AlignThresholds, AlignmentPair, AlignmentPairsDoc, AlignmentReport, CandidateScore,
    NonTargetEntry, PairCounts,
};
use crate::model::{evidence_total, DeclSite, EvidenceMultiset, LineKey, OracleVerdict};
use crate::policy::profile::AlignProfile;
use crate::policy::verdict::{reason, AlignVerdict};
use crate::rank::sort_ranked;

/// One alignment target: an ACCEPT/WARN debug function with its evidence.
struct TargetFunction {
    function_id: String,
    name: Option<String>,
    verdict: OracleVerdict,
    oracle_reasons: Vec<String>,
    evidence: EvidenceMultiset,
    decl: DeclSite,
}

/// The TU path embedded in a span id of the form `tu_path:start:end:hash`.
pub fn tu_path_of_span_id(span_id: &str) -> String {
    let mut it = span_id.rsplitn(4, ':');
    let (hash, end, start) = (it.next(), it.next(), it.next());
    match (hash, end, start, it.next()) {
        (Some(_), Some(_), Some(_), Some(tu_path)) => tu_path.to_string(),
        _ => String::new(),
    }
}

/// Group parsed spans by their embedded TU path.
fn spans_by_tu(inventory: &SourceInventoryDoc) -> BTreeMap<String, Vec<SpanInfo>> {
    let mut by_tu: BTreeMap<String, Vec<SpanInfo>> = BTreeMap::new();
    for record in &inventory.functions {
        let tu_path = tu_path_of_span_id(&record.span_id);
        by_tu.entry(tu_path.clone()).or_default().push(SpanInfo {
            span_id: record.span_id.clone(),
            tu_path,
            name: record.name.clone(),
            content_hash: record.content_hash.clone(),
            start_line: record.start_line,
            end_line: record.end_line,
            start_byte: record.start_byte,
            end_byte: record.end_byte,
        });
    }
    by_tu
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Re-key origin maps so lookups against span TU paths succeed.
///
/// Preprocessed contents may be keyed by bare filename (`arrays.i`)
/// while span ids embed full container paths (`/files/.../arrays.i`).
/// Exact key matches win; otherwise a basename match re-keys the map.
/// Unmatched maps are kept under their raw key for diagnostics.
fn resolve_origin_map_keys(
    origin_maps: BTreeMap<String, OriginMap>,
    span_tus: &BTreeMap<String, Vec<SpanInfo>>,
) -> BTreeMap<String, OriginMap> {
    let mut by_basename: BTreeMap<&str, &str> = BTreeMap::new();
    for raw_key in origin_maps.keys() {
        by_basename.insert(basename(raw_key), raw_key.as_str());
    }

    let mut resolved: BTreeMap<String, OriginMap> = BTreeMap::new();
    for tu_path in span_tus.keys() {
        if origin_maps.contains_key(tu_path) {
            resolved.insert(tu_path.clone(), origin_maps[tu_path].clone());
        } else if let Some(raw_key) = by_basename.get(basename(tu_path)) {
            debug!(%raw_key, %tu_path, "re-keyed origin map by basename");
            resolved.insert(tu_path.clone(), origin_maps[*raw_key].clone());
        }
    }

    // Keep unmatched origin maps under their raw key.
    let resolved_basenames: Vec<String> =
        resolved.keys().map(|k| basename(k).to_string()).collect();
    for (raw_key, om) in origin_maps {
        if !resolved.contains_key(&raw_key)
            && !resolved_basenames.iter().any(|b| b == basename(&raw_key))
        {
            resolved.insert(raw_key, om);
        }
    }
    resolved
}

/// Partition debug functions into alignment targets and non-targets.
///
/// REJECT functions never enter the joiner; they are recorded verbatim
/// so the lifecycle accounting stays total.
fn partition_targets(doc: &DebugFunctionsDoc) -> (Vec<TargetFunction>, Vec<NonTargetEntry>) {
    let mut targets = Vec::new();
    let mut non_targets = Vec::new();

    for func in &doc.functions {
        let verdict = OracleVerdict::parse_lenient(&func.verdict);
        if verdict == OracleVerdict::Reject {
            non_targets.push(NonTargetEntry {
                function_id: func.function_id.clone(),
                name: func.display_name().map(str::to_string),
                oracle_verdict: verdict,
                oracle_reasons: func.reasons.clone(),
                decl: func.decl.clone(),
            });
            continue;
        }

        let mut evidence = EvidenceMultiset::new();
        for row in &func.line_rows {
            *evidence.entry(LineKey::new(row.file.clone(), row.line)).or_insert(0) += row.count;
        }

        targets.push(TargetFunction {
            function_id: func.function_id.clone(),
            name: func.display_name().map(str::to_string),
            verdict,
            oracle_reasons: func.reasons.clone(),
            evidence,
            decl: func.decl.clone(),
        });
    }

    (targets, non_targets)
}

/// Deduplicate reason tags while preserving first-seen order.
fn dedup_reasons(reasons: Vec<&'static str>) -> Vec<String> {
    let mut seen = Vec::new();
    for r in reasons {
        if !seen.iter().any(|s: &String| s == r) {
            seen.push(r.to_string());
        }
    }
    seen
}

/// Execute the deterministic debug<->source alignment for one binary.
pub fn run_alignment(
    debug_doc: &DebugFunctionsDoc,
    inventory: &SourceInventoryDoc,
    tu_contents: &BTreeMap<String, String>,
    profile: &AlignProfile,
) -> (AlignmentPairsDoc, AlignmentReport) {
    // Origin maps per TU
    let mut origin_maps: BTreeMap<String, OriginMap> = BTreeMap::new();
    let mut tus_without_markers: Vec<String> = Vec::new();
    for (tu_path, content) in tu_contents {
        let om = build_origin_map(content, tu_path, &profile.excluded_path_prefixes);
        if !om.origin_available {
            tus_without_markers.push(tu_path.clone());
        }
        origin_maps.insert(tu_path.clone(), om);
    }

    let span_tus = spans_by_tu(inventory);
    let origin_maps = resolve_origin_map_keys(origin_maps, &span_tus);

    let (targets, non_targets) = partition_targets(debug_doc);
    info!(
        n_targets = targets.len(),
        n_non_targets = non_targets.len(),
        n_tus = origin_maps.len(),
        "alignment join started"
    );

    // Join loop
    let mut pairs: Vec<AlignmentPair> = Vec::new();
    let mut reason_counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut pair_counts = PairCounts::default();

    for target in &targets {
        let mut all_candidates = Vec::new();
        for (tu_path, om) in &origin_maps {
            let Some(spans) = span_tus.get(tu_path) else { continue };
            all_candidates.extend(score_candidates(&target.evidence, spans, om));
        }
        sort_ranked(&mut all_candidates);

        let (best, near_ties, mut reasons) = select_best(
            &all_candidates,
            profile.overlap_threshold,
            profile.epsilon,
            profile.min_overlap_lines,
        );

        // A WARN function whose ranges already spanned multiple files
        // keeps that uncertainty visible on the alignment side.
        if target.verdict == OracleVerdict::Warn
            && target.oracle_reasons.iter().any(|r| r == reason::MULTI_FILE_RANGE)
        {
            reasons.push(reason::MULTI_FILE_RANGE_PROPAGATED);
        }

        if best.is_none() && !tus_without_markers.is_empty() {
            reasons.push(reason::ORIGIN_MAP_MISSING);
        }

        let is_replication = match &best {
            Some(b) if !near_ties.is_empty() => {
                let hit = detect_header_replication(b, &near_ties);
                if hit {
                    reasons.push(reason::HEADER_REPLICATION_COLLISION);
                }
                hit
            }
            _ => false,
        };

        let low_ratio = reasons.contains(&reason::LOW_OVERLAP_RATIO);
        let verdict = if best.is_none() || reasons.contains(&reason::NO_CANDIDATES) {
            AlignVerdict::NoMatch
        } else if is_replication || (!near_ties.is_empty() && !low_ratio) {
            AlignVerdict::Ambiguous
        } else if low_ratio {
            AlignVerdict::NoMatch
        } else {
            AlignVerdict::Match
        };

        let reasons = dedup_reasons(reasons);

        let total = evidence_total(&target.evidence);
        let candidates: Vec<CandidateScore> = all_candidates
            .iter()
            .map(|c| CandidateScore {
                span_id: c.span_id.clone(),
                tu_path: c.tu_path.clone(),
                name: c.name.clone(),
                content_hash: c.content_hash.clone(),
                overlap_count: c.overlap_count,
                overlap_ratio: c.overlap_ratio,
                gap_count: c.gap_count,
            })
            .collect();

        match verdict {
            AlignVerdict::Match => pair_counts.matched += 1,
            AlignVerdict::Ambiguous => pair_counts.ambiguous += 1,
            AlignVerdict::NoMatch => pair_counts.no_match += 1,
        }
        for r in &reasons {
            *reason_counts.entry(r.clone()).or_insert(0) += 1;
        }

        pairs.push(AlignmentPair {
            function_id: target.function_id.clone(),
            function_name: target.name.clone(),
            oracle_verdict: target.verdict,
            decl: target.decl.clone(),
            best_span_id: best.as_ref().map(|b| b.span_id.clone()),
            best_tu_path: best.as_ref().map(|b| b.tu_path.clone()),
            best_span_name: best.as_ref().and_then(|b| b.name.clone()),
            overlap_count: best.as_ref().map_or(0, |b| b.overlap_count),
            total_count: best.as_ref().map_or(total, |b| b.total_count),
            overlap_ratio: best.as_ref().map_or(0.0, |b| b.overlap_ratio),
            gap_count: best.as_ref().map_or(total, |b| b.gap_count),
            verdict,
            reasons,
            candidates,
        });
    }

    pair_counts.non_target = non_targets.len() as u32;

    // Assemble outputs
    let (package_name, joiner_version, schema_version) = crate::io::schema::contract_fields();

    let tu_hashes: BTreeMap<String, String> = inventory
        .tu_reports
        .iter()
        .map(|r| (r.tu_path.clone(), r.tu_hash.clone()))
        .collect();

    let pairs_doc = AlignmentPairsDoc {
        package_name: package_name.clone(),
        joiner_version: joiner_version.clone(),
        schema_version: schema_version.clone(),
        profile_id: profile.profile_id.clone(),
        binary_sha256: debug_doc.binary_sha256.clone(),
        build_id: debug_doc.build_id.clone(),
        oracle_profile_id: debug_doc.profile_id.clone(),
        source_profile_id: inventory.profile_id.clone(),
        pairs,
        non_targets,
    };

    let report = AlignmentReport {
        package_name,
        joiner_version,
        schema_version,
        profile_id: profile.profile_id.clone(),
        binary_sha256: debug_doc.binary_sha256.clone(),
        build_id: debug_doc.build_id.clone(),
        oracle_profile_id: debug_doc.profile_id.clone(),
        source_profile_id: inventory.profile_id.clone(),
        tu_hashes,
        pair_counts,
        reason_counts,
        thresholds: AlignThresholds {
            overlap_threshold: profile.overlap_threshold,
            epsilon: profile.epsilon,
            min_overlap_lines: profile.min_overlap_lines,
        },
        excluded_path_prefixes: profile.excluded_path_prefixes.clone(),
        timestamp: String::new(),
    };

    info!(
        matched = report.pair_counts.matched,
        ambiguous = report.pair_counts.ambiguous,
        no_match = report.pair_counts.no_match,
        non_target = report.pair_counts.non_target,
        "alignment join finished"
    );

    (pairs_doc, report)
}

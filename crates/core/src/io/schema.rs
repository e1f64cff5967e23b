//! Produced documents.
//!
//! Four outputs per binary variant:
//! 1. `alignment_pairs.json` -- per-function alignment pairs with scoring.
//! 2. `alignment_report.json` -- alignment summary and provenance anchors.
//! 3. `joined_functions.jsonl` -- one merged row per debug function.
//! 4. `join_report.json` -- yield, funnel, distributions, violations.
//!
//! Every document carries the contract fields `package_name`,
//! `joiner_version`, `schema_version`, and `profile_id`. Field order is
//! fixed by these struct definitions; all maps are BTreeMaps; the report
//! `timestamp` is the sole non-deterministic field and is stamped by the
//! caller, never by the engines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{DeclSite, OracleVerdict};
use crate::policy::verdict::{AlignVerdict, MatchKind};
use crate::stats::PercentileSummary;
use crate::{PACKAGE_NAME, SCHEMA_VERSION};

fn package_name() -> String {
    PACKAGE_NAME.to_string()
}

fn joiner_version() -> String {
    crate::version().to_string()
}

fn schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

// Source-alignment documents

/// Scored candidate included in each alignment pair for transparency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub span_id: String,
    pub tu_path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_hash: String,
    pub overlap_count: u64,
    pub overlap_ratio: f64,
    pub gap_count: u64,
}

/// One debug function -> best source span (or none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentPair {
    pub function_id: String,
    #[serde(default)]
    pub function_name: Option<String>,
    pub oracle_verdict: OracleVerdict,

    #[serde(flatten)]
    pub decl: DeclSite,

    #[serde(default)]
    pub best_span_id: Option<String>,
    #[serde(default)]
    pub best_tu_path: Option<String>,
    #[serde(default)]
    pub best_span_name: Option<String>,

    pub overlap_count: u64,
    pub total_count: u64,
    pub overlap_ratio: f64,
    pub gap_count: u64,

    pub verdict: AlignVerdict,
    pub reasons: Vec<String>,

    pub candidates: Vec<CandidateScore>,
}

/// A debug function that was not an alignment target (oracle REJECT).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonTargetEntry {
    pub function_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub oracle_verdict: OracleVerdict,
    #[serde(default)]
    pub oracle_reasons: Vec<String>,
    #[serde(flatten)]
    pub decl: DeclSite,
}

/// Aggregate verdict counts for the alignment report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCounts {
    #[serde(rename = "match")]
    pub matched: u32,
    pub ambiguous: u32,
    pub no_match: u32,
    pub non_target: u32,
}

/// Threshold configuration echoed into the alignment report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignThresholds {
    pub overlap_threshold: f64,
    pub epsilon: f64,
    pub min_overlap_lines: u64,
}

/// `alignment_pairs.json` -- per-function alignment results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentPairsDoc {
    #[serde(default = "package_name")]
    pub package_name: String,
    #[serde(default = "joiner_version")]
    pub joiner_version: String,
    #[serde(default = "schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub profile_id: String,

    #[serde(default)]
    pub binary_sha256: String,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub oracle_profile_id: String,
    #[serde(default)]
    pub source_profile_id: String,

    #[serde(default)]
    pub pairs: Vec<AlignmentPair>,
    #[serde(default)]
    pub non_targets: Vec<NonTargetEntry>,
}

/// `alignment_report.json` -- summary metrics and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    #[serde(default = "package_name")]
    pub package_name: String,
    #[serde(default = "joiner_version")]
    pub joiner_version: String,
    #[serde(default = "schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub profile_id: String,

    #[serde(default)]
    pub binary_sha256: String,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub oracle_profile_id: String,
    #[serde(default)]
    pub source_profile_id: String,

    #[serde(default)]
    pub tu_hashes: BTreeMap<String, String>,

    #[serde(default)]
    pub pair_counts: PairCounts,
    #[serde(default)]
    pub reason_counts: BTreeMap<String, u32>,

    #[serde(default)]
    pub thresholds: AlignThresholds,
    #[serde(default)]
    pub excluded_path_prefixes: Vec<String>,

    /// Sole non-deterministic field; stamped by the caller.
    #[serde(default)]
    pub timestamp: String,
}

// Address-join documents

/// Build provenance for one binary variant.
///
/// In a cross-variant join (oracle=debug build, decompiler=stripped
/// build) the two sides are different artifacts; `binary_sha256` and
/// `variant` always refer to the oracle side, the `ghidra_*` fields
/// capture the decompiler side when they differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    #[serde(default)]
    pub binary_sha256: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub test_case: String,
    #[serde(default)]
    pub opt: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub builder_profile_id: String,
    #[serde(default)]
    pub ghidra_binary_sha256: Option<String>,
    #[serde(default)]
    pub ghidra_variant: Option<String>,
}

/// One row in `joined_functions.jsonl` -- the final merged record for
/// one debug function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedFunctionRow {
    // Provenance
    pub binary_sha256: String,
    pub job_id: String,
    pub test_case: String,
    pub opt: String,
    pub variant: String,
    pub builder_profile_id: String,
    #[serde(default)]
    pub ghidra_binary_sha256: Option<String>,
    #[serde(default)]
    pub ghidra_variant: Option<String>,

    // Debug-side identity
    pub dwarf_function_id: String,
    #[serde(default)]
    pub dwarf_function_name: Option<String>,
    #[serde(default)]
    pub dwarf_function_name_norm: Option<String>,
    #[serde(flatten)]
    pub decl: DeclSite,
    #[serde(default)]
    pub low_pc: Option<u64>,
    #[serde(default)]
    pub high_pc: Option<u64>,
    pub dwarf_total_range_bytes: u64,
    pub dwarf_oracle_verdict: OracleVerdict,

    // Source alignment evidence
    #[serde(default)]
    pub align_verdict: Option<AlignVerdict>,
    #[serde(default)]
    pub align_overlap_ratio: Option<f64>,
    #[serde(default)]
    pub align_gap_count: Option<u64>,
    #[serde(default)]
    pub align_n_candidates: Option<u32>,
    pub quality_weight: f64,
    #[serde(default)]
    pub align_reason_tags: Vec<String>,

    // Decompiler mapping result
    pub ghidra_match_kind: MatchKind,
    #[serde(default)]
    pub ghidra_func_id: Option<String>,
    #[serde(default)]
    pub ghidra_entry_va: Option<u64>,
    #[serde(default)]
    pub ghidra_name: Option<String>,

    // Decompiler view summary
    #[serde(default)]
    pub decompile_status: Option<String>,
    #[serde(default)]
    pub cfg_completeness: Option<String>,
    #[serde(default)]
    pub bb_count: Option<u32>,
    #[serde(default)]
    pub edge_count: Option<u32>,
    #[serde(default)]
    pub warning_tags: Vec<String>,
    pub goto_count: u32,
    pub loc_decompiled: u32,
    pub temp_var_count: u32,
    pub placeholder_type_rate: f64,

    // Join diagnostics
    pub pc_overlap_bytes: u64,
    pub pc_overlap_ratio: f64,
    pub n_near_ties: u32,
    #[serde(default)]
    pub join_warnings: Vec<String>,

    // Many-to-one
    pub n_dwarf_funcs_per_ghidra_func: u32,
    pub fat_function_multi_dwarf: bool,

    // Tags (non-destructive filtering)
    pub is_high_confidence: bool,
    pub is_aux_function: bool,
    pub is_import_proxy: bool,
    pub is_external_block: bool,
    pub is_non_target: bool,
    pub is_thunk: bool,

    // Eligibility
    pub eligible_for_join: bool,
    pub eligible_for_gold: bool,
    #[serde(default)]
    pub exclusion_reason: Option<String>,

    // Confidence
    pub confidence_tier: String,
    #[serde(default)]
    pub hc_reject_reason: Option<String>,
    #[serde(default)]
    pub upstream_collapse_reason: Option<String>,
    #[serde(default)]
    pub decompiler_quality_flags: Vec<String>,
}

/// Structured, non-fatal defect record from the invariant auditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub check: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    pub message: String,
}

impl InvariantViolation {
    pub fn new(check: &str, message: impl Into<String>) -> Self {
        Self { check: check.to_string(), ids: Vec::new(), message: message.into() }
    }

    pub fn with_ids(check: &str, ids: Vec<String>, message: impl Into<String>) -> Self {
        Self { check: check.to_string(), ids, message: message.into() }
    }
}

/// Aggregate join yield counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinYieldCounts {
    pub n_dwarf_funcs: u32,
    /// JOINED_STRONG + JOINED_WEAK.
    pub n_joined_to_ghidra: u32,
    pub n_joined_strong: u32,
    pub n_joined_weak: u32,
    pub n_no_range: u32,
    pub n_multi_match: u32,
    pub n_no_match: u32,
}

/// Eligibility accounting; the exclusion categories partition the total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionSummary {
    pub n_total_dwarf: u32,
    pub n_no_range: u32,
    pub n_non_target: u32,
    pub n_noise_aux: u32,
    /// Join-eligible rows that are not gold-eligible for verdict reasons.
    pub n_oracle_reject: u32,
    pub n_eligible_for_join: u32,
    pub n_eligible_for_gold: u32,
    #[serde(default)]
    pub by_exclusion_reason: BTreeMap<String, u32>,
}

/// High-confidence subset yield; denominator is the gold-eligible count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighConfidenceSlice {
    pub total: u32,
    pub high_confidence_count: u32,
    pub yield_rate: f64,
    #[serde(default)]
    pub by_opt: BTreeMap<String, f64>,
}

/// Gate-by-gate attrition counts over the gold-eligible rows.
///
/// Each counter is the number of rows passing that gate AND all prior
/// gates, so the sequence is non-increasing by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceFunnel {
    pub n_eligible_for_gold: u32,
    pub n_pass_oracle_accept: u32,
    pub n_pass_align_match: u32,
    pub n_pass_align_unique: u32,
    pub n_pass_align_ratio: u32,
    pub n_pass_joined_strong: u32,
    pub n_pass_not_noise: u32,
    pub n_pass_cfg_not_low: u32,
    pub n_pass_no_fatal_warnings: u32,
    pub n_high_confidence: u32,
}

/// One many-to-one collision group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionEntry {
    pub ghidra_func_id: String,
    pub n_dwarf: u32,
    pub dwarf_ids: Vec<String>,
}

/// Many-to-one collision diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionSummary {
    pub n_unique_ghidra_funcs_matched: u32,
    pub n_ghidra_funcs_with_multi_dwarf: u32,
    pub max_dwarf_per_ghidra: u32,
    #[serde(default)]
    pub top_collisions: Vec<CollisionEntry>,
}

/// Bounds audit over derived ratios, feeding the report-level checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityWeightAudit {
    pub n_quality_weight_gt_1: u32,
    pub n_quality_weight_lt_0: u32,
    pub max_quality_weight: f64,
    pub n_align_overlap_ratio_gt_1: u32,
    pub max_align_overlap_ratio: f64,
}

/// Distribution summaries for decompiler quality indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecompilerDistributions {
    #[serde(default)]
    pub cfg_completeness_fractions: BTreeMap<String, f64>,
    #[serde(default)]
    pub warning_prevalence: BTreeMap<String, u32>,
    pub goto_density_percentiles: PercentileSummary,
    pub placeholder_type_rate_percentiles: PercentileSummary,
    pub n_fat_functions: u32,
    pub n_many_to_one_ghidra_funcs: u32,
}

/// Status of the variable-join subsystem (explicitly unimplemented).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableJoinStatus {
    pub implemented: bool,
    pub reason: String,
    pub n_stub_rows: u32,
}

impl Default for VariableJoinStatus {
    fn default() -> Self {
        Self {
            implemented: false,
            reason: "variable-level identity recovery is not implemented".to_string(),
            n_stub_rows: 0,
        }
    }
}

/// `join_report.json` -- binary-level join report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    #[serde(default = "package_name")]
    pub package_name: String,
    #[serde(default = "joiner_version")]
    pub joiner_version: String,
    #[serde(default = "schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub profile_id: String,

    #[serde(default)]
    pub binary_sha256: String,
    #[serde(default)]
    pub build_context: BuildContext,

    #[serde(default)]
    pub yield_counts: JoinYieldCounts,
    #[serde(default)]
    pub high_confidence: HighConfidenceSlice,
    #[serde(default)]
    pub exclusion_summary: ExclusionSummary,
    #[serde(default)]
    pub confidence_funnel: ConfidenceFunnel,
    #[serde(default)]
    pub collision_summary: CollisionSummary,

    #[serde(default)]
    pub yield_by_align_verdict: BTreeMap<String, u32>,
    #[serde(default)]
    pub yield_by_n_candidates_bin: BTreeMap<String, u32>,
    #[serde(default)]
    pub yield_by_quality_weight_bin: BTreeMap<String, u32>,
    #[serde(default)]
    pub yield_by_align_overlap_ratio_bin: BTreeMap<String, u32>,
    #[serde(default)]
    pub yield_by_opt: BTreeMap<String, u32>,
    #[serde(default)]
    pub yield_by_match_kind: BTreeMap<String, u32>,

    #[serde(default)]
    pub quality_weight_audit: QualityWeightAudit,
    #[serde(default)]
    pub decompiler: DecompilerDistributions,
    #[serde(default)]
    pub variable_join: VariableJoinStatus,

    #[serde(default)]
    pub invariant_violations: Vec<InvariantViolation>,

    /// Sole non-deterministic field; stamped by the caller.
    #[serde(default)]
    pub timestamp: String,
}

/// Contract-field defaults for freshly assembled documents.
pub fn contract_fields() -> (String, String, String) {
    (package_name(), joiner_version(), schema_version())
}

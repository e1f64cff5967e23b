//! Canonical binning and percentile helpers for report aggregation.
//!
//! Bin edges align with the confidence-tier gates so the report
//! stratifications and the high-confidence ladder tell one story:
//!
//! ```text
//! ==1.0       perfect single-candidate match
//! [0.95,1.0)  near-perfect (high-confidence gate threshold)
//! [0.8,0.95)  strong but degraded
//! [0.5,0.8)   moderate
//! [0,0.5)     poor
//! none        missing / not applicable
//! ```

use serde::{Deserialize, Serialize};

/// Canonical order of the detailed quality-weight bins.
pub const QUALITY_WEIGHT_BIN_ORDER: &[&str] = &[
    "==1.0",
    "[0.95,1.0)",
    "[0.8,0.95)",
    "[0.5,0.8)",
    "[0,0.5)",
    "none_not_match",
    "none_no_range",
];

/// Canonical order of the overlap-ratio bins.
pub const OVERLAP_RATIO_BIN_ORDER: &[&str] =
    &["==1.0", "[0.95,1.0)", "[0.8,0.95)", "[0.5,0.8)", "[0,0.5)", "none"];

/// Round to six decimal places, matching the serialized precision of
/// every ratio field in the produced documents.
pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Bin a value assumed to be in `[0, 1]` (or missing).
///
/// Shared logic for both quality_weight and overlap_ratio.
pub fn bin_unit_value(value: Option<f64>) -> &'static str {
    let v = match value {
        Some(v) => v,
        None => return "none",
    };
    if v >= 1.0 {
        "==1.0"
    } else if v >= 0.95 {
        "[0.95,1.0)"
    } else if v >= 0.8 {
        "[0.8,0.95)"
    } else if v >= 0.5 {
        "[0.5,0.8)"
    } else {
        "[0,0.5)"
    }
}

/// Bin an overlap ratio; pass `None` when the ratio is not available.
pub fn overlap_ratio_bin(ratio: Option<f64>) -> &'static str {
    bin_unit_value(ratio)
}

/// Quality-weight bin with the `none` bin split by root cause.
///
/// `quality_weight` is only meaningful for MATCH rows; for everything
/// else the stored `0.0` is a placeholder. The split distinguishes
/// rows with no usable address range (a debug-side property) from rows
/// that simply did not align.
pub fn quality_weight_bin_detailed(
    quality_weight: Option<f64>,
    has_range: bool,
    is_align_match: bool,
) -> &'static str {
    if let Some(qw) = quality_weight {
        if is_align_match {
            return bin_unit_value(Some(qw));
        }
    }
    if !has_range {
        return "none_no_range";
    }
    "none_not_match"
}

/// Bin a candidate count for the report stratification.
pub fn n_candidates_bin(n: Option<u32>) -> &'static str {
    match n {
        None => "none",
        Some(1) => "1",
        Some(n) if n <= 3 => "2-3",
        Some(_) => "4+",
    }
}

/// Percentile summary of a distribution, rounded to six decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileSummary {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Compute p25/p50/p75/p90 by rank on the sorted values.
///
/// Empty input yields an all-zero summary rather than an error so a
/// binary with no joined rows still produces a complete report.
pub fn percentiles(values: &[f64]) -> PercentileSummary {
    if values.is_empty() {
        return PercentileSummary::default();
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let pick = |q: f64| -> f64 {
        let idx = ((q * n as f64) as usize).min(n - 1);
        round6(sorted[idx])
    };
    PercentileSummary { p25: pick(0.25), p50: pick(0.5), p75: pick(0.75), p90: pick(0.9) }
}

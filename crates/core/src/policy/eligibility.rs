//! Eligibility -- pre-join classification of debug function rows.
//!
//! Every debug function is classified *before* the address join so that
//! downstream denominators are never diluted by unjoinable rows.
//!
//! Two tiers:
//! - join-eligible: has usable address ranges and is not a non-target.
//! - gold-eligible: join-eligible AND oracle ACCEPT AND not a known
//!   auxiliary symbol (after version-suffix normalization).
//!
//! Pure functions, no IO, no state.

use crate::model::OracleVerdict;
use crate::policy::noise::normalize_versioned_name;

pub const EXCL_NO_RANGE: &str = "NO_RANGE";
pub const EXCL_NON_TARGET: &str = "NON_TARGET";
pub const EXCL_NOISE_AUX: &str = "NOISE_AUX";

/// Classify a debug function for join/gold eligibility.
///
/// Returns `(eligible_for_join, eligible_for_gold, exclusion_reason)`.
/// The exclusion reason is `None` exactly when the row is join-eligible;
/// gold ineligibility alone is not an exclusion -- the row simply never
/// enters the GOLD tier.
pub fn classify_eligibility(
    has_range: bool,
    is_non_target: bool,
    oracle_verdict: OracleVerdict,
    name: Option<&str>,
    aux_names: &[String],
) -> (bool, bool, Option<&'static str>) {
    if !has_range {
        return (false, false, Some(EXCL_NO_RANGE));
    }
    if is_non_target {
        return (false, false, Some(EXCL_NON_TARGET));
    }

    // Join-eligible from here on.
    if oracle_verdict != OracleVerdict::Accept {
        return (true, false, None);
    }

    let name_norm = normalize_versioned_name(name.unwrap_or("").trim());
    if aux_names.iter().any(|aux| aux == name_norm) {
        return (true, false, None);
    }

    (true, true, None)
}

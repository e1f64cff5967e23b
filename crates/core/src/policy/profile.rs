//! Frozen configuration profiles for both join engines.
//!
//! A profile captures every tunable parameter that affects a join
//! outcome. Each engine run is a pure function of (evidence, profile),
//! so persisting the profile id alongside the outputs makes the run
//! reproducible. Profiles deserialize from YAML/JSON; omitted fields
//! fall back to the canonical v1 values.

use serde::{Deserialize, Serialize};

use crate::policy::noise;

/// Configuration for the source-alignment joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignProfile {
    /// Minimum overlap_ratio for a MATCH verdict.
    pub overlap_threshold: f64,
    /// Absolute overlap_ratio delta that makes a competitor a near-tie.
    pub epsilon: f64,
    /// Minimum overlap_count for a candidate to be considered at all.
    pub min_overlap_lines: u64,
    /// Path prefixes excluded from the origin map (system headers).
    pub excluded_path_prefixes: Vec<String>,
    /// Deterministic identity of this configuration.
    pub profile_id: String,
}

impl AlignProfile {
    /// The canonical v1 profile with all defaults.
    pub fn v1() -> Self {
        Self {
            overlap_threshold: 0.7,
            epsilon: 0.02,
            min_overlap_lines: 1,
            excluded_path_prefixes: vec![
                "/usr/include".to_string(),
                "/usr/lib/gcc".to_string(),
                "<built-in>".to_string(),
                "<command-line>".to_string(),
            ],
            profile_id: "align-v1".to_string(),
        }
    }
}

impl Default for AlignProfile {
    fn default() -> Self {
        Self::v1()
    }
}

/// Configuration for the address-join engine and its diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressJoinProfile {
    /// Minimum pc_overlap_ratio for JOINED_STRONG.
    pub strong_overlap_threshold: f64,
    /// Minimum pc_overlap_ratio for JOINED_WEAK.
    pub weak_overlap_threshold: f64,
    /// Near-tie margin as a fraction of the best candidate's overlap bytes.
    pub near_tie_epsilon: f64,
    /// Auxiliary symbol names (init/fini + compiler-inserted).
    pub aux_function_names: Vec<String>,
    /// Decompiler warning codes that disqualify a row from high confidence.
    pub fatal_warnings: Vec<String>,
    /// Deterministic identity of this configuration.
    pub profile_id: String,
}

impl AddressJoinProfile {
    /// The canonical v1 profile with all defaults.
    pub fn v1() -> Self {
        Self {
            strong_overlap_threshold: 0.9,
            weak_overlap_threshold: 0.3,
            near_tie_epsilon: 0.05,
            aux_function_names: noise::all_aux_names(),
            fatal_warnings: vec![
                "DECOMPILE_TIMEOUT".to_string(),
                "UNRESOLVED_INDIRECT_JUMP".to_string(),
            ],
            profile_id: "addr-join-v1".to_string(),
        }
    }
}

impl Default for AddressJoinProfile {
    fn default() -> Self {
        Self::v1()
    }
}

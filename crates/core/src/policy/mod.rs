//! Join policy: configuration profiles, verdict classification,
//! eligibility rules, and the canonical noise-name lists.
//!
//! Everything that can change a join outcome is threaded through an
//! explicit profile object; no core logic reads process-wide state.

pub mod eligibility;
pub mod noise;
pub mod profile;
pub mod verdict;

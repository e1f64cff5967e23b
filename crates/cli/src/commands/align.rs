use std::path::Path;

use anyhow::{Context, Result};

use align_core::align::run_alignment;
use align_core::db::RunStatus;
use align_core::io::loader::{
    load_json, load_preprocessed_dir, DebugFunctionsDoc, SourceInventoryDoc,
};
use align_core::io::writer::write_alignment_outputs;
use align_core::policy::profile::AlignProfile;

use crate::commands::util::{load_profile, now_rfc3339, record_run};
use crate::sha256_file;

/// Run the source-alignment joiner for one binary.
pub fn align_command(
    dwarf: &Path,
    spans: &Path,
    preprocessed: &Path,
    out: &Path,
    profile_path: Option<&Path>,
    runs_db: Option<&Path>,
) -> Result<()> {
    let profile: AlignProfile = load_profile(profile_path)?;

    let debug_doc: DebugFunctionsDoc =
        load_json(dwarf).with_context(|| format!("Failed to load {}", dwarf.display()))?;
    let inventory: SourceInventoryDoc =
        load_json(spans).with_context(|| format!("Failed to load {}", spans.display()))?;
    let tu_contents = load_preprocessed_dir(preprocessed)
        .with_context(|| format!("Failed to load preprocessed TUs from {}", preprocessed.display()))?;

    let (mut pairs_doc, mut report) = run_alignment(&debug_doc, &inventory, &tu_contents, &profile);
    report.timestamp = now_rfc3339();

    write_alignment_outputs(&mut pairs_doc, &report, out)
        .with_context(|| format!("Failed to write alignment outputs to {}", out.display()))?;

    let binary = if debug_doc.binary_sha256.is_empty() {
        "unknown".to_string()
    } else {
        debug_doc.binary_sha256.clone()
    };
    record_run(
        runs_db,
        &binary,
        "align",
        &profile.profile_id,
        sha256_file(dwarf).ok(),
        RunStatus::Succeeded,
    )?;

    println!("Alignment complete:");
    println!("  Binary: {binary}");
    println!("  Profile: {}", profile.profile_id);
    println!(
        "  Pairs: {} match / {} ambiguous / {} no-match / {} non-target",
        report.pair_counts.matched,
        report.pair_counts.ambiguous,
        report.pair_counts.no_match,
        report.pair_counts.non_target
    );
    println!("  Output: {}", out.display());

    Ok(())
}

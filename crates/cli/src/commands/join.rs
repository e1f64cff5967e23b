use std::path::Path;

use anyhow::{Context, Result};

use align_core::addrjoin::{run_address_join, AddressJoinInputs};
use align_core::db::RunStatus;
use align_core::io::loader::{
    load_json, load_jsonl, CfgRecord, DebugFunctionsDoc, DecompFunctionRecord, VariableRecord,
};
use align_core::io::schema::{AlignmentPairsDoc, BuildContext};
use align_core::io::writer::write_join_outputs;
use align_core::policy::profile::AddressJoinProfile;

use crate::commands::util::{load_profile, now_rfc3339, record_run};
use crate::sha256_file;

/// Everything the `join` subcommand needs from the command line.
pub struct JoinArgs<'a> {
    pub dwarf: &'a Path,
    pub alignment: &'a Path,
    pub ghidra_functions: &'a Path,
    pub ghidra_cfg: Option<&'a Path>,
    pub ghidra_variables: Option<&'a Path>,
    pub context: Option<&'a Path>,
    pub image_base: u64,
    pub out: &'a Path,
    pub profile_path: Option<&'a Path>,
    pub runs_db: Option<&'a Path>,
}

/// Run the address-join engine for one binary variant.
pub fn join_command(args: JoinArgs<'_>) -> Result<()> {
    let profile: AddressJoinProfile = load_profile(args.profile_path)?;

    let debug_doc: DebugFunctionsDoc = load_json(args.dwarf)
        .with_context(|| format!("Failed to load {}", args.dwarf.display()))?;
    let alignment: AlignmentPairsDoc = load_json(args.alignment)
        .with_context(|| format!("Failed to load {}", args.alignment.display()))?;
    let decomp_functions: Vec<DecompFunctionRecord> = load_jsonl(args.ghidra_functions)
        .with_context(|| format!("Failed to load {}", args.ghidra_functions.display()))?;
    let decomp_cfg: Vec<CfgRecord> = match args.ghidra_cfg {
        Some(path) => {
            load_jsonl(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Vec::new(),
    };
    let decomp_variables: Vec<VariableRecord> = match args.ghidra_variables {
        Some(path) => {
            load_jsonl(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Vec::new(),
    };
    let ctx: BuildContext = match args.context {
        Some(path) => {
            load_json(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => BuildContext {
            binary_sha256: debug_doc.binary_sha256.clone(),
            ..Default::default()
        },
    };

    let (mut rows, mut report) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &alignment,
            decomp_functions: &decomp_functions,
            decomp_cfg: &decomp_cfg,
            decomp_variables: &decomp_variables,
            image_base: args.image_base,
        },
        &ctx,
        &profile,
    )?;
    report.timestamp = now_rfc3339();

    write_join_outputs(&mut rows, &report, args.out)
        .with_context(|| format!("Failed to write join outputs to {}", args.out.display()))?;

    let binary = if ctx.binary_sha256.is_empty() {
        "unknown".to_string()
    } else {
        ctx.binary_sha256.clone()
    };
    record_run(
        args.runs_db,
        &binary,
        "addr-join",
        &profile.profile_id,
        sha256_file(args.dwarf).ok(),
        RunStatus::Succeeded,
    )?;

    println!("Address join complete:");
    println!("  Binary: {binary}");
    println!("  Profile: {}", profile.profile_id);
    println!(
        "  Yield: {} strong / {} weak / {} multi / {} no-match / {} no-range",
        report.yield_counts.n_joined_strong,
        report.yield_counts.n_joined_weak,
        report.yield_counts.n_multi_match,
        report.yield_counts.n_no_match,
        report.yield_counts.n_no_range
    );
    println!(
        "  High confidence: {} of {} gold-eligible",
        report.high_confidence.high_confidence_count, report.high_confidence.total
    );
    if !report.invariant_violations.is_empty() {
        println!("  Invariant violations: {}", report.invariant_violations.len());
    }
    println!("  Output: {}", args.out.display());

    Ok(())
}

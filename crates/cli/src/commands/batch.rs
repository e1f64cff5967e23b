use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use align_core::addrjoin::{run_address_join, AddressJoinInputs};
use align_core::align::run_alignment;
use align_core::db::RunStatus;
use align_core::io::loader::{
    load_json, load_jsonl, load_preprocessed_dir, CfgRecord, DebugFunctionsDoc,
    DecompFunctionRecord, SourceInventoryDoc, VariableRecord,
};
use align_core::io::schema::BuildContext;
use align_core::io::writer::{write_alignment_outputs, write_join_outputs};
use align_core::policy::profile::{AddressJoinProfile, AlignProfile};

use crate::commands::util::{load_profile, now_rfc3339, record_run};

/// Outcome of one batch cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellOutcome {
    pub cell: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Batch summary written to `<out>/batch_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub n_cells: u32,
    pub n_ok: u32,
    pub n_rejected: u32,
    pub cells: Vec<CellOutcome>,
}

/// Run both engines over every cell directory under `root`.
///
/// A cell that fails to load or join degrades to an explicit reject
/// entry with a reason; it never aborts the rest of the batch.
pub fn batch_command(
    root: &Path,
    out: &Path,
    align_profile_path: Option<&Path>,
    join_profile_path: Option<&Path>,
    runs_db: Option<&Path>,
) -> Result<()> {
    let align_profile: AlignProfile = load_profile(align_profile_path)?;
    let join_profile: AddressJoinProfile = load_profile(join_profile_path)?;

    let mut cells: Vec<String> = Vec::new();
    for entry in
        fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            cells.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    cells.sort();

    let mut outcomes: Vec<CellOutcome> = Vec::new();
    for cell in &cells {
        match run_cell(&root.join(cell), &out.join(cell), &align_profile, &join_profile) {
            Ok(()) => {
                record_run(runs_db, cell, "batch", &join_profile.profile_id, None, RunStatus::Succeeded)?;
                outcomes.push(CellOutcome {
                    cell: cell.clone(),
                    status: "OK".to_string(),
                    reason: None,
                });
            }
            Err(err) => {
                warn!(%cell, error = %err, "cell rejected");
                record_run(runs_db, cell, "batch", &join_profile.profile_id, None, RunStatus::Rejected)?;
                outcomes.push(CellOutcome {
                    cell: cell.clone(),
                    status: "REJECT".to_string(),
                    reason: Some(format!("{err:#}")),
                });
            }
        }
    }

    let summary = BatchSummary {
        n_cells: outcomes.len() as u32,
        n_ok: outcomes.iter().filter(|c| c.status == "OK").count() as u32,
        n_rejected: outcomes.iter().filter(|c| c.status == "REJECT").count() as u32,
        cells: outcomes,
    };

    fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let summary_path = out.join("batch_summary.json");
    let mut body = serde_json::to_string_pretty(&summary)?;
    body.push('\n');
    fs::write(&summary_path, body)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    println!("Batch complete: {} cells, {} ok, {} rejected", summary.n_cells, summary.n_ok, summary.n_rejected);
    println!("  Summary: {}", summary_path.display());

    Ok(())
}

/// Run both engines for one cell directory.
fn run_cell(
    cell_dir: &Path,
    out_dir: &Path,
    align_profile: &AlignProfile,
    join_profile: &AddressJoinProfile,
) -> Result<()> {
    let dwarf_path = cell_dir.join("oracle_functions.json");
    if !dwarf_path.is_file() {
        return Err(anyhow!("missing oracle_functions.json"));
    }

    let debug_doc: DebugFunctionsDoc = load_json(&dwarf_path)
        .with_context(|| format!("Failed to load {}", dwarf_path.display()))?;
    let inventory: SourceInventoryDoc = load_json(&cell_dir.join("source_spans.json"))
        .with_context(|| "Failed to load source_spans.json".to_string())?;
    let tu_contents = load_preprocessed_dir(&cell_dir.join("preprocessed"))?;

    let (mut pairs_doc, mut align_report) =
        run_alignment(&debug_doc, &inventory, &tu_contents, align_profile);
    align_report.timestamp = now_rfc3339();
    write_alignment_outputs(&mut pairs_doc, &align_report, out_dir)?;

    let decomp_functions: Vec<DecompFunctionRecord> =
        load_jsonl(&cell_dir.join("ghidra_functions.jsonl"))
            .with_context(|| "Failed to load ghidra_functions.jsonl".to_string())?;
    let decomp_cfg: Vec<CfgRecord> = if cell_dir.join("ghidra_cfg.jsonl").is_file() {
        load_jsonl(&cell_dir.join("ghidra_cfg.jsonl"))?
    } else {
        Vec::new()
    };
    let decomp_variables: Vec<VariableRecord> =
        if cell_dir.join("ghidra_variables.jsonl").is_file() {
            load_jsonl(&cell_dir.join("ghidra_variables.jsonl"))?
        } else {
            Vec::new()
        };
    let ctx: BuildContext = if cell_dir.join("build_context.json").is_file() {
        load_json(&cell_dir.join("build_context.json"))?
    } else {
        BuildContext { binary_sha256: debug_doc.binary_sha256.clone(), ..Default::default() }
    };

    let (mut rows, mut join_report) = run_address_join(
        AddressJoinInputs {
            debug_doc: &debug_doc,
            alignment: &pairs_doc,
            decomp_functions: &decomp_functions,
            decomp_cfg: &decomp_cfg,
            decomp_variables: &decomp_variables,
            image_base: 0,
        },
        &ctx,
        join_profile,
    )?;
    join_report.timestamp = now_rfc3339();
    write_join_outputs(&mut rows, &join_report, out_dir)?;

    Ok(())
}

use std::path::Path;

use anyhow::{Context, Result};

use align_core::db::RunDb;

/// List recorded engine runs from a ledger.
pub fn runs_command(db_path: &Path, binary: Option<&str>, json: bool) -> Result<()> {
    let db = RunDb::open(db_path)
        .with_context(|| format!("Failed to open runs ledger at {}", db_path.display()))?;
    let runs = db.list_runs(binary).context("Failed to list runs")?;

    if json {
        let serialized =
            serde_json::to_string_pretty(&runs).context("Failed to serialize runs to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Runs ({}):", runs.len());
    if runs.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for run in runs {
        println!(
            "  - {} [{}] engine={} profile={} started={} finished={}",
            run.binary,
            run.status.as_str(),
            run.engine,
            run.profile_id,
            run.started_at,
            run.finished_at
        );
    }

    Ok(())
}

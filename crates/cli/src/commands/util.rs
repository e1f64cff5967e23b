use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

use align_core::db::{JoinRunRecord, RunDb, RunStatus};

/// Load a profile from a YAML file, or fall back to the canonical
/// default when no path is given. Omitted YAML fields keep defaults.
pub fn load_profile<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        None => Ok(T::default()),
        Some(p) => {
            let body = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read profile at {}", p.display()))?;
            serde_yaml::from_str(&body)
                .with_context(|| format!("Failed to parse profile YAML at {}", p.display()))
        }
    }
}

/// Parse an image base given as hex (`0x100000`) or decimal.
pub fn parse_image_base(raw: &str) -> Result<u64> {
    let parsed = if let Some(digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(digits, 16)
    } else {
        raw.parse()
    };
    parsed.map_err(|_| anyhow!("Invalid image base: {raw}"))
}

/// Record a finished engine run in the ledger, if one was requested.
pub fn record_run(
    runs_db: Option<&Path>,
    binary: &str,
    engine: &str,
    profile_id: &str,
    binary_hash: Option<String>,
    status: RunStatus,
) -> Result<()> {
    let Some(db_path) = runs_db else { return Ok(()) };
    let db = RunDb::open(db_path)
        .with_context(|| format!("Failed to open runs ledger at {}", db_path.display()))?;
    let mut record = JoinRunRecord::begin(binary, engine, profile_id).finish(status);
    record.binary_hash = binary_hash;
    db.insert_run(&record).context("Failed to insert run record")?;
    Ok(())
}

/// RFC 3339 timestamp for the report's sole non-deterministic field.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

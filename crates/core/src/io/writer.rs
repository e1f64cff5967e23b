//! Deterministic serialization for join outputs.
//!
//! Conventions, matching every producer in the pipeline:
//! - JSON: pretty-printed, trailing newline.
//! - JSONL: compact, one object per line.
//! - Rows sorted by function id / entry address before writing, so
//!   identical inputs yield byte-identical files.

use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::io::schema::{AlignmentPairsDoc, AlignmentReport, JoinReport, JoinedFunctionRow};

/// Error type for output serialization.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a document as pretty JSON with a trailing newline.
pub fn write_json_pretty<T: Serialize>(value: &T, path: &Path) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| WriteError::Io { path: parent.display().to_string(), source })?;
    }
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    fs::write(path, body)
        .map_err(|source| WriteError::Io { path: path.display().to_string(), source })
}

/// Serialize rows as compact JSONL, one object per line.
pub fn write_jsonl<T: Serialize>(rows: &[T], path: &Path) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| WriteError::Io { path: parent.display().to_string(), source })?;
    }
    let mut body = String::new();
    for row in rows {
        body.push_str(&serde_json::to_string(row)?);
        body.push('\n');
    }
    fs::write(path, body)
        .map_err(|source| WriteError::Io { path: path.display().to_string(), source })
}

/// Write the alignment outputs to `output_dir`.
///
/// Files: `alignment_pairs.json`, `alignment_report.json`. Pairs and
/// non-targets are sorted by function id before serialization.
pub fn write_alignment_outputs(
    pairs_doc: &mut AlignmentPairsDoc,
    report: &AlignmentReport,
    output_dir: &Path,
) -> Result<(), WriteError> {
    pairs_doc.pairs.sort_by(|a, b| a.function_id.cmp(&b.function_id));
    pairs_doc.non_targets.sort_by(|a, b| a.function_id.cmp(&b.function_id));

    let pairs_path = output_dir.join("alignment_pairs.json");
    write_json_pretty(pairs_doc, &pairs_path)?;
    info!(path = %pairs_path.display(), n_pairs = pairs_doc.pairs.len(), "wrote alignment pairs");

    let report_path = output_dir.join("alignment_report.json");
    write_json_pretty(report, &report_path)?;
    info!(path = %report_path.display(), "wrote alignment report");

    Ok(())
}

/// Write the address-join outputs to `output_dir`.
///
/// Files: `joined_functions.jsonl` (sorted by debug function id, then
/// matched entry address), `join_report.json`.
pub fn write_join_outputs(
    rows: &mut [JoinedFunctionRow],
    report: &JoinReport,
    output_dir: &Path,
) -> Result<(), WriteError> {
    rows.sort_by(|a, b| {
        a.dwarf_function_id
            .cmp(&b.dwarf_function_id)
            .then_with(|| a.ghidra_entry_va.unwrap_or(0).cmp(&b.ghidra_entry_va.unwrap_or(0)))
    });

    let rows_path = output_dir.join("joined_functions.jsonl");
    write_jsonl(rows, &rows_path)?;
    info!(path = %rows_path.display(), n_rows = rows.len(), "wrote joined function rows");

    let report_path = output_dir.join("join_report.json");
    write_json_pretty(report, &report_path)?;
    info!(path = %report_path.display(), "wrote join report");

    Ok(())
}

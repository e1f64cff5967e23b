//! Deserialization of the consumed evidence documents.
//!
//! Four upstream producers feed the joiners:
//! - the debug-symbol oracle (function identities, ranges, line evidence),
//! - the structural source parser (spans with byte/line bounds + hashes),
//! - the preprocessed translation units themselves (for origin maps),
//! - the decompiler inventory (functions / CFG / variables record streams).
//!
//! Unknown fields are ignored so upstream schema growth does not break
//! the joiners; missing optional fields default to empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::DeclSite;

/// Error type for evidence loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {path} line {line}: {source}")]
    Jsonl {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

// Debug-symbol side

/// One address range as emitted by the oracle (hex strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRange {
    pub low: String,
    pub high: String,
}

/// One (file, line, count) attribution row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRow {
    pub file: String,
    pub line: u32,
    pub count: u64,
}

/// One debug-symbol function as emitted by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugFunctionRecord {
    pub function_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub linkage_name: Option<String>,
    /// Oracle verdict string; unrecognized values degrade to REJECT.
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub ranges: Vec<RawRange>,
    #[serde(default)]
    pub line_rows: Vec<LineRow>,
    #[serde(flatten)]
    pub decl: DeclSite,
}

impl DebugFunctionRecord {
    /// Preferred display name: `name`, falling back to `linkage_name`.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.linkage_name.as_deref())
    }
}

/// The debug-symbol functions document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugFunctionsDoc {
    #[serde(default)]
    pub binary_sha256: String,
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub functions: Vec<DebugFunctionRecord>,
}

// Structural source-parse side

/// One parsed function span. The id embeds `tu_path:start:end:hash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpanRecord {
    pub span_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_hash: String,
    /// 0-based preprocessed line bounds, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u64,
    pub end_byte: u64,
}

/// Per-TU provenance from the source parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuReport {
    pub tu_path: String,
    pub tu_hash: String,
}

/// The structural source-parse inventory document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInventoryDoc {
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub functions: Vec<SourceSpanRecord>,
    #[serde(default)]
    pub tu_reports: Vec<TuReport>,
}

// Decompiler side

/// One decompiled function row from the decompiler inventory stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecompFunctionRecord {
    pub function_id: String,
    #[serde(default)]
    pub entry_va: u64,
    #[serde(default)]
    pub entry_hex: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub body_start_va: Option<u64>,
    #[serde(default)]
    pub body_end_va: Option<u64>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub is_external_block: bool,
    #[serde(default)]
    pub is_thunk: bool,
    #[serde(default)]
    pub is_import: bool,
    #[serde(default)]
    pub is_plt_or_stub: bool,
    #[serde(default)]
    pub is_init_fini_aux: bool,
    #[serde(default)]
    pub is_compiler_aux: bool,
    #[serde(default)]
    pub is_library_like: bool,
    #[serde(default)]
    pub decompile_status: String,
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub c_raw: String,
    #[serde(default)]
    pub c_line_count: u32,
    #[serde(default)]
    pub temp_var_count: u32,
    #[serde(default)]
    pub asm_insn_count: u32,
    #[serde(default)]
    pub insn_to_c_ratio: f64,
    #[serde(default)]
    pub fat_function_flag: bool,
}

/// One CFG summary row from the decompiler inventory stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgRecord {
    pub function_id: String,
    #[serde(default)]
    pub bb_count: u32,
    #[serde(default)]
    pub edge_count: u32,
    #[serde(default)]
    pub cyclomatic: u32,
    #[serde(default)]
    pub cfg_completeness: String,
    #[serde(default)]
    pub has_indirect_jumps: bool,
}

/// One variable row from the decompiler inventory stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub function_id: String,
    #[serde(default)]
    pub var_kind: String,
    #[serde(default)]
    pub type_str: String,
}

// Loading helpers

/// Load a JSON document from disk.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let body = fs::read_to_string(path)
        .map_err(|source| LoadError::Io { path: path.display().to_string(), source })?;
    serde_json::from_str(&body)
        .map_err(|source| LoadError::Json { path: path.display().to_string(), source })
}

/// Load a JSONL record stream from disk. Blank lines are skipped.
pub fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let body = fs::read_to_string(path)
        .map_err(|source| LoadError::Io { path: path.display().to_string(), source })?;
    let mut rows = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(line).map_err(|source| LoadError::Jsonl {
            path: path.display().to_string(),
            line: idx + 1,
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Load every preprocessed translation unit (`*.i`) in a directory,
/// keyed by file name. A missing directory yields an empty map: absent
/// inputs mean zero evidence, not a failure.
pub fn load_preprocessed_dir(dir: &Path) -> Result<BTreeMap<String, String>, LoadError> {
    let mut contents = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(contents);
    }
    let entries = fs::read_dir(dir)
        .map_err(|source| LoadError::Io { path: dir.display().to_string(), source })?;
    for entry in entries {
        let entry =
            entry.map_err(|source| LoadError::Io { path: dir.display().to_string(), source })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("i") {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let body = fs::read_to_string(&path)
            .map_err(|source| LoadError::Io { path: path.display().to_string(), source })?;
        contents.insert(name, body);
    }
    Ok(contents)
}

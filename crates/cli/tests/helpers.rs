use std::fs;
use std::path::Path;

/// Write a minimal single-function evidence fixture into `dir`:
/// oracle functions, source spans, and one preprocessed TU. The
/// function `compute` fully aligns to the span in `main.i`.
pub fn write_align_fixture(dir: &Path) {
    fs::write(
        dir.join("oracle_functions.json"),
        r#"{
  "binary_sha256": "cafef00d",
  "profile_id": "oracle-v1",
  "functions": [
    {
      "function_id": "cu0:0x100",
      "name": "compute",
      "verdict": "ACCEPT",
      "ranges": [{"low": "0x401000", "high": "0x401030"}],
      "line_rows": [
        {"file": "main.c", "line": 10, "count": 4},
        {"file": "main.c", "line": 11, "count": 1}
      ],
      "decl_file": "main.c",
      "decl_line": 9
    },
    {
      "function_id": "cu0:0x200",
      "name": "discard",
      "verdict": "REJECT"
    }
  ]
}"#,
    )
    .unwrap();

    fs::write(
        dir.join("source_spans.json"),
        r#"{
  "profile_id": "spans-v1",
  "functions": [
    {
      "span_id": "main.i:0:40:h1",
      "name": "compute",
      "content_hash": "h1",
      "start_line": 1,
      "end_line": 2,
      "start_byte": 0,
      "end_byte": 40
    }
  ],
  "tu_reports": [{"tu_path": "main.i", "tu_hash": "t1"}]
}"#,
    )
    .unwrap();

    let pre = dir.join("preprocessed");
    fs::create_dir_all(&pre).unwrap();
    fs::write(pre.join("main.i"), "# 10 \"main.c\"\na\nb\nc\n").unwrap();
}

/// Add a decompiler inventory whose single function's body exactly
/// covers the fixture function's address range.
pub fn write_ghidra_fixture(dir: &Path) {
    fs::write(
        dir.join("ghidra_functions.jsonl"),
        format!(
            "{}\n",
            serde_json::json!({
                "function_id": "g1",
                "entry_va": 0x401000u64,
                "name": "FUN_00401000",
                "body_start_va": 0x401000u64,
                "body_end_va": 0x401030u64,
                "decompile_status": "OK"
            })
        ),
    )
    .unwrap();
}

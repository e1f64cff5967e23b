//! Origin map -- parse preprocessor line-marker directives from a
//! preprocessed translation unit and build a mapping from preprocessed
//! line numbers to original (file, line) pairs.
//!
//! The forward map is the authoritative structure:
//!
//! ```text
//! preprocessed line number -> (original file, original line) | unmapped
//! ```
//!
//! Lines attributed to synthetic markers (`<built-in>`, `<command-line>`)
//! or excluded path prefixes (system headers) stay unmapped so they do
//! not dilute overlap scoring.

/// Forward map from preprocessed line numbers to original locations.
#[derive(Debug, Clone)]
pub struct OriginMap {
    /// Path identifier of the preprocessed file this map was built from.
    pub tu_path: String,
    /// True if at least one line-marker directive was found. A map with
    /// no markers contributes zero evidence; callers must not treat it
    /// as a failure.
    pub origin_available: bool,
    /// Total number of lines in the preprocessed file.
    pub n_total_lines: usize,
    /// Path prefixes that were excluded from mapping.
    pub excluded_prefixes: Vec<String>,
    /// Interned original file paths.
    files: Vec<String>,
    /// Index = 0-based preprocessed line; value = (file index, line).
    forward: Vec<Option<(u32, u32)>>,
}

impl OriginMap {
    /// Look up the original (file, line) for a 0-based preprocessed line.
    /// Returns `None` for unmapped, excluded, or out-of-range lines.
    pub fn lookup(&self, line: usize) -> Option<(&str, u32)> {
        let (file_idx, orig_line) = self.forward.get(line).copied().flatten()?;
        Some((self.files[file_idx as usize].as_str(), orig_line))
    }
}

/// A parsed line-marker directive.
struct LineMarker {
    line: u32,
    path: String,
    system_header: bool,
}

/// Parse one line as a preprocessor line marker.
///
/// Recognized forms:
/// ```text
/// # 123 "path"
/// # 123 "path" 1 3 4
/// #line 123 "path"
/// ```
/// Anything else (including trailing non-numeric tokens) is not a marker.
fn parse_line_marker(raw: &str) -> Option<LineMarker> {
    let rest = raw.trim_end().strip_prefix('#')?;
    let rest = rest.trim_start();
    let rest = match rest.strip_prefix("line") {
        // `#line` must be followed by whitespace to count.
        Some(after) if after.starts_with(|c: char| c.is_ascii_whitespace()) => after,
        Some(_) => return None,
        None => rest,
    };
    let rest = rest.trim_start();

    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let line: u32 = rest[..digits_end].parse().ok()?;

    let rest = rest[digits_end..].trim_start();
    let rest = rest.strip_prefix('"')?;

    // Scan the quoted path, honoring backslash escapes.
    let mut path = String::new();
    let mut chars = rest.char_indices();
    let mut close = None;
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, esc)) => path.push(esc),
                None => return None,
            },
            '"' => {
                close = Some(i);
                break;
            }
            _ => path.push(c),
        }
    }
    let close = close?;

    // Optional trailing flags: whitespace-separated integers only.
    let mut system_header = false;
    for token in rest[close + 1..].split_ascii_whitespace() {
        if token.chars().any(|c| !c.is_ascii_digit()) {
            return None;
        }
        if token == "3" {
            system_header = true;
        }
    }

    Some(LineMarker { line, path, system_header })
}

/// Check whether a path is synthetic or matches an excluded prefix.
fn is_excluded_path(path: &str, excluded_prefixes: &[String]) -> bool {
    if path.starts_with('<') && path.ends_with('>') {
        return true;
    }
    excluded_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Parse a preprocessed file's content and build its forward origin map.
pub fn build_origin_map(
    content: &str,
    tu_path: &str,
    excluded_prefixes: &[String],
) -> OriginMap {
    let lines: Vec<&str> = content.split('\n').collect();

    let mut files: Vec<String> = Vec::new();
    let mut forward: Vec<Option<(u32, u32)>> = vec![None; lines.len()];

    let mut current_file: Option<u32> = None;
    let mut current_line: u32 = 0;
    let mut current_excluded = true;
    let mut found_any_directive = false;

    for (idx, raw_line) in lines.iter().enumerate() {
        if let Some(marker) = parse_line_marker(raw_line) {
            found_any_directive = true;
            current_excluded =
                marker.system_header || is_excluded_path(&marker.path, excluded_prefixes);
            current_line = marker.line;
            current_file = Some(intern(&mut files, marker.path));
            // The directive line itself maps to no source content.
            continue;
        }

        if let Some(file_idx) = current_file {
            if !current_excluded {
                forward[idx] = Some((file_idx, current_line));
            }
            current_line = current_line.saturating_add(1);
        }
        // Lines before any directive stay unmapped.
    }

    OriginMap {
        tu_path: tu_path.to_string(),
        origin_available: found_any_directive,
        n_total_lines: lines.len(),
        excluded_prefixes: excluded_prefixes.to_vec(),
        files,
        forward,
    }
}

/// Intern a path, reusing the index of the most recent identical entry.
///
/// Markers re-enter the same file many times (push/pop around includes),
/// so a linear scan over the small interned table is enough.
fn intern(files: &mut Vec<String>, path: String) -> u32 {
    if let Some(idx) = files.iter().position(|p| *p == path) {
        return idx as u32;
    }
    files.push(path);
    (files.len() - 1) as u32
}

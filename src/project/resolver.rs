// src/project/resolver.rs
// Project resolution (spec.md §4.4): given a session transcript or a bare cwd,
// determine which project (if any) the session belongs to.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const SCAN_LINES: usize = 10;
const SCAN_BYTES: u64 = 64 * 1024;

/// Scan the first `SCAN_LINES` lines (capped at `SCAN_BYTES`) of an NDJSON
/// transcript for a recorded cwd field.
pub fn cwd_from_transcript(path: &Path) -> Option<PathBuf> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut bytes_read = 0u64;
    let mut line = String::new();

    for _ in 0..SCAN_LINES {
        line.clear();
        let n = reader.read_line(&mut line).ok()?;
        if n == 0 {
            break;
        }
        bytes_read += n as u64;
        if bytes_read > SCAN_BYTES {
            break;
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line.trim_end()) {
            if let Some(cwd) = value.get("cwd").and_then(|v| v.as_str()) {
                return Some(PathBuf::from(cwd));
            }
        }
    }
    None
}

/// Walk up from `cwd` looking for a `.claude/` marker directory that names a
/// project root.
pub fn project_root_from_cwd(cwd: &Path) -> Option<PathBuf> {
    let mut current = Some(cwd);
    while let Some(dir) = current {
        if dir.join(".claude").is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Infer the dominant project among a set of file paths touched by a session,
/// using longest-common-prefix clustering plus a majority vote. Returns `None`
/// when no cluster clears `threshold` of the total paths (spec.md §4.4).
pub fn infer(paths: &[PathBuf], threshold: f64) -> Option<PathBuf> {
    if paths.is_empty() {
        return None;
    }

    let mut roots: HashMap<PathBuf, usize> = HashMap::new();
    for p in paths {
        if let Some(root) = project_root_from_cwd(p) {
            *roots.entry(root).or_insert(0) += 1;
        }
    }

    if roots.is_empty() {
        return None;
    }

    let total = paths.len() as f64;
    let (best_root, best_count) = roots.into_iter().max_by_key(|(_, c)| *c)?;

    if (best_count as f64) / total >= threshold {
        Some(best_root)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_project_root_by_claude_marker() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".claude")).unwrap();
        let nested = dir.path().join("src").join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        let found = project_root_from_cwd(&nested).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn infer_requires_majority_threshold() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".claude")).unwrap();
        let other = tempdir().unwrap();

        let paths = vec![
            dir.path().join("a.rs"),
            dir.path().join("b.rs"),
            other.path().join("c.rs"),
        ];
        let result = infer(&paths, 0.6);
        assert_eq!(result, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn infer_returns_none_when_no_marker_found() {
        let other = tempdir().unwrap();
        let paths = vec![other.path().join("a.rs")];
        assert_eq!(infer(&paths, 0.6), None);
    }

    #[test]
    fn infer_returns_none_on_an_even_split_at_the_default_threshold() {
        let dir_a = tempdir().unwrap();
        std::fs::create_dir(dir_a.path().join(".claude")).unwrap();
        let dir_b = tempdir().unwrap();
        std::fs::create_dir(dir_b.path().join(".claude")).unwrap();

        // Exactly 50/50: neither root clears the 0.6 majority threshold.
        let paths = vec![
            dir_a.path().join("a.rs"),
            dir_a.path().join("b.rs"),
            dir_b.path().join("c.rs"),
            dir_b.path().join("d.rs"),
        ];
        assert_eq!(infer(&paths, 0.6), None);
    }
}

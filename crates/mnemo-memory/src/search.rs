//! Parsing the output of an external line-oriented search tool.
//!
//! Text search itself is delegated (`rg -l`, `grep -rn`, ...); the engine
//! only needs the list of matching record files to re-rank.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

static RECORD_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?\.memory\.md)(?::|$)").expect("record path pattern is valid")
});

/// Record paths from `output`, in first-seen order, without duplicates.
///
/// Accepts bare paths (`rg -l`) and `path:line:text` / `path:count` lines.
/// Lines that do not name a `*.memory.md` file are ignored.
pub fn candidate_paths_from_output(output: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        let Some(caps) = RECORD_PATH_RE.captures(line) else {
            continue;
        };
        let path = PathBuf::from(&caps[1]);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

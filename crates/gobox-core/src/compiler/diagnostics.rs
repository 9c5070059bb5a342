//! Picking the one line worth showing out of toolchain output.

use std::sync::OnceLock;

use regex::Regex;

/// First line with an error marker or a `file:line:col` position, else the
/// first non-empty line.
pub fn first_diagnostic(output: &str) -> String {
    static POSITION: OnceLock<Regex> = OnceLock::new();
    let position = crate::static_regex(&POSITION, r":\d+:\d+");

    let lines = || output.lines().map(str::trim).filter(|l| !l.is_empty());
    lines()
        .find(|l| l.to_ascii_lowercase().contains("error") || position.is_match(l))
        .or_else(|| lines().next())
        .map(str::to_string)
        .unwrap_or_else(|| "compilation failed".to_string())
}

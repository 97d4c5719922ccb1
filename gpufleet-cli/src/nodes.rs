use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read hostnames from `path`, one per line; blank lines and `#` comments are skipped
pub fn load_nodes_file(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Error reading nodes file '{}'", path.display()))?;

    Ok(parse_nodes(&contents))
}

fn parse_nodes(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

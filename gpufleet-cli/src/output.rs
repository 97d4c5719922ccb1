use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Write the report to `path`, or to standard output when no path is given
pub fn write_report(report: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, report)
                .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
            eprintln!("Report saved to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(report.as_bytes())?;
            if !report.ends_with('\n') {
                writeln!(stdout)?;
            }
            stdout.flush()?;
        }
    }

    Ok(())
}

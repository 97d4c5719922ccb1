//! Fleet report rendering (text, JSON, CSV)

pub mod export;
pub mod text;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FleetError, Result};
use crate::outcome::HostOutcome;

pub use export::{CsvExporter, JsonExporter, CSV_COLUMNS};
pub use text::{truncate_command, TextReport};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            _ => Err(FleetError::UnknownFormat(s.to_string())),
        }
    }
}

/// Render `outcomes` in their given order, stamped with the current time
pub fn render(outcomes: &[HostOutcome], format: ReportFormat) -> Result<String> {
    render_at(outcomes, format, Local::now())
}

/// Render with an explicit generation time (only the text header shows it)
pub fn render_at(
    outcomes: &[HostOutcome],
    format: ReportFormat,
    generated_at: DateTime<Local>,
) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(TextReport::new(generated_at).render(outcomes)),
        ReportFormat::Json => JsonExporter::render(outcomes),
        ReportFormat::Csv => CsvExporter::render(outcomes),
    }
}

use thiserror::Error;

/// Fleet-level errors.
///
/// Per-host failures never show up here; they are recorded in the host's
/// [`HostOutcome`](crate::HostOutcome). Only bad caller input and report
/// encoding can fail a whole run.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("No hosts specified")]
    EmptyHostList,

    #[error("Concurrency limit must be at least 1")]
    InvalidConcurrency,

    #[error("Unknown report format '{0}' (expected text, json or csv)")]
    UnknownFormat(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report encoding error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;

use thiserror::Error;

/// Errors raised while parsing query tool output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Telemetry output is empty")]
    Empty,

    #[error("Malformed telemetry document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

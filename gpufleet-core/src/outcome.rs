use chrono::{DateTime, Local};
use gpufleet_telemetry::HostTelemetry;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Terminal status of one host probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Telemetry collected
    Success,

    /// Unreachable, authentication rejected or connect timeout
    ConnectionFailed,

    /// Reachable, but the query tool is missing, failed or printed garbage
    NoGpuOrDriver,

    /// Anything else that went wrong while probing
    #[serde(rename = "error")]
    OtherError,
}

impl HostStatus {
    /// Wire name used in every report format
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Success => "success",
            HostStatus::ConnectionFailed => "connection_failed",
            HostStatus::NoGpuOrDriver => "no_gpu_or_driver",
            HostStatus::OtherError => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HostStatus::Success)
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one host, exactly once per fleet poll.
///
/// A successful outcome always carries telemetry and no error message; any
/// other status carries a non-empty error message and no telemetry. The
/// constructors and deserialization both enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OutcomeRecord")]
pub struct HostOutcome {
    hostname: String,
    timestamp: DateTime<Local>,
    status: HostStatus,
    error: Option<String>,
    gpu_info: Option<HostTelemetry>,
}

impl HostOutcome {
    /// Host answered with parseable telemetry
    pub fn success(hostname: impl Into<String>, telemetry: HostTelemetry) -> Self {
        Self {
            hostname: hostname.into(),
            timestamp: Local::now(),
            status: HostStatus::Success,
            error: None,
            gpu_info: Some(telemetry),
        }
    }

    pub fn connection_failed(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(hostname, HostStatus::ConnectionFailed, message)
    }

    pub fn no_gpu_or_driver(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(hostname, HostStatus::NoGpuOrDriver, message)
    }

    pub fn other_error(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(hostname, HostStatus::OtherError, message)
    }

    fn failure(hostname: impl Into<String>, status: HostStatus, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };

        Self {
            hostname: hostname.into(),
            timestamp: Local::now(),
            status,
            error: Some(message),
            gpu_info: None,
        }
    }

    /// Replace the probe timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn status(&self) -> HostStatus {
        self.status
    }

    /// Failure description; `None` exactly when the probe succeeded
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Telemetry; `Some` exactly when the probe succeeded
    pub fn telemetry(&self) -> Option<&HostTelemetry> {
        self.gpu_info.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Unvalidated shape of a serialized outcome
#[derive(Deserialize)]
struct OutcomeRecord {
    hostname: String,
    timestamp: DateTime<Local>,
    status: HostStatus,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    gpu_info: Option<HostTelemetry>,
}

impl TryFrom<OutcomeRecord> for HostOutcome {
    type Error = String;

    fn try_from(record: OutcomeRecord) -> Result<Self, Self::Error> {
        let outcome = match (record.status, record.gpu_info) {
            (HostStatus::Success, Some(telemetry)) => {
                HostOutcome::success(record.hostname, telemetry)
            }
            (HostStatus::Success, None) => {
                return Err(format!("host {}: success without gpu_info", record.hostname));
            }
            (status, None) => {
                HostOutcome::failure(record.hostname, status, record.error.unwrap_or_default())
            }
            (status, Some(_)) => {
                return Err(format!("host {}: status {} with gpu_info", record.hostname, status));
            }
        };

        Ok(outcome.with_timestamp(record.timestamp))
    }
}

/// Success/failure counts over a set of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl FleetSummary {
    pub fn from_outcomes(outcomes: &[HostOutcome]) -> Self {
        let successful = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            total: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
        }
    }
}

/// Readable text from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpufleet_telemetry::GpuRecord;

    fn telemetry() -> HostTelemetry {
        HostTelemetry {
            driver_version: "535.104.05".into(),
            cuda_version: "12.2".into(),
            gpus: vec![GpuRecord::default()],
        }
    }

    #[test]
    fn test_success_invariants() {
        let outcome = HostOutcome::success("node1", telemetry());

        assert_eq!(outcome.status(), HostStatus::Success);
        assert!(outcome.telemetry().is_some());
        assert!(outcome.error().is_none());
    }

    #[test]
    fn test_failure_invariants() {
        let outcome = HostOutcome::connection_failed("node1", "refused");
        assert_eq!(outcome.status(), HostStatus::ConnectionFailed);
        assert!(outcome.telemetry().is_none());
        assert_eq!(outcome.error(), Some("refused"));

        let outcome = HostOutcome::other_error("node1", "  ");
        assert_eq!(outcome.error(), Some("Unknown error"));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&HostStatus::OtherError).unwrap(), "\"error\"");
        assert_eq!(
            serde_json::to_string(&HostStatus::NoGpuOrDriver).unwrap(),
            "\"no_gpu_or_driver\""
        );
        assert_eq!(HostStatus::ConnectionFailed.to_string(), "connection_failed");
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_outcome() {
        let json = r#"{"hostname":"n","timestamp":"2026-10-19T10:00:00+00:00",
                       "status":"success","error":null,"gpu_info":null}"#;
        assert!(serde_json::from_str::<HostOutcome>(json).is_err());

        let json = r#"{"hostname":"n","timestamp":"2026-10-19T10:00:00+00:00",
                       "status":"error","error":"boom","gpu_info":null}"#;
        let outcome: HostOutcome = serde_json::from_str(json).unwrap();
        assert_eq!(outcome.status(), HostStatus::OtherError);
        assert_eq!(outcome.error(), Some("boom"));
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            HostOutcome::success("a", telemetry()),
            HostOutcome::no_gpu_or_driver("b", "nvidia-smi not found"),
            HostOutcome::connection_failed("c", "timeout"),
        ];

        let summary = FleetSummary::from_outcomes(&outcomes);
        assert_eq!(summary, FleetSummary { total: 3, successful: 1, failed: 2 });
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with non-string payload");
    }
}

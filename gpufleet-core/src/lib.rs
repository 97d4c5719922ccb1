//! gpufleet core engine
//!
//! Probes a fleet of GPU hosts over a remote shell and renders what it finds:
//!
//! - [`HostProber`] connects to one host, runs the telemetry query, parses it
//!   and enriches each GPU process with `ps` metadata.
//! - [`FleetScheduler`] runs probes across many hosts with a bounded worker
//!   pool and returns exactly one [`HostOutcome`] per host.
//! - [`report::render`] turns outcomes into a text, JSON or CSV report.

pub mod enrich;
pub mod error;
pub mod fleet;
pub mod outcome;
pub mod prober;
pub mod report;

// Re-export main types
pub use error::{FleetError, Result};
pub use fleet::{dedup_hostnames, FleetConfig, FleetScheduler};
pub use outcome::{FleetSummary, HostOutcome, HostStatus};
pub use prober::{HostProber, ProbeConfig, DEFAULT_QUERY_COMMAND};
pub use report::{render, ReportFormat};

pub use gpufleet_telemetry as telemetry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use futures::FutureExt;
use gpufleet_remote::{RemoteSession, Transport};
use gpufleet_telemetry::{parse, HostTelemetry};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::enrich::enrich_process;
use crate::outcome::{panic_message, HostOutcome};

/// Command that prints GPU telemetry as XML
pub const DEFAULT_QUERY_COMMAND: &str = "nvidia-smi -q -x";

/// Per-host probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Time allowed to connect and authenticate
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Time allowed for the telemetry query
    #[serde(default = "default_query_timeout")]
    pub query_timeout: Duration,

    /// Time allowed for each process lookup
    #[serde(default = "default_enrich_timeout")]
    pub enrich_timeout: Duration,

    /// Telemetry query command
    #[serde(default = "default_query_command")]
    pub query_command: String,

    /// Look up owner and command line of GPU processes
    #[serde(default = "default_enrich_processes")]
    pub enrich_processes: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            query_timeout: default_query_timeout(),
            enrich_timeout: default_enrich_timeout(),
            query_command: default_query_command(),
            enrich_processes: default_enrich_processes(),
        }
    }
}

impl ProbeConfig {
    /// Defaults with a different connection timeout
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
        .normalized()
    }

    /// Clamp timeouts so that enrich < query < connect.
    ///
    /// The query gets at most three quarters of the connect timeout and each
    /// process lookup at most half of the query timeout.
    pub fn normalized(mut self) -> Self {
        self.query_timeout = self.query_timeout.min(self.connect_timeout * 3 / 4);
        self.enrich_timeout = self.enrich_timeout.min(self.query_timeout / 2);
        self
    }

    /// Program name of the query command, as it would appear in shell errors
    fn query_tool(&self) -> &str {
        self.query_command
            .split_whitespace()
            .next()
            .unwrap_or(DEFAULT_QUERY_COMMAND)
    }
}

// Default value functions for serde
fn default_connect_timeout() -> Duration { Duration::from_secs(30) }
fn default_query_timeout() -> Duration { Duration::from_secs(20) }
fn default_enrich_timeout() -> Duration { Duration::from_secs(10) }
fn default_query_command() -> String { DEFAULT_QUERY_COMMAND.to_string() }
fn default_enrich_processes() -> bool { true }

/// Why a connected host produced no telemetry
#[derive(Debug)]
enum InspectError {
    /// Query tool missing, failing, silent or unparseable
    NoGpu(String),
    /// Session lost or other unexpected fault
    Other(String),
}

/// Probes one host at a time: connect, query, parse, enrich, close.
///
/// [`HostProber::probe`] always returns an outcome; every failure ends up in
/// the outcome's status and message.
pub struct HostProber {
    transport: Arc<dyn Transport>,
    config: ProbeConfig,
}

impl HostProber {
    pub fn new(transport: Arc<dyn Transport>, config: ProbeConfig) -> Self {
        Self {
            transport,
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe `hostname` and classify the result
    pub async fn probe(&self, hostname: &str) -> HostOutcome {
        info!("Checking node: {}", hostname);

        let session = match self.transport.connect(hostname, self.config.connect_timeout).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to connect to {}: {}", hostname, e);
                return HostOutcome::connection_failed(
                    hostname,
                    format!("Failed to establish SSH connection: {}", e),
                );
            }
        };

        let inspected = AssertUnwindSafe(self.inspect(session.as_ref()))
            .catch_unwind()
            .await;

        let outcome = match inspected {
            Ok(Ok(telemetry)) => {
                info!(
                    "{}: {} GPU(s), {} process(es)",
                    hostname,
                    telemetry.gpu_count(),
                    telemetry.process_count()
                );
                HostOutcome::success(hostname, telemetry)
            }
            Ok(Err(InspectError::NoGpu(message))) => {
                warn!("{}: {}", hostname, message);
                HostOutcome::no_gpu_or_driver(hostname, message)
            }
            Ok(Err(InspectError::Other(message))) => {
                warn!("{}: error during GPU check: {}", hostname, message);
                HostOutcome::other_error(hostname, format!("Error during GPU check: {}", message))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("{}: probe panicked: {}", hostname, message);
                HostOutcome::other_error(hostname, format!("Error during GPU check: {}", message))
            }
        };

        // Released on every path once connected
        if let Err(e) = session.close().await {
            debug!("Failed to close session to {}: {}", hostname, e);
        }

        outcome
    }

    async fn inspect(&self, session: &dyn RemoteSession) -> Result<HostTelemetry, InspectError> {
        let output = session
            .exec(&self.config.query_command, self.config.query_timeout)
            .await
            .map_err(|e| {
                if e.is_session_lost() {
                    InspectError::Other(e.to_string())
                } else {
                    InspectError::NoGpu(format!("Failed to get GPU info: {}", e))
                }
            })?;

        let tool = self.config.query_tool();
        if !output.stderr.is_empty() && output.stderr.to_lowercase().contains(&tool.to_lowercase()) {
            debug!("{}: query stderr: {}", session.host(), output.stderr.trim());
            return Err(InspectError::NoGpu(format!(
                "{} not found or NVIDIA drivers not installed",
                tool
            )));
        }

        if output.stdout.trim().is_empty() {
            return Err(InspectError::NoGpu(format!("No output from {} command", tool)));
        }

        let mut telemetry = parse(&output.stdout)
            .map_err(|e| InspectError::NoGpu(format!("Failed to get GPU info: {}", e)))?;

        if self.config.enrich_processes {
            self.enrich_all(session, &mut telemetry).await;
        }

        Ok(telemetry)
    }

    async fn enrich_all(&self, session: &dyn RemoteSession, telemetry: &mut HostTelemetry) {
        let mut enriched = 0;
        for process in telemetry.gpus.iter_mut().flat_map(|gpu| gpu.processes.iter_mut()) {
            let found = enrich_process(session, &process.pid, self.config.enrich_timeout).await;
            if found.enriched {
                enriched += 1;
            }
            found.apply_to(process);
        }

        debug!(
            "{}: enriched {}/{} process(es)",
            session.host(),
            enriched,
            telemetry.process_count()
        );
    }
}

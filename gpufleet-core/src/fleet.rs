use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};
use crate::outcome::{panic_message, HostOutcome};
use crate::prober::HostProber;

/// Fleet scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Maximum number of hosts worked on at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Give up on hosts still in flight after this long
    #[serde(default)]
    pub fleet_timeout: Option<Duration>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fleet_timeout: None,
        }
    }
}

fn default_concurrency() -> usize {
    10
}

/// Remove repeated hostnames, keeping the first occurrence of each in order
pub fn dedup_hostnames<I, S>(hostnames: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    hostnames
        .into_iter()
        .map(Into::into)
        .filter(|host| seen.insert(host.clone()))
        .collect()
}

/// Runs [`HostProber`] across a fleet with a bounded worker pool.
///
/// Workers pull hostnames from a shared queue and push finished outcomes to a
/// completion channel. Once every worker is done (or the fleet timeout
/// fires), outcomes are put back into the caller's hostname order. Every
/// requested host gets exactly one outcome.
pub struct FleetScheduler {
    prober: Arc<HostProber>,
    config: FleetConfig,
}

impl FleetScheduler {
    pub fn new(prober: HostProber, config: FleetConfig) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(FleetError::InvalidConcurrency);
        }

        Ok(Self {
            prober: Arc::new(prober),
            config,
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Probe every host and return one outcome per host, in input order
    pub async fn poll(&self, hostnames: &[String]) -> Result<Vec<HostOutcome>> {
        self.poll_with_progress(hostnames, |_| {}).await
    }

    /// Like [`poll`](Self::poll), calling `on_complete` as each host finishes
    pub async fn poll_with_progress<F>(
        &self,
        hostnames: &[String],
        mut on_complete: F,
    ) -> Result<Vec<HostOutcome>>
    where
        F: FnMut(&HostOutcome),
    {
        if hostnames.is_empty() {
            return Err(FleetError::EmptyHostList);
        }

        let hosts = dedup_hostnames(hostnames.iter().map(String::as_str));
        if hosts.len() != hostnames.len() {
            warn!("Ignoring {} duplicate hostname(s)", hostnames.len() - hosts.len());
        }

        let started = Instant::now();
        let worker_count = self.config.concurrency.min(hosts.len());
        info!("Polling {} host(s) with {} worker(s)", hosts.len(), worker_count);

        let queue = Arc::new(Mutex::new(hosts.iter().cloned().collect::<VecDeque<_>>()));
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();

        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let prober = Arc::clone(&self.prober);
                let completion_tx = completion_tx.clone();

                tokio::spawn(async move {
                    loop {
                        let next = queue.lock().pop_front();
                        let Some(hostname) = next else {
                            break;
                        };

                        let outcome = match AssertUnwindSafe(prober.probe(&hostname))
                            .catch_unwind()
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(panic) => HostOutcome::other_error(
                                &hostname,
                                format!("Unexpected error: {}", panic_message(panic.as_ref())),
                            ),
                        };

                        if completion_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                    debug!("Worker {} idle", worker_id);
                })
            })
            .collect();
        drop(completion_tx);

        let mut arrived = Vec::with_capacity(hosts.len());
        let collect = async {
            while let Some(outcome) = completion_rx.recv().await {
                on_complete(&outcome);
                arrived.push(outcome);
            }
        };

        let timed_out = match self.config.fleet_timeout {
            Some(limit) => timeout(limit, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        if timed_out {
            drain_ready(&mut completion_rx, &mut arrived, &mut on_complete);
            warn!(
                "Fleet timeout reached with {} of {} host(s) finished",
                arrived.len(),
                hosts.len()
            );
            for worker in &workers {
                worker.abort();
            }
        }

        for worker in workers {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    warn!("Fleet worker failed: {}", e);
                }
            }
        }

        let outcomes = assemble(&hosts, arrived, timed_out);
        info!("Fleet poll finished in {:.1}s", started.elapsed().as_secs_f64());

        Ok(outcomes)
    }
}

/// Move outcomes already queued on the channel into `arrived`
fn drain_ready<F>(
    completion_rx: &mut mpsc::UnboundedReceiver<HostOutcome>,
    arrived: &mut Vec<HostOutcome>,
    on_complete: &mut F,
) where
    F: FnMut(&HostOutcome),
{
    while let Ok(outcome) = completion_rx.try_recv() {
        on_complete(&outcome);
        arrived.push(outcome);
    }
}

/// Reorder arrivals into `hosts` order, filling in hosts that never reported
fn assemble(hosts: &[String], arrived: Vec<HostOutcome>, timed_out: bool) -> Vec<HostOutcome> {
    let mut by_host: HashMap<String, HostOutcome> = arrived
        .into_iter()
        .map(|outcome| (outcome.hostname().to_string(), outcome))
        .collect();

    hosts
        .iter()
        .map(|host| {
            by_host.remove(host).unwrap_or_else(|| {
                let message = if timed_out {
                    "Fleet timeout exceeded"
                } else {
                    "Unexpected error: host did not report"
                };
                HostOutcome::other_error(host, message)
            })
        })
        .collect()
}

use anyhow::Result;
use console::style;
use gpufleet_core::{render, FleetScheduler, FleetSummary, HostOutcome, HostProber};
use gpufleet_remote::SshTransport;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::output::write_report;

/// Poll every host in `settings` and emit the report
pub async fn execute(settings: Settings) -> Result<()> {
    print_plan(&settings);

    let transport = SshTransport::new(settings.username.clone(), settings.credentials.clone())
        .with_config(settings.ssh_config());
    info!(
        "Connecting as {} using {} authentication",
        settings.username,
        settings.credentials.kind()
    );

    let prober = HostProber::new(Arc::new(transport), settings.probe_config());
    let scheduler = FleetScheduler::new(prober, settings.fleet_config())?;

    let pb = ProgressBar::new(settings.hosts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let outcomes = scheduler
        .poll_with_progress(&settings.hosts, |outcome| {
            pb.set_message(outcome.hostname().to_string());
            pb.inc(1);
        })
        .await?;
    pb.finish_and_clear();

    let summary = FleetSummary::from_outcomes(&outcomes);
    eprintln!(
        "{} {} of {} nodes responded, {} active GPU users",
        style("✓").green(),
        summary.successful,
        summary.total,
        fleet_users(&outcomes).len()
    );

    let report = render(&outcomes, settings.format)?;
    write_report(&report, settings.output.as_deref())
}

/// Distinct process owners across every host that answered
fn fleet_users(outcomes: &[HostOutcome]) -> BTreeSet<&str> {
    outcomes
        .iter()
        .filter_map(HostOutcome::telemetry)
        .flat_map(|telemetry| telemetry.active_users())
        .collect()
}

fn print_plan(settings: &Settings) {
    eprintln!("Checking {} nodes...", settings.hosts.len());
    if let Some((path, count)) = &settings.sources.from_file {
        eprintln!("  - {} nodes from file: {}", count, path.display());
    }
    if settings.sources.from_args > 0 {
        eprintln!("  - {} nodes from command line", settings.sources.from_args);
    }
}

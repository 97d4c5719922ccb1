use chrono::{DateTime, Local, SecondsFormat};
use gpufleet_telemetry::{GpuRecord, HostTelemetry};

use crate::outcome::{FleetSummary, HostOutcome};

/// Commands longer than this are truncated
const COMMAND_WIDTH: usize = 60;
const ELLIPSIS: &str = "...";

/// Human-readable fleet report
pub struct TextReport {
    generated_at: DateTime<Local>,
}

impl TextReport {
    pub fn new(generated_at: DateTime<Local>) -> Self {
        Self { generated_at }
    }

    pub fn render(&self, outcomes: &[HostOutcome]) -> String {
        let mut out = String::new();
        let banner = "=".repeat(80);
        let summary = FleetSummary::from_outcomes(outcomes);

        out.push_str(&format!("{}\n", banner));
        out.push_str("GPU Cluster Monitoring Report\n");
        out.push_str(&format!("Generated at: {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("{}\n", banner));
        out.push('\n');

        out.push_str("SUMMARY:\n");
        out.push_str(&format!("  Total nodes checked: {}\n", summary.total));
        out.push_str(&format!("  Successful: {}\n", summary.successful));
        out.push_str(&format!("  Failed: {}\n", summary.failed));
        out.push('\n');

        for outcome in outcomes {
            write_host(&mut out, outcome);
        }

        out
    }
}

fn write_host(out: &mut String, outcome: &HostOutcome) {
    out.push_str(&format!("{}\n", "-".repeat(60)));
    out.push_str(&format!("Node: {}\n", outcome.hostname()));
    out.push_str(&format!("Status: {}\n", outcome.status()));
    out.push_str(&format!(
        "Timestamp: {}\n",
        outcome.timestamp().to_rfc3339_opts(SecondsFormat::Secs, false)
    ));

    match outcome.telemetry() {
        Some(telemetry) => write_telemetry(out, telemetry),
        None => {
            out.push_str(&format!("Error: {}\n", outcome.error().unwrap_or("Unknown error")));
        }
    }

    out.push('\n');
}

fn write_telemetry(out: &mut String, telemetry: &HostTelemetry) {
    out.push_str(&format!("Driver Version: {}\n", telemetry.driver_version));
    out.push_str(&format!("CUDA Version: {}\n", telemetry.cuda_version));
    out.push('\n');

    for (index, gpu) in telemetry.gpus.iter().enumerate() {
        write_gpu(out, index, gpu);
    }
}

fn write_gpu(out: &mut String, index: usize, gpu: &GpuRecord) {
    out.push_str(&format!("  GPU {} ({}):\n", index, gpu.id));
    out.push_str(&format!("    Name: {}\n", gpu.name));
    out.push_str(&format!(
        "    Memory: {} / {} ({}%)\n",
        gpu.memory_used, gpu.memory_total, gpu.memory_usage_percent
    ));
    out.push_str(&format!("    GPU Utilization: {}\n", gpu.gpu_utilization));
    out.push_str(&format!("    Temperature: {}\n", gpu.temperature));
    out.push_str(&format!("    Power: {} / {}\n", gpu.power_draw, gpu.power_limit));

    if gpu.processes.is_empty() {
        out.push_str("    No processes running\n");
    } else {
        out.push_str(&format!("    Processes ({}):\n", gpu.processes.len()));
        for process in &gpu.processes {
            out.push_str(&format!(
                "      PID {} - User: {} - Memory: {} - Time: {}\n",
                process.pid,
                process.display_user(),
                process.used_memory,
                process.display_elapsed()
            ));
            out.push_str(&format!("        Command: {}\n", truncate_command(process.display_command())));
        }
    }

    out.push('\n');
}

/// Shorten a command line to at most 60 characters, marking the cut with `...`
pub fn truncate_command(command: &str) -> String {
    if command.chars().count() <= COMMAND_WIDTH {
        return command.to_string();
    }

    let kept: String = command
        .chars()
        .take(COMMAND_WIDTH - ELLIPSIS.len())
        .collect();
    format!("{}{}", kept, ELLIPSIS)
}

//! Machine-readable report encodings (JSON, CSV)

use csv::Writer;
use gpufleet_telemetry::GpuRecord;

use crate::error::{FleetError, Result};
use crate::outcome::HostOutcome;

/// CSV header, in column order
pub const CSV_COLUMNS: [&str; 17] = [
    "hostname",
    "status",
    "timestamp",
    "error",
    "driver_version",
    "cuda_version",
    "gpu_id",
    "gpu_name",
    "memory_used",
    "memory_total",
    "memory_usage_percent",
    "gpu_utilization",
    "temperature",
    "power_draw",
    "processes_count",
    "process_users",
    "process_commands",
];

/// Separator for multi-process CSV fields
const JOIN: &str = "; ";

/// JSON exporter
pub struct JsonExporter;

impl JsonExporter {
    /// Pretty-printed array of outcomes
    pub fn render(outcomes: &[HostOutcome]) -> Result<String> {
        Ok(serde_json::to_string_pretty(outcomes)?)
    }

    /// Read back a report produced by [`JsonExporter::render`]
    pub fn parse(json: &str) -> Result<Vec<HostOutcome>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// CSV exporter: one row per (host, GPU)
pub struct CsvExporter;

impl CsvExporter {
    pub fn render(outcomes: &[HostOutcome]) -> Result<String> {
        let mut wtr = Writer::from_writer(vec![]);
        wtr.write_record(CSV_COLUMNS)?;

        for outcome in outcomes {
            let hostname = outcome.hostname().to_string();
            let status = outcome.status().to_string();
            let timestamp = outcome.timestamp().to_rfc3339();
            let error = outcome.error().unwrap_or_default().to_string();

            let Some(telemetry) = outcome.telemetry() else {
                wtr.write_record(host_row(hostname, status, timestamp, error, "", ""))?;
                continue;
            };

            // A host that answered but lists no GPUs still gets a row
            if telemetry.gpus.is_empty() {
                wtr.write_record(host_row(
                    hostname,
                    status,
                    timestamp,
                    error,
                    &telemetry.driver_version,
                    &telemetry.cuda_version,
                ))?;
                continue;
            }

            for gpu in &telemetry.gpus {
                let mut row = host_row(
                    hostname.clone(),
                    status.clone(),
                    timestamp.clone(),
                    error.clone(),
                    &telemetry.driver_version,
                    &telemetry.cuda_version,
                );
                fill_gpu_columns(&mut row, gpu);
                wtr.write_record(row)?;
            }
        }

        let data = wtr
            .into_inner()
            .map_err(|e| FleetError::Render(format!("CSV writer error: {}", e)))?;
        String::from_utf8(data).map_err(|e| FleetError::Render(format!("UTF-8 conversion error: {}", e)))
    }
}

/// Row with host columns set and every GPU column blank
fn host_row(
    hostname: String,
    status: String,
    timestamp: String,
    error: String,
    driver_version: &str,
    cuda_version: &str,
) -> [String; 17] {
    let mut row: [String; 17] = Default::default();
    row[0] = hostname;
    row[1] = status;
    row[2] = timestamp;
    row[3] = error;
    row[4] = driver_version.to_string();
    row[5] = cuda_version.to_string();
    row
}

fn fill_gpu_columns(row: &mut [String; 17], gpu: &GpuRecord) {
    row[6] = gpu.id.clone();
    row[7] = gpu.name.clone();
    row[8] = gpu.memory_used.clone();
    row[9] = gpu.memory_total.clone();
    row[10] = gpu.memory_usage_percent.to_string();
    row[11] = gpu.gpu_utilization.clone();
    row[12] = gpu.temperature.clone();
    row[13] = gpu.power_draw.clone();
    row[14] = gpu.processes.len().to_string();
    row[15] = gpu
        .processes
        .iter()
        .map(|p| p.display_user())
        .collect::<Vec<_>>()
        .join(JOIN);
    row[16] = gpu
        .processes
        .iter()
        .map(|p| p.display_command())
        .collect::<Vec<_>>()
        .join(JOIN);
}

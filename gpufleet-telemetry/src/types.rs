use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker stored in any field the query tool did not report
pub const UNKNOWN: &str = "Unknown";

pub(crate) fn unknown() -> String {
    UNKNOWN.to_string()
}

/// GPU telemetry reported by a single host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTelemetry {
    /// Driver version from the document root
    #[serde(default = "unknown")]
    pub driver_version: String,

    /// CUDA platform version from the document root
    #[serde(default = "unknown")]
    pub cuda_version: String,

    /// GPUs in document order (position is the GPU index shown in reports)
    #[serde(default)]
    pub gpus: Vec<GpuRecord>,
}

impl HostTelemetry {
    /// Number of GPUs reported
    pub fn gpu_count(&self) -> usize {
        self.gpus.len()
    }

    /// Number of processes across all GPUs
    pub fn process_count(&self) -> usize {
        self.gpus.iter().map(|gpu| gpu.processes.len()).sum()
    }

    /// Distinct owners of GPU processes, where enrichment found one
    pub fn active_users(&self) -> BTreeSet<&str> {
        self.gpus
            .iter()
            .flat_map(|gpu| gpu.processes.iter())
            .filter_map(|process| process.user.as_deref())
            .collect()
    }
}

/// Normalized record for one GPU
///
/// Readings are kept exactly as the query tool printed them (for example
/// `"8000 MiB"` or `"45 %"`); anything missing holds [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuRecord {
    /// Bus id attribute of the GPU node
    #[serde(default = "unknown")]
    pub id: String,

    /// Product name
    #[serde(default = "unknown")]
    pub name: String,

    #[serde(default = "unknown")]
    pub uuid: String,

    /// Framebuffer memory readings
    #[serde(default = "unknown")]
    pub memory_total: String,
    #[serde(default = "unknown")]
    pub memory_used: String,
    #[serde(default = "unknown")]
    pub memory_free: String,

    /// Derived from used/total, rounded to 2 decimals
    #[serde(default)]
    pub memory_usage_percent: UsagePercent,

    #[serde(default = "unknown")]
    pub gpu_utilization: String,
    #[serde(default = "unknown")]
    pub memory_utilization: String,

    /// Core temperature
    #[serde(default = "unknown")]
    pub temperature: String,

    #[serde(default = "unknown")]
    pub power_draw: String,
    #[serde(default = "unknown")]
    pub power_limit: String,

    /// Compute/graphics processes in document order
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
}

impl Default for GpuRecord {
    fn default() -> Self {
        Self {
            id: unknown(),
            name: unknown(),
            uuid: unknown(),
            memory_total: unknown(),
            memory_used: unknown(),
            memory_free: unknown(),
            memory_usage_percent: UsagePercent::Unknown,
            gpu_utilization: unknown(),
            memory_utilization: unknown(),
            temperature: unknown(),
            power_draw: unknown(),
            power_limit: unknown(),
            processes: Vec::new(),
        }
    }
}

/// A process running on a GPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    #[serde(default = "unknown")]
    pub pid: String,

    /// `C`, `G` or `C+G`
    #[serde(rename = "type", default = "unknown")]
    pub process_type: String,

    #[serde(default = "unknown")]
    pub process_name: String,

    #[serde(default = "unknown")]
    pub used_memory: String,

    // Best-effort OS metadata, filled in by enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self {
            pid: unknown(),
            process_type: unknown(),
            process_name: unknown(),
            used_memory: unknown(),
            user: None,
            start_time: None,
            elapsed_time: None,
            command: None,
        }
    }
}

impl ProcessRecord {
    /// Full command line when known, otherwise the process name
    pub fn display_command(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.process_name)
    }

    /// Owning user, or [`UNKNOWN`]
    pub fn display_user(&self) -> &str {
        self.user.as_deref().unwrap_or(UNKNOWN)
    }

    /// Elapsed run time, or [`UNKNOWN`]
    pub fn display_elapsed(&self) -> &str {
        self.elapsed_time.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Memory usage percentage of a GPU
///
/// Serialized as a plain number, or as the string `"Unknown"` when it could
/// not be derived.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum UsagePercent {
    Known(f64),
    #[default]
    Unknown,
}

impl UsagePercent {
    /// Derive `used / total * 100` from raw memory readings.
    ///
    /// Never yields NaN or infinity: unparseable readings or a zero total give
    /// [`UsagePercent::Unknown`].
    pub fn from_readings(used: &str, total: &str) -> Self {
        match (parse_mib(used), parse_mib(total)) {
            (Some(used), Some(total)) if total != 0.0 => {
                let percent = (used / total * 100.0 * 100.0).round() / 100.0;
                if percent.is_finite() {
                    UsagePercent::Known(percent)
                } else {
                    UsagePercent::Unknown
                }
            }
            _ => UsagePercent::Unknown,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            UsagePercent::Known(value) => Some(*value),
            UsagePercent::Unknown => None,
        }
    }
}

impl fmt::Display for UsagePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsagePercent::Known(value) if value.fract() == 0.0 => write!(f, "{:.1}", value),
            UsagePercent::Known(value) => write!(f, "{}", value),
            UsagePercent::Unknown => f.write_str(UNKNOWN),
        }
    }
}

impl Serialize for UsagePercent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            UsagePercent::Known(value) => serializer.serialize_f64(*value),
            UsagePercent::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl<'de> Deserialize<'de> for UsagePercent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(value) if value.is_finite() => UsagePercent::Known(value),
            _ => UsagePercent::Unknown,
        })
    }
}

/// Parse a memory reading such as `"8000 MiB"` into a MiB count
pub(crate) fn parse_mib(reading: &str) -> Option<f64> {
    let trimmed = reading.trim();
    let number = trimmed.strip_suffix("MiB").unwrap_or(trimmed).trim_end();
    number.parse::<f64>().ok().filter(|value| value.is_finite())
}

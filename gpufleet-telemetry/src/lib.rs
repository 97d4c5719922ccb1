//! GPU telemetry model and parser
//!
//! Turns the structured XML printed by `nvidia-smi -q -x` into a fixed-shape
//! [`HostTelemetry`] record. Every field the tool did not report is filled with
//! the [`UNKNOWN`] marker, so consumers never deal with missing keys.
//!
//! # Example
//!
//! ```
//! use gpufleet_telemetry::parse;
//!
//! let xml = r#"<nvidia_smi_log>
//!     <driver_version>535.104.05</driver_version>
//!     <cuda_version>12.2</cuda_version>
//!     <gpu id="00000000:01:00.0">
//!         <product_name>NVIDIA A100-SXM4-40GB</product_name>
//!         <fb_memory_usage>
//!             <total>40960 MiB</total>
//!             <used>10240 MiB</used>
//!             <free>30720 MiB</free>
//!         </fb_memory_usage>
//!     </gpu>
//! </nvidia_smi_log>"#;
//!
//! let telemetry = parse(xml).unwrap();
//! assert_eq!(telemetry.gpus.len(), 1);
//! assert_eq!(telemetry.gpus[0].memory_usage_percent.value(), Some(25.0));
//! ```

pub mod error;
pub mod parser;
pub mod types;

// Re-export main types
pub use error::{ParseError, Result};
pub use parser::parse;
pub use types::{GpuRecord, HostTelemetry, ProcessRecord, UsagePercent, UNKNOWN};

/// Version of the gpufleet-telemetry library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

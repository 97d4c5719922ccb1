use anyhow::{Context, Result};
use gpufleet_core::{dedup_hostnames, FleetConfig, ProbeConfig, ReportFormat};
use gpufleet_remote::{Credentials, SshConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::args::Cli;
use crate::nodes::load_nodes_file;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WORKERS: usize = 10;

/// Optional settings file (`~/.config/gpufleet/config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub username: Option<String>,
    pub key: Option<PathBuf>,
    pub port: Option<u16>,
    /// Connection timeout in seconds
    pub timeout: Option<u64>,
    pub workers: Option<usize>,
    pub format: Option<ReportFormat>,
    /// Fleet timeout in seconds
    pub fleet_timeout: Option<u64>,
    pub nodes_file: Option<PathBuf>,
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gpufleet").join("config.toml"))
}

/// Load the config file.
///
/// An explicitly named file must exist; the default location is only read
/// when present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Error reading config file '{}'", path.display()))?;
    let config = toml::from_str(&contents)
        .with_context(|| format!("Invalid config file '{}'", path.display()))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Command-line problems reported as usage errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("No nodes specified. Provide nodes via command line or --nodes-file option.")]
    NoHosts,

    #[error("An SSH username is required (-u/--username or `username` in the config file)")]
    NoUsername,

    #[error("workers must be at least 1")]
    ZeroWorkers,
}

/// Where the polled hostnames came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSources {
    pub from_args: usize,
    pub from_file: Option<(PathBuf, usize)>,
}

/// Fully resolved run settings: flag, then config file, then default
#[derive(Debug)]
pub struct Settings {
    pub hosts: Vec<String>,
    pub sources: HostSources,
    pub username: String,
    pub credentials: Credentials,
    pub port: u16,
    pub timeout: Duration,
    pub workers: usize,
    pub format: ReportFormat,
    pub output: Option<PathBuf>,
    pub fleet_timeout: Option<Duration>,
}

impl Settings {
    /// Merge `cli` over `file`, reading the nodes file if one is named.
    ///
    /// Node-file errors are returned as-is; missing hosts, username or
    /// workers come back as a [`UsageError`] inside the `anyhow::Error`.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let nodes_file = cli.nodes_file.or(file.nodes_file);
        let file_hosts = match &nodes_file {
            Some(path) => Some((path.clone(), load_nodes_file(path)?)),
            None => None,
        };

        let from_args = cli.hosts.len();
        let mut hosts = cli.hosts;
        let from_file = file_hosts.map(|(path, nodes)| {
            let count = nodes.len();
            hosts.extend(nodes);
            (path, count)
        });

        let hosts = dedup_hostnames(hosts);
        if hosts.is_empty() {
            return Err(UsageError::NoHosts.into());
        }

        let username = cli.username.or(file.username).ok_or(UsageError::NoUsername)?;
        let workers = cli.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(UsageError::ZeroWorkers.into());
        }

        Ok(Self {
            hosts,
            sources: HostSources { from_args, from_file },
            username,
            credentials: Credentials::from_options(cli.key.or(file.key), cli.password),
            port: file.port.unwrap_or_else(|| SshConfig::default().port),
            timeout: Duration::from_secs(cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS)),
            workers,
            format: cli.format.map(Into::into).or(file.format).unwrap_or_default(),
            output: cli.output,
            fleet_timeout: cli.fleet_timeout.or(file.fleet_timeout).map(Duration::from_secs),
        })
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            port: self.port,
            ..SshConfig::default()
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::with_connect_timeout(self.timeout)
    }

    pub fn fleet_config(&self) -> FleetConfig {
        FleetConfig {
            concurrency: self.workers,
            fleet_timeout: self.fleet_timeout,
        }
    }
}

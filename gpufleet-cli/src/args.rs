use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use gpufleet_core::ReportFormat;
use std::path::PathBuf;

/// gpufleet - GPU usage across a fleet of hosts
#[derive(Parser, Debug)]
#[command(name = "gpufleet")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:
  gpufleet -u alice -k ~/.ssh/id_ed25519 node1 node2 node3
  gpufleet -u alice --nodes-file nodes.txt -f csv -o report.csv
  gpufleet -u alice --nodes-file nodes.txt node4 node5:2222")]
pub struct Cli {
    /// Hostnames or IP addresses, optionally as host:port
    #[arg(value_name = "HOST")]
    pub hosts: Vec<String>,

    /// File with one hostname per line (# starts a comment)
    #[arg(short = 'n', long, value_name = "PATH")]
    pub nodes_file: Option<PathBuf>,

    /// SSH username
    #[arg(short, long)]
    pub username: Option<String>,

    /// SSH private key file
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// SSH password, or the key passphrase when --key is given
    #[arg(short, long)]
    pub password: Option<String>,

    /// SSH connection timeout in seconds [default: 30]
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Maximum concurrent connections [default: 10]
    #[arg(short, long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub workers: Option<usize>,

    /// Report format [default: text]
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write the report here instead of standard output
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Stop waiting for hosts after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub fleet_timeout: Option<u64>,

    /// Config file path
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Report format as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
    Csv,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
            FormatArg::Csv => ReportFormat::Csv,
        }
    }
}

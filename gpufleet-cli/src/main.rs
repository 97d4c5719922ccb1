use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use gpufleet_cli::config::{load_file_config, Settings, UsageError};
use gpufleet_cli::{monitor, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout stays reserved for the report
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(cli.verbose > 1)
        .init();

    let file_config = load_file_config(cli.config.as_deref())?;

    let settings = match Settings::resolve(cli, file_config) {
        Ok(settings) => settings,
        Err(err) => match err.downcast_ref::<UsageError>() {
            Some(usage) => Cli::command()
                .error(ErrorKind::MissingRequiredArgument, usage.to_string())
                .exit(),
            None => return Err(err),
        },
    };

    monitor::execute(settings).await
}

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bm6_cli::cli::Cli;
use bm6_cli::commands::{cmd_read, cmd_scan};
use bm6_cli::config::{Config, Settings};
use bm6_cli::util::cancel_on_ctrl_c;
use bm6_core::BleTransport;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // Logs go to stderr so stdout only carries command output
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let settings = Settings::resolve(&cli, &config);
    tracing::debug!("Using {:?}", settings);

    let transport = BleTransport::new().await?;

    match cli.address.as_deref() {
        Some(address) => {
            let cancel = cancel_on_ctrl_c();
            cmd_read(
                &transport,
                address,
                settings.session_config(),
                settings.format,
                cli.output.as_ref(),
                &cancel,
            )
            .await
        }
        None => {
            cmd_scan(
                &transport,
                settings.scan_duration,
                settings.format,
                cli.output.as_ref(),
            )
            .await
        }
    }
}

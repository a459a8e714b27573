//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain lines for humans
    #[default]
    Ascii,
    /// JSON for scripts
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bm6")]
#[command(
    author,
    version,
    about = "Read BM6 battery monitors over Bluetooth LE",
    long_about = None
)]
#[command(group(ArgGroup::new("action").required(true).multiple(false).args(["scan", "address"])))]
pub struct Cli {
    /// Scan for nearby BM6 monitors
    #[arg(long)]
    pub scan: bool,

    /// Read voltage and temperature from the monitor at this address
    #[arg(long, value_name = "ADDRESS")]
    pub address: Option<String>,

    /// Output format [default: ascii, or `format` from the config file]
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Connection timeout in seconds [default: 30]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds to wait for a reading after subscribing, 0 waits indefinitely [default: 30]
    #[arg(long, value_name = "SECS")]
    pub read_timeout: Option<u64>,

    /// Scan duration in seconds [default: 5]
    #[arg(long, value_name = "SECS")]
    pub scan_duration: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_flag() {
        let cli = Cli::try_parse_from(["bm6", "--scan"]).unwrap();
        assert!(cli.scan);
        assert!(cli.address.is_none());
        assert_eq!(cli.format, None);
    }

    #[test]
    fn test_address_with_format() {
        let cli =
            Cli::try_parse_from(["bm6", "--address", "AA:BB:CC:DD:EE:FF", "--format", "json"])
                .unwrap();
        assert_eq!(cli.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_scan_and_address_conflict() {
        let err = Cli::try_parse_from(["bm6", "--scan", "--address", "AA:BB:CC:DD:EE:FF"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = Cli::try_parse_from(["bm6", "--scan", "--format", "csv"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_timeouts() {
        let cli = Cli::try_parse_from([
            "bm6",
            "--address",
            "AA:BB:CC:DD:EE:FF",
            "--timeout",
            "10",
            "--read-timeout",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.timeout, Some(10));
        assert_eq!(cli.read_timeout, Some(0));
    }
}

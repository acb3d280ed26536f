use crate::domain::config::DriverKind;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for uartmon
#[derive(Parser, Debug)]
#[command(
    name = "uartmon",
    version = env!("CARGO_PKG_VERSION"),
    about = "Multi-session serial port monitor",
    long_about = "Connects to serial devices (or simulated ones), streams their lines, forwards input and reports per-session statistics."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Device driver, overriding the configuration file
    #[arg(short, long, value_enum, global = true)]
    pub driver: Option<DriverArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports visible to the driver
    Ports,
    /// Connect to a port and stream its traffic
    Monitor(MonitorArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverArg {
    /// Real hardware when any is present, otherwise mock
    Auto,
    /// Real serial devices only
    Serial,
    /// Simulated devices
    Mock,
}

impl From<DriverArg> for DriverKind {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Auto => DriverKind::Auto,
            DriverArg::Serial => DriverKind::Serial,
            DriverArg::Mock => DriverKind::Mock,
        }
    }
}

/// Monitor arguments
#[derive(ClapArgs, Debug)]
pub struct MonitorArgs {
    /// Serial port path
    #[arg(short, long)]
    pub port: String,

    /// Baud rate (configured default when omitted)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Session id to register the connection under
    #[arg(short, long, default_value = "1")]
    pub session: u32,

    /// Stop after this many seconds instead of waiting for end of input
    #[arg(long)]
    pub duration: Option<u64>,

    /// Messages included in the export printed on exit (0 for all)
    #[arg(long, default_value = "100")]
    pub export_limit: usize,

    /// Do not read lines to send from stdin
    #[arg(long)]
    pub no_input: bool,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_monitor() {
        let args = Args::parse_from([
            "uartmon", "--driver", "mock", "monitor", "--port", "COM1", "--duration", "2",
        ]);
        assert_eq!(args.driver, Some(DriverArg::Mock));
        match args.command {
            Command::Monitor(monitor) => {
                assert_eq!(monitor.port, "COM1");
                assert_eq!(monitor.baud, None);
                assert_eq!(monitor.session, 1);
                assert_eq!(monitor.duration, Some(2));
                assert_eq!(monitor.export_limit, 100);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["uartmon", "ports", "--output", "json", "-q"]);
        assert_eq!(args.output, OutputFormat::Json);
        assert!(args.quiet);
        assert!(matches!(args.command, Command::Ports));
    }

    #[test]
    fn test_monitor_requires_port() {
        assert!(Args::try_parse_from(["uartmon", "monitor"]).is_err());
    }

    #[test]
    fn test_driver_arg_conversion() {
        assert_eq!(DriverKind::from(DriverArg::Serial), DriverKind::Serial);
    }
}

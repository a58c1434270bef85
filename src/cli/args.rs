//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use crate::core::config::{ColorMode, SourceType};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive a scanner from the command line and save the scanned pages
#[derive(Parser, Debug)]
#[command(name = "scanner-cli")]
#[command(version = "1.0.0")]
#[command(about = "Scan pages from a scanner to image files, cancellable through a trigger file", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// List available scanners and exit
    #[arg(short = 'L', long)]
    pub list: bool,

    /// Print the scanner list as JSON (with --list)
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Part of the scanner name to use, case-insensitive (overrides config)
    #[arg(short, long, value_name = "NAME")]
    pub device: Option<String>,

    /// Paper source: feeder, flatbed (reflected), positive or negative
    #[arg(short, long, value_enum, ignore_case = true)]
    pub source: Option<SourceType>,

    /// Color mode: bw, gray or color
    #[arg(short, long, value_enum, ignore_case = true)]
    pub mode: Option<ColorMode>,

    /// Resolution in DPI, 0 keeps the scanner default
    #[arg(short, long, value_name = "DPI")]
    pub resolution: Option<u32>,

    /// Output directory for scanned pages (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Left edge of the scan area in millimeters
    #[arg(short, long, value_name = "MM")]
    pub left: Option<f32>,

    /// Top edge of the scan area in millimeters
    #[arg(short, long, value_name = "MM")]
    pub top: Option<f32>,

    /// Width of the scan area in millimeters
    #[arg(short = 'x', long, value_name = "MM")]
    pub width: Option<f32>,

    /// Height of the scan area in millimeters
    #[arg(short = 'y', long, value_name = "MM")]
    pub height: Option<f32>,

    /// Scan both sides of each sheet
    #[arg(long)]
    pub duplex: bool,

    /// Show the scanner's own dialog instead of applying settings
    #[arg(long = "show-ui", alias = "showUI")]
    pub show_ui: bool,

    /// Name of the file whose creation cancels the scan
    #[arg(long, value_name = "NAME")]
    pub cancel_trigger: Option<String>,

    /// Simulated scanner scenario backing the device subsystem (overrides config)
    #[arg(long)]
    pub scenario: Option<String>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the configuration file in your default editor
    ///
    /// The config file is stored at:
    /// - Windows: %APPDATA%\scanner_cli_tool\config.toml
    /// - Linux/macOS: ~/.config/scanner_cli_tool/config.toml
    ///
    /// If no config file exists, a default one will be created.
    Config {
        /// Show the config file path without opening it
        #[arg(long)]
        path: bool,

        /// Reset config to defaults (creates a fresh config file)
        #[arg(long)]
        reset: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,

    /// Run against simulated scanners (no scanner hardware required)
    Test {
        #[command(subcommand)]
        test_command: TestCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum TestCommands {
    /// List all available scanner scenarios
    ListScenarios {
        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Show detailed information about each scenario
        #[arg(short, long)]
        detailed: bool,
    },

    /// List all available tags for filtering
    ListTags,

    /// Run scenarios and check each outcome against its expectation
    Run {
        /// Scenario names to run (comma-separated or multiple values); all if empty
        #[arg(value_delimiter = ',')]
        scenarios: Vec<String>,

        /// Only run scenarios with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Also run scenarios tagged `slow`
        #[arg(long)]
        include_slow: bool,

        /// Stop on first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Run a full scan against a simulated scanner
    ///
    /// Uses the scan settings from the config file and command line,
    /// writing pages to the given output directory.
    SimulateScan {
        /// Scenario to use for simulation
        #[arg(short, long, default_value = "feeder_batch")]
        scenario: String,

        /// Output directory for scanned pages
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_scan_flags() {
        let args = Args::try_parse_from([
            "scanner-cli",
            "-d",
            "epson",
            "-s",
            "Feeder",
            "-m",
            "gray",
            "-r",
            "300",
            "-l",
            "10",
            "-t",
            "20",
            "-x",
            "100",
            "-y",
            "150",
            "--duplex",
            "--showUI",
            "--cancel-trigger",
            "stop",
        ])
        .unwrap();

        assert_eq!(args.device.as_deref(), Some("epson"));
        assert_eq!(args.source, Some(SourceType::Feeder));
        assert_eq!(args.mode, Some(ColorMode::Grayscale));
        assert_eq!(args.resolution, Some(300));
        assert_eq!(args.left, Some(10.0));
        assert_eq!(args.height, Some(150.0));
        assert!(args.duplex);
        assert!(args.show_ui);
        assert_eq!(args.cancel_trigger.as_deref(), Some("stop"));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_mode_and_source_aliases() {
        for (value, expected) in [
            ("bw", ColorMode::Monochrome),
            ("blackandwhite", ColorMode::Monochrome),
            ("1bit", ColorMode::Monochrome),
            ("grayscale", ColorMode::Grayscale),
            ("RGB", ColorMode::Color),
        ] {
            let args = Args::try_parse_from(["scanner-cli", "-m", value]).unwrap();
            assert_eq!(args.mode, Some(expected), "{}", value);
        }

        let args = Args::try_parse_from(["scanner-cli", "-s", "reflected"]).unwrap();
        assert_eq!(args.source, Some(SourceType::Flatbed));
        assert!(Args::try_parse_from(["scanner-cli", "-m", "sepia"]).is_err());
    }

    #[test]
    fn test_json_requires_list() {
        assert!(Args::try_parse_from(["scanner-cli", "--json"]).is_err());
        let args = Args::try_parse_from(["scanner-cli", "-L", "--json"]).unwrap();
        assert!(args.list && args.json);
    }

    #[test]
    fn test_simulate_scan_subcommand() {
        let args = Args::try_parse_from([
            "scanner-cli",
            "test",
            "simulate-scan",
            "-s",
            "flatbed",
            "-o",
            "out",
        ])
        .unwrap();

        match args.command {
            Some(Commands::Test {
                test_command: TestCommands::SimulateScan { scenario, output },
            }) => {
                assert_eq!(scenario, "flatbed");
                assert_eq!(output, PathBuf::from("out"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

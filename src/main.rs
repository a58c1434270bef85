//! Scanner CLI Tool - CLI Entry Point
//!
//! Scans pages from a scanner into image files. A running scan can be
//! cancelled by creating the trigger file or pressing Ctrl+C.
//!
//! This binary is a thin wrapper around the library, handling argument parsing,
//! logging setup, cancellation signals and command dispatch.

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use scanner_cli_tool::cli::{self, Args, DualWriter};
use scanner_cli_tool::core::config::Config;
use scanner_cli_tool::core::context::SessionContext;
use scanner_cli_tool::core::session::{EXIT_CANCELLED, EXIT_FAILURE};
use std::fs::OpenOptions;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Config::default()
            }
        }
    } else {
        Config::load_default().unwrap_or_else(|e| {
            eprintln!("Warning: {}", e);
            Config::default()
        })
    };

    apply_overrides(&mut config, &args);
    init_logging(&config);

    info!("{} v{}", scanner_cli_tool::NAME, scanner_cli_tool::VERSION);

    let ctx = Arc::new(SessionContext::new());
    if config.cancellation.handle_ctrl_c {
        install_ctrl_c_handler(Arc::clone(&ctx));
    }

    match cli::run_command(&args, &config, ctx) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Apply CLI overrides to config
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(ref output) = args.output {
        config.output.directory = output.clone();
    }
    if let Some(ref device) = args.device {
        config.device.name_filter = Some(device.clone());
    }
    if let Some(ref scenario) = args.scenario {
        config.device.scenario = scenario.clone();
    }
    if let Some(source) = args.source {
        config.scan.source = Some(source);
    }
    if let Some(mode) = args.mode {
        config.scan.color_mode = Some(mode);
    }
    if let Some(resolution) = args.resolution {
        config.scan.resolution = resolution;
    }
    if let Some(left) = args.left {
        config.scan.area.left = left;
    }
    if let Some(top) = args.top {
        config.scan.area.top = top;
    }
    if let Some(width) = args.width {
        config.scan.area.width = width;
    }
    if let Some(height) = args.height {
        config.scan.area.height = height;
    }
    if args.duplex {
        config.scan.duplex = true;
    }
    if args.show_ui {
        config.scan.show_ui = true;
    }
    if let Some(ref trigger) = args.cancel_trigger {
        config.cancellation.trigger_name = trigger.clone();
    }
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
}

/// Ctrl+C raises the same cancellation flag as the trigger file
fn install_ctrl_c_handler(ctx: Arc<SessionContext>) {
    let result = ctrlc::set_handler(move || {
        if ctx.cancel() {
            eprintln!("\nCancelling scan... (Press Ctrl+C again to force quit)");
            ctx.request_loop_exit();
        } else {
            // Second Ctrl+C - force exit
            eprintln!("\nForce shutdown requested. Exiting immediately...");
            std::process::exit(i32::from(EXIT_CANCELLED));
        }
    });

    if let Err(e) = result {
        warn!("Failed to set Ctrl+C handler: {}", e);
    }
}

fn init_logging(config: &Config) {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    if config.logging.log_to_file {
        match open_log_file(config) {
            Ok(log_file) => {
                Builder::new()
                    .filter_level(log_level)
                    .format(|buf, record| {
                        writeln!(
                            buf,
                            "[{} {} {}] {}",
                            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                            record.level(),
                            record.target(),
                            record.args()
                        )
                    })
                    .target(env_logger::Target::Pipe(Box::new(DualWriter {
                        console: std::io::stderr(),
                        file: log_file,
                    })))
                    .init();

                info!("Logging to file: {}", config.logging.log_file.display());
                return;
            }
            Err(e) => eprintln!(
                "Warning: Failed to open log file {}: {}",
                config.logging.log_file.display(),
                e
            ),
        }
    }

    Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level)).init();
}

fn open_log_file(config: &Config) -> Result<std::fs::File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.log_file)?)
}

//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands. Handlers
//! return the process exit code so `main` can report scan outcomes.

use crate::cli::progress::{
    format_bytes, format_duration, print_error, print_header, print_info, print_success,
    print_warning,
};
use crate::cli::{Args, Commands, TestCommands};
use crate::core::config::{get_config_path, init_config, open_config_in_editor, Config};
use crate::core::context::SessionContext;
use crate::core::session::{self, ScanOutcome, EXIT_FAILURE, EXIT_SUCCESS};
use crate::device::traits::DeviceSubsystem;
use crate::testdb::{self, ScenarioLibrary, TestRunner, TestRunnerConfig, TestScenario};
use anyhow::{anyhow, Result};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, ctx: Arc<SessionContext>) -> Result<u8> {
    match &args.command {
        Some(Commands::Config { path, reset }) => {
            handle_config_command(*path, *reset)?;
            Ok(EXIT_SUCCESS)
        }
        Some(Commands::GenerateConfig { output }) => {
            generate_config_file(output.clone())?;
            Ok(EXIT_SUCCESS)
        }
        Some(Commands::ShowConfig) => {
            show_config(config);
            Ok(EXIT_SUCCESS)
        }
        Some(Commands::Test { test_command }) => handle_test_command(test_command, config, ctx),
        None if args.list => {
            let subsystem = open_subsystem(&config.device.scenario)?;
            Ok(list_devices(subsystem.as_ref(), args.json))
        }
        None => {
            let subsystem = open_subsystem(&config.device.scenario)?;
            Ok(scan(subsystem, config, ctx))
        }
    }
}

/// Device subsystem backing the scanner commands
///
/// Scanners are provided by the named simulated scenario.
pub fn open_subsystem(scenario: &str) -> Result<Arc<dyn DeviceSubsystem>> {
    let scenario = ScenarioLibrary::by_name(scenario).ok_or_else(|| {
        anyhow!(
            "Unknown scanner scenario '{}'. Use 'test list-scenarios' to see available scenarios.",
            scenario
        )
    })?;
    info!("Using simulated scanners from scenario '{}'", scenario.name);
    Ok(Arc::new(scenario.build()))
}

/// Handle the config subcommand
pub fn handle_config_command(show_path: bool, reset: bool) -> Result<()> {
    if reset {
        // Delete existing config and create a fresh one
        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                fs::remove_file(&config_path)?;
                info!("Removed existing config file");
            }
        }
        let path = init_config()?;
        info!("Created fresh config file at: {}", path.display());
        return Ok(());
    }

    if show_path {
        let path = Config::get_active_config_path();
        println!("{}", path.display());
        if path.exists() {
            info!("Config file exists at: {}", path.display());
        } else {
            info!("Config file would be created at: {}", path.display());
        }
        return Ok(());
    }

    info!("Opening configuration file in default editor...");
    match open_config_in_editor() {
        Ok(path) => {
            info!("Config file: {}", path.display());
            info!("Run 'scanner-cli show-config' to verify your settings.");
        }
        Err(e) => {
            error!("Failed to open config file: {}", e);
            if let Some(path) = get_config_path() {
                info!("You can manually edit the config at: {}", path.display());
            }
        }
    }

    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            fs::write(&path, Config::generate_default_config())?;
            path
        }
        None => init_config()?,
    };

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to customize the scan settings.");

    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[output]");
    info!("  directory = \"{}\"", config.output.directory.display());
    info!("  format = {:?}", config.output.format);
    info!("  jpeg_quality = {}", config.output.jpeg_quality);
    info!("  file_prefix = \"{}\"", config.output.file_prefix);
    info!("");
    info!("[device]");
    info!(
        "  name_filter = {:?}",
        config.device.name_filter.as_deref().unwrap_or("(first scanner)")
    );
    info!("  scenario = \"{}\"", config.device.scenario);
    info!("");
    info!("[scan]");
    info!("  resolution = {}", config.scan.resolution);
    info!("  color_mode = {:?}", config.scan.color_mode);
    info!("  source = {:?}", config.scan.source);
    info!("  duplex = {}", config.scan.duplex);
    info!("  duplex_policy = {:?}", config.scan.duplex_policy);
    info!("  show_ui = {}", config.scan.show_ui);
    let area = &config.scan.area;
    info!(
        "  area = {{ left = {}, top = {}, width = {}, height = {} }}",
        area.left, area.top, area.width, area.height
    );
    info!("");
    info!("[cancellation]");
    info!("  trigger_name = \"{}\"", config.cancellation.trigger_name);
    info!(
        "  watch_dir = \"{}\"",
        config.cancellation.effective_watch_dir().display()
    );
    info!(
        "  remove_trigger_on_stop = {}",
        config.cancellation.remove_trigger_on_stop
    );
    info!("  handle_ctrl_c = {}", config.cancellation.handle_ctrl_c);
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
}

/// List the scanners of a subsystem, returning the exit code
pub fn list_devices(subsystem: &dyn DeviceSubsystem, json: bool) -> u8 {
    let devices = match session::list_devices(subsystem) {
        Ok(devices) => devices,
        Err(e) => {
            error!("Error listing scanners: {}", e);
            return EXIT_FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&devices) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to serialize scanner list: {}", e);
                return EXIT_FAILURE;
            }
        }
        return EXIT_SUCCESS;
    }

    if devices.is_empty() {
        println!("No scanners found");
        return EXIT_SUCCESS;
    }

    println!("Available scanners:");
    for device in &devices {
        println!("  {}", device);
    }
    EXIT_SUCCESS
}

/// Run one scan with the configured settings, returning the exit code
pub fn scan(subsystem: Arc<dyn DeviceSubsystem>, config: &Config, ctx: Arc<SessionContext>) -> u8 {
    let scan_config = config.scan_configuration();
    info!(
        "Cancel a running scan by creating {}",
        scan_config.watch_dir.join(&scan_config.trigger_name).display()
    );

    let outcome = session::run_scan(subsystem, &scan_config, ctx);
    print_outcome(&outcome);
    outcome.exit_code()
}

fn print_outcome(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Completed(_) => print_success(&outcome.to_string()),
        ScanOutcome::Cancelled(_) => print_warning(&outcome.to_string()),
        _ => print_error(&outcome.to_string()),
    }

    if let Some(summary) = outcome.summary() {
        print_info(&format!("Scanner: {}", summary.device));
        print_info(&summary.stats.to_string());
        for file in &summary.files {
            let size = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
            print_info(&format!("{} ({})", file.display(), format_bytes(size)));
        }
    }
}

/// Handle the test subcommand
pub fn handle_test_command(
    test_command: &TestCommands,
    config: &Config,
    ctx: Arc<SessionContext>,
) -> Result<u8> {
    match test_command {
        TestCommands::ListScenarios { tag, detailed } => {
            test_list_scenarios(tag.as_deref(), *detailed);
            Ok(EXIT_SUCCESS)
        }
        TestCommands::ListTags => {
            test_list_tags();
            Ok(EXIT_SUCCESS)
        }
        TestCommands::Run {
            scenarios,
            tag,
            include_slow,
            fail_fast,
        } => test_run(scenarios, tag.clone(), *include_slow, *fail_fast),
        TestCommands::SimulateScan { scenario, output } => {
            test_simulate_scan(scenario, output, config, ctx)
        }
    }
}

/// List scenarios, optionally filtered by tag
fn test_list_scenarios(tag_filter: Option<&str>, detailed: bool) {
    let scenarios = match tag_filter {
        Some(tag) => ScenarioLibrary::scenarios_by_tag(tag),
        None => ScenarioLibrary::all_scenarios(),
    };

    if scenarios.is_empty() {
        match tag_filter {
            Some(tag) => println!("No scenarios found with tag '{}'", tag),
            None => println!("No scenarios available"),
        }
        return;
    }

    if tag_filter.is_none() && !detailed {
        testdb::print_available_scenarios();
        return;
    }

    print_header("AVAILABLE SCANNER SCENARIOS");
    for scenario in &scenarios {
        if detailed {
            print_scenario_details(scenario);
        } else {
            println!("  • {} - {}", scenario.name, scenario.description);
        }
    }
    println!();
    println!("Total: {} scenarios", scenarios.len());
}

fn print_scenario_details(scenario: &TestScenario) {
    println!("{}", scenario.name);
    println!("   Description: {}", scenario.description);
    println!("   Tags: {}", scenario.tags.join(", "));
    for scanner in &scenario.scanners {
        println!(
            "   Scanner: {} ({} page(s))",
            scanner.descriptor.name,
            scanner.pages.len()
        );
    }
    println!("   Expected pages: {}", scenario.expected.pages);
    println!("   Expected exit code: {}", scenario.expected.exit_code);
    println!();
}

fn test_list_tags() {
    println!("Available tags:");
    for tag in testdb::list_tags() {
        println!("  • {}", tag);
    }
}

/// Run scenarios through the test runner
fn test_run(
    names: &[String],
    tag_filter: Option<String>,
    include_slow: bool,
    fail_fast: bool,
) -> Result<u8> {
    let mut runner = TestRunner::with_config(TestRunnerConfig {
        fail_fast,
        tag_filter,
        skip_slow: !include_slow,
        ..Default::default()
    });

    print_header("SCANNER SCENARIO RUN");

    let summary = if names.is_empty() {
        runner.run_all()
    } else {
        let mut scenarios = Vec::with_capacity(names.len());
        for name in names {
            let scenario = ScenarioLibrary::by_name(name)
                .ok_or_else(|| anyhow!("Scenario '{}' not found", name))?;
            scenarios.push(scenario);
        }
        runner.run_selected(&scenarios)
    };

    for result in &summary.results {
        let line = format!(
            "{} - {} ({})",
            result.name,
            result.message,
            format_duration(result.duration)
        );
        match result.failure_reason {
            None => print_success(&line),
            Some(ref reason) => print_error(&format!("{}: {}", line, reason)),
        }
    }

    println!();
    println!(
        "Passed: {}/{} ({:.0}%) in {}",
        summary.passed,
        summary.total,
        summary.pass_rate(),
        format_duration(summary.total_duration)
    );

    Ok(if summary.failed > 0 {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}

/// Full scan against a simulated scanner, writing pages into `output`
fn test_simulate_scan(
    scenario_name: &str,
    output: &Path,
    config: &Config,
    ctx: Arc<SessionContext>,
) -> Result<u8> {
    let Some(scenario) = ScenarioLibrary::by_name(scenario_name) else {
        println!("Scenario '{}' not found.", scenario_name);
        println!("Use 'test list-scenarios' to see available scenarios.");
        return Ok(EXIT_FAILURE);
    };

    println!("\nSimulating scan with: {}", scenario.name);
    for scanner in &scenario.scanners {
        println!("   Scanner: {}", scanner.descriptor.name);
    }
    println!("   Output: {}", output.display());
    println!();

    let mut config = config.clone();
    config.output.directory = output.to_path_buf();
    config.device.scenario = scenario.name.clone();

    Ok(scan(Arc::new(scenario.build()), &config, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::EXIT_CANCELLED;
    use crate::testdb::{MockScanner, MockSubsystem};
    use tempfile::TempDir;

    fn temp_config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.output.directory = temp.path().join("scans");
        config.cancellation.watch_dir = Some(temp.path().join("control"));
        config
    }

    #[test]
    fn test_open_subsystem_unknown_scenario() {
        let err = open_subsystem("no-such-scenario").err().unwrap();
        assert!(err.to_string().contains("no-such-scenario"));
        assert!(open_subsystem("Feeder_Batch").is_ok());
    }

    #[test]
    fn test_list_devices_exit_codes() {
        let subsystem = ScenarioLibrary::multi_device().build();
        assert_eq!(list_devices(&subsystem, false), EXIT_SUCCESS);
        assert_eq!(list_devices(&subsystem, true), EXIT_SUCCESS);
        assert_eq!(subsystem.calls().close_session, 2);

        let empty = MockSubsystem::new(Vec::new());
        assert_eq!(list_devices(&empty, false), EXIT_SUCCESS);

        let broken = ScenarioLibrary::session_failure().build();
        assert_eq!(list_devices(&broken, false), EXIT_FAILURE);
    }

    #[test]
    fn test_scan_writes_pages() {
        let temp = TempDir::new().unwrap();
        let config = temp_config(&temp);
        let subsystem = Arc::new(MockSubsystem::new(vec![MockScanner::bare(
            "Test Scanner",
        )
        .with_pages(2)]));

        let code = scan(subsystem, &config, Arc::new(SessionContext::new()));

        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(fs::read_dir(temp.path().join("scans")).unwrap().count(), 2);
    }

    #[test]
    fn test_scan_already_cancelled() {
        let temp = TempDir::new().unwrap();
        let config = temp_config(&temp);
        let ctx = Arc::new(SessionContext::new());
        ctx.cancel();

        let code = scan(open_subsystem("feeder_batch").unwrap(), &config, ctx);

        assert_eq!(code, EXIT_CANCELLED);
        assert_eq!(fs::read_dir(temp.path().join("scans")).unwrap().count(), 0);
    }

    #[test]
    fn test_simulate_scan_overrides_output() {
        let temp = TempDir::new().unwrap();
        let config = temp_config(&temp);
        let output = temp.path().join("simulated");

        let code = test_simulate_scan(
            "feeder_batch",
            &output,
            &config,
            Arc::new(SessionContext::new()),
        )
        .unwrap();

        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(fs::read_dir(&output).unwrap().count(), 3);
        assert!(!temp.path().join("scans").exists());
    }

    #[test]
    fn test_simulate_scan_unknown_scenario() {
        let temp = TempDir::new().unwrap();
        let config = temp_config(&temp);

        let code = test_simulate_scan(
            "missing",
            temp.path(),
            &config,
            Arc::new(SessionContext::new()),
        )
        .unwrap();

        assert_eq!(code, EXIT_FAILURE);
    }

    #[test]
    fn test_generate_config_file_at_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scanner.toml");

        generate_config_file(Some(path.clone())).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cancellation.trigger_name, "cancel");
    }
}

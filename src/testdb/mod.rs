//! Test Database Module
//!
//! Simulated scanners for running the whole tool without scanner hardware.
//!
//! # Features
//!
//! - **Mock Subsystem**: an in-memory device subsystem with capability tables,
//!   page lists and failure behaviours, recording every driver call
//! - **Page Generator**: decodable (and deliberately corrupt) page buffers
//! - **Test Scenarios**: named setups covering normal runs, degraded devices
//!   and setup failures
//! - **Test Runner**: runs full scans against scenarios and checks the outcome
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scanner_cli_tool::testdb::{TestRunner, ScenarioLibrary};
//!
//! let mut runner = TestRunner::new();
//! let result = runner.run_scenario(&ScenarioLibrary::feeder_batch());
//! println!("{}: {}", result.name, result.message);
//! ```
//!
//! # Available Scenarios
//!
//! - `flatbed`, `feeder_batch`, `film_scanner`, `multi_device` - normal runs
//! - `file_transfer` - pages delivered as files written by the driver
//! - `slow_batch` - one page per second, for trying the cancel trigger
//! - `minimal` - no negotiable capabilities
//! - `corrupt_page`, `device_error`, `dialog_cancel` - degraded runs
//! - `no_devices`, `session_failure`, `busy_scanner`, `enable_failure` - setup failures

pub mod generator;
pub mod mock_scanner;
pub mod runner;
pub mod scenarios;

#[cfg(test)]
mod integration;

// Re-export commonly used types for convenience
pub use generator::{render_page, MockPageGenerator};
pub use mock_scanner::{CallLog, MockBehavior, MockPage, MockScanner, MockSubsystem};
pub use runner::{ScenarioResult, TestRunner, TestRunnerConfig, TestSummary};
pub use scenarios::{ExpectedResults, ScenarioLibrary, TestScenario};

/// Names of all scenarios
pub fn list_scenario_names() -> Vec<String> {
    ScenarioLibrary::names()
}

/// All tags used by the scenarios, sorted
pub fn list_tags() -> Vec<String> {
    let mut tags: Vec<String> = ScenarioLibrary::all_scenarios()
        .into_iter()
        .flat_map(|s| s.tags)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Print available scenarios to console, grouped by their first tag
pub fn print_available_scenarios() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║           AVAILABLE SCANNER SCENARIOS                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let scenarios = ScenarioLibrary::all_scenarios();

    let mut by_category: std::collections::BTreeMap<String, Vec<&TestScenario>> =
        std::collections::BTreeMap::new();
    for scenario in &scenarios {
        let category = scenario
            .tags
            .first()
            .cloned()
            .unwrap_or_else(|| "other".to_string());
        by_category.entry(category).or_default().push(scenario);
    }

    for (category, scenarios) in &by_category {
        println!("{}", category.to_uppercase());
        for scenario in scenarios {
            let names: Vec<&str> = scenario
                .scanners
                .iter()
                .map(|s| s.descriptor.name.as_str())
                .collect();
            println!("   • {} - {}", scenario.name, scenario.description);
            if !names.is_empty() {
                println!("       scanners: {}", names.join(", "));
            }
        }
        println!();
    }

    println!("Total: {} scenarios available\n", scenarios.len());
}

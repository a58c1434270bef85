//! Scenario runner
//!
//! Runs full scans against the predefined scenarios and compares what each
//! run produced with the scenario's expected results.

use super::scenarios::{ExpectedResults, ScenarioLibrary, TestScenario};
use crate::core::config::ScanConfiguration;
use crate::core::context::SessionContext;
use crate::core::session::{run_scan, ScanOutcome};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of running a single scenario
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Whether the run matched the expectation
    pub passed: bool,
    /// Execution time
    pub duration: Duration,
    /// Pages written or recorded
    pub pages: usize,
    /// Exit code of the run
    pub exit_code: u8,
    /// One-line description of the outcome
    pub message: String,
    /// Expected results for comparison
    pub expected: ExpectedResults,
    /// Failure reason (if any)
    pub failure_reason: Option<String>,
}

/// Summary of a runner pass
#[derive(Debug, Clone, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub total_duration: Duration,
    pub results: Vec<ScenarioResult>,
}

impl TestSummary {
    /// Pass rate as a percentage
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    /// Names of the scenarios that failed
    pub fn failed_scenarios(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct TestRunnerConfig {
    /// Stop after the first failing scenario
    pub fail_fast: bool,
    /// Only run scenarios with this tag
    pub tag_filter: Option<String>,
    /// Skip scenarios tagged `slow`
    pub skip_slow: bool,
    /// Each scenario writes into `<output_root>/<name>`
    pub output_root: PathBuf,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            tag_filter: None,
            skip_slow: true,
            output_root: std::env::temp_dir()
                .join("scanner_cli_tool")
                .join("scenario_runs"),
        }
    }
}

/// Runs scenarios and collects results
pub struct TestRunner {
    config: TestRunnerConfig,
    results: Vec<ScenarioResult>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::with_config(TestRunnerConfig::default())
    }

    pub fn with_config(config: TestRunnerConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
        }
    }

    /// Scan configuration used for a scenario's default run
    pub fn scan_configuration(output_root: &Path, scenario: &TestScenario) -> ScanConfiguration {
        let dir = output_root.join(&scenario.name);
        ScanConfiguration {
            output_dir: dir.join("scans"),
            watch_dir: dir.join("control"),
            ..ScanConfiguration::default()
        }
    }

    /// Run one scenario
    pub fn run_scenario(&mut self, scenario: &TestScenario) -> ScenarioResult {
        info!("Running scenario: {}", scenario.name);
        let start = Instant::now();

        let mut scenario = scenario.clone();
        let run_dir = self.config.output_root.join(&scenario.name);
        for scanner in &mut scenario.scanners {
            if scanner.behavior.file_dir.is_some() {
                scanner.behavior.file_dir = Some(run_dir.join("driver"));
            }
        }

        let config = Self::scan_configuration(&self.config.output_root, &scenario);
        let subsystem = Arc::new(scenario.build());
        let outcome = run_scan(subsystem, &config, Arc::new(SessionContext::new()));

        let result = Self::evaluate(&scenario, &outcome, start.elapsed());
        debug!("Scenario {} finished: {}", scenario.name, result.message);
        self.results.push(result.clone());
        result
    }

    fn evaluate(scenario: &TestScenario, outcome: &ScanOutcome, duration: Duration) -> ScenarioResult {
        let pages = outcome.summary().map(|s| s.pages()).unwrap_or(0);
        let exit_code = outcome.exit_code();
        let expected = scenario.expected.clone();

        let failure_reason = if exit_code != expected.exit_code {
            Some(format!(
                "exit code {} (expected {})",
                exit_code, expected.exit_code
            ))
        } else if pages != expected.pages {
            Some(format!("{} page(s) (expected {})", pages, expected.pages))
        } else {
            None
        };

        ScenarioResult {
            name: scenario.name.clone(),
            passed: failure_reason.is_none(),
            duration,
            pages,
            exit_code,
            message: outcome.to_string(),
            expected,
            failure_reason,
        }
    }

    /// Run every scenario that passes the filters
    pub fn run_all(&mut self) -> TestSummary {
        let start = Instant::now();
        let scenarios: Vec<TestScenario> = ScenarioLibrary::all_scenarios()
            .into_iter()
            .filter(|s| self.selected(s))
            .collect();

        for scenario in &scenarios {
            let result = self.run_scenario(scenario);
            if !result.passed && self.config.fail_fast {
                break;
            }
        }

        self.summary(start.elapsed())
    }

    /// Run the given scenarios in order, ignoring the tag and slow filters
    pub fn run_selected(&mut self, scenarios: &[TestScenario]) -> TestSummary {
        let start = Instant::now();
        for scenario in scenarios {
            let result = self.run_scenario(scenario);
            if !result.passed && self.config.fail_fast {
                break;
            }
        }
        self.summary(start.elapsed())
    }

    fn selected(&self, scenario: &TestScenario) -> bool {
        if self.config.skip_slow && scenario.tags.iter().any(|t| t == "slow") {
            return false;
        }
        match self.config.tag_filter {
            Some(ref tag) => scenario.tags.iter().any(|t| t == tag),
            None => true,
        }
    }

    fn summary(&self, total_duration: Duration) -> TestSummary {
        let passed = self.results.iter().filter(|r| r.passed).count();
        TestSummary {
            total: self.results.len(),
            passed,
            failed: self.results.len() - passed,
            total_duration,
            results: self.results.clone(),
        }
    }

    /// Results collected so far
    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

//! Predefined scanner scenarios
//!
//! Ready-to-use simulated setups covering the normal paths (flatbed, feeder
//! batch, film), degraded devices (no capabilities, corrupt pages, device
//! errors) and setup failures. The CLI runs against these, and so do the
//! integration tests.

use super::mock_scanner::{MockPage, MockScanner, MockSubsystem};
use crate::device::traits::{
    CapValue, Capability, CapabilityInfo, FilmType, Frame, LightPath, PixelType, ReturnCode, Unit,
};
use std::time::Duration;

/// A complete simulated setup
#[derive(Debug, Clone)]
pub struct TestScenario {
    /// Scenario name for identification
    pub name: String,
    /// Description of what this scenario exercises
    pub description: String,
    /// Scanners the subsystem reports, in enumeration order
    pub scanners: Vec<MockScanner>,
    /// `open_session` fails with this code
    pub fail_session_open: Option<ReturnCode>,
    /// What a default run against this scenario produces
    pub expected: ExpectedResults,
    /// Tags for filtering scenarios
    pub tags: Vec<String>,
}

/// Expected results of a default run (first scanner, no selector)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedResults {
    /// Pages written or recorded
    pub pages: usize,
    /// Process exit code
    pub exit_code: u8,
}

impl TestScenario {
    pub fn new(
        name: &str,
        description: &str,
        scanners: Vec<MockScanner>,
        expected: ExpectedResults,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            scanners,
            fail_session_open: None,
            expected,
            tags: Vec::new(),
        }
    }

    /// Add tags to the scenario
    pub fn with_tags(mut self, tags: Vec<&str>) -> Self {
        self.tags = tags.into_iter().map(String::from).collect();
        self
    }

    pub fn with_session_failure(mut self, code: ReturnCode) -> Self {
        self.fail_session_open = Some(code);
        self
    }

    /// Build the simulated subsystem
    pub fn build(&self) -> MockSubsystem {
        let subsystem = MockSubsystem::new(self.scanners.clone());
        match self.fail_session_open {
            Some(code) => subsystem.failing_session_open(code),
            None => subsystem,
        }
    }
}

fn expect(pages: usize, exit_code: u8) -> ExpectedResults {
    ExpectedResults { pages, exit_code }
}

/// Collection of all predefined scenarios
pub struct ScenarioLibrary;

impl ScenarioLibrary {
    // =========================================================================
    // CAPABILITY TABLES
    // =========================================================================

    fn with_resolution(scanner: MockScanner, allowed: &[u32]) -> MockScanner {
        let allowed: Vec<CapValue> = allowed.iter().map(|dpi| CapValue::UInt(*dpi)).collect();
        scanner
            .with_capability(
                Capability::XResolution,
                CapabilityInfo::settable(CapValue::UInt(100)).with_allowed(allowed.clone()),
            )
            .with_capability(
                Capability::YResolution,
                CapabilityInfo::settable(CapValue::UInt(100)).with_allowed(allowed),
            )
    }

    fn with_pixel_types(scanner: MockScanner) -> MockScanner {
        scanner.with_capability(
            Capability::PixelType,
            CapabilityInfo::settable(CapValue::PixelType(PixelType::Rgb)).with_allowed(vec![
                CapValue::PixelType(PixelType::BlackWhite),
                CapValue::PixelType(PixelType::Gray),
                CapValue::PixelType(PixelType::Rgb),
            ]),
        )
    }

    /// Units plus a frame of `width` x `height` inches
    fn with_frame(scanner: MockScanner, width: f32, height: f32) -> MockScanner {
        scanner
            .with_capability(
                Capability::Units,
                CapabilityInfo::settable(CapValue::Unit(Unit::Inches)).with_allowed(vec![
                    CapValue::Unit(Unit::Inches),
                    CapValue::Unit(Unit::Centimeters),
                    CapValue::Unit(Unit::Millimeters),
                ]),
            )
            .with_capability(
                Capability::Frame,
                CapabilityInfo::settable(CapValue::Frame(Frame {
                    left: 0.0,
                    top: 0.0,
                    right: width,
                    bottom: height,
                })),
            )
    }

    fn flatbed_scanner(name: &str, manufacturer: &str) -> MockScanner {
        let scanner = MockScanner::bare(name)
            .with_manufacturer(manufacturer)
            .with_capability(
                Capability::LightPath,
                CapabilityInfo::settable(CapValue::LightPath(LightPath::Reflective))
                    .with_allowed(vec![CapValue::LightPath(LightPath::Reflective)]),
            )
            .with_capability(
                Capability::LampState,
                CapabilityInfo::settable(CapValue::Bool(false)),
            );
        let scanner = Self::with_resolution(scanner, &[75, 100, 150, 200, 300, 600, 1200]);
        let scanner = Self::with_pixel_types(scanner);
        Self::with_frame(scanner, 8.5, 11.69)
    }

    fn feeder_scanner(name: &str, manufacturer: &str) -> MockScanner {
        let scanner = MockScanner::bare(name)
            .with_manufacturer(manufacturer)
            .with_capability(
                Capability::FeederEnabled,
                CapabilityInfo::settable(CapValue::Bool(false)),
            )
            .with_capability(
                Capability::DuplexEnabled,
                CapabilityInfo::settable(CapValue::Bool(false)),
            );
        let scanner = Self::with_resolution(scanner, &[100, 150, 200, 300, 600]);
        let scanner = Self::with_pixel_types(scanner);
        Self::with_frame(scanner, 8.5, 14.0)
    }

    fn film_scanner_device(name: &str, manufacturer: &str) -> MockScanner {
        let scanner = MockScanner::bare(name)
            .with_manufacturer(manufacturer)
            .with_capability(
                Capability::LightPath,
                CapabilityInfo::settable(CapValue::LightPath(LightPath::Reflective)).with_allowed(
                    vec![
                        CapValue::LightPath(LightPath::Reflective),
                        CapValue::LightPath(LightPath::Transmissive),
                    ],
                ),
            )
            .with_capability(
                Capability::FilmType,
                CapabilityInfo::settable(CapValue::FilmType(FilmType::Positive)),
            )
            .with_capability(
                Capability::LampState,
                CapabilityInfo::settable(CapValue::Bool(false)),
            );
        let scanner = Self::with_resolution(scanner, &[300, 600, 1200, 2400, 3600, 7200]);
        Self::with_pixel_types(scanner)
    }

    // =========================================================================
    // NORMAL OPERATION
    // =========================================================================

    /// Scenario: single flatbed scanner, one page
    pub fn flatbed() -> TestScenario {
        TestScenario::new(
            "flatbed",
            "Flatbed scanner with the usual capabilities, one page on the glass",
            vec![Self::flatbed_scanner("CanoScan LiDE 400", "Canon").with_pages(1)],
            expect(1, 0),
        )
        .with_tags(vec!["basic", "flatbed"])
    }

    /// Scenario: document feeder with a three-page batch
    pub fn feeder_batch() -> TestScenario {
        TestScenario::new(
            "feeder_batch",
            "Document feeder with duplex support, three pages in the tray",
            vec![Self::feeder_scanner("EPSON WF-7710", "EPSON").with_pages(3)],
            expect(3, 0),
        )
        .with_tags(vec!["basic", "feeder", "batch"])
    }

    /// Scenario: film scanner with positive/negative support
    pub fn film_scanner() -> TestScenario {
        TestScenario::new(
            "film_scanner",
            "Film scanner with a transmissive light path and film types",
            vec![Self::film_scanner_device("OpticFilm 8200i", "Plustek").with_pages(2)],
            expect(2, 0),
        )
        .with_tags(vec!["basic", "film"])
    }

    /// Scenario: several scanners attached
    pub fn multi_device() -> TestScenario {
        TestScenario::new(
            "multi_device",
            "Three scanners attached; select one by name",
            vec![
                Self::flatbed_scanner("CanoScan LiDE 400", "Canon").with_pages(1),
                Self::feeder_scanner("EPSON WF-7710", "EPSON").with_pages(3),
                Self::film_scanner_device("OpticFilm 8200i", "Plustek").with_pages(2),
            ],
            expect(1, 0),
        )
        .with_tags(vec!["device", "selection"])
    }

    /// Scenario: driver writes pages to disk itself
    pub fn file_transfer() -> TestScenario {
        let driver_dir = std::env::temp_dir()
            .join("scanner_cli_tool")
            .join("driver_output");
        TestScenario::new(
            "file_transfer",
            "Driver uses file transfers; pages arrive as paths",
            vec![Self::flatbed_scanner("HP ScanJet Pro 2500", "HP")
                .with_pages(2)
                .with_file_transfer(driver_dir)],
            expect(2, 0),
        )
        .with_tags(vec!["transfer", "file"])
    }

    /// Scenario: slow batch, long enough to cancel by hand
    pub fn slow_batch() -> TestScenario {
        TestScenario::new(
            "slow_batch",
            "Ten-page feeder batch, one page per second (try the cancel trigger)",
            vec![Self::feeder_scanner("EPSON WF-7710", "EPSON")
                .with_pages(10)
                .with_page_delay(Duration::from_secs(1))],
            expect(10, 0),
        )
        .with_tags(vec!["feeder", "slow", "cancel"])
    }

    // =========================================================================
    // DEGRADED DEVICES
    // =========================================================================

    /// Scenario: scanner that reports no capabilities at all
    pub fn minimal() -> TestScenario {
        TestScenario::new(
            "minimal",
            "Generic device without negotiable capabilities",
            vec![MockScanner::bare("Generic TWAIN Device").with_pages(1)],
            expect(1, 0),
        )
        .with_tags(vec!["capabilities", "edge-case"])
    }

    /// Scenario: one page of a batch fails to decode
    pub fn corrupt_page() -> TestScenario {
        TestScenario::new(
            "corrupt_page",
            "Second of three pages is garbage; the batch continues",
            vec![Self::feeder_scanner("EPSON WF-7710", "EPSON")
                .with_pages(1)
                .with_page(MockPage::Corrupt)
                .with_pages(1)],
            expect(2, 0),
        )
        .with_tags(vec!["transfer", "error"])
    }

    /// Scenario: acquisition ends with a device condition
    pub fn device_error() -> TestScenario {
        TestScenario::new(
            "device_error",
            "Paper jam after two pages",
            vec![Self::feeder_scanner("EPSON WF-7710", "EPSON")
                .with_pages(2)
                .ending_with_error(12)],
            expect(2, 1),
        )
        .with_tags(vec!["error", "feeder"])
    }

    /// Scenario: user cancels in the scanner's own dialog
    pub fn dialog_cancel() -> TestScenario {
        TestScenario::new(
            "dialog_cancel",
            "Scanner dialog is closed with cancel (run with --show-ui)",
            vec![Self::flatbed_scanner("CanoScan LiDE 400", "Canon")
                .with_pages(1)
                .cancelling_in_dialog()],
            expect(1, 0),
        )
        .with_tags(vec!["ui", "cancel"])
    }

    // =========================================================================
    // SETUP FAILURES
    // =========================================================================

    /// Scenario: no scanners attached
    pub fn no_devices() -> TestScenario {
        TestScenario::new(
            "no_devices",
            "Session opens but no scanner is attached",
            Vec::new(),
            expect(0, 1),
        )
        .with_tags(vec!["device", "error", "no-device"])
    }

    /// Scenario: device session cannot be opened
    pub fn session_failure() -> TestScenario {
        TestScenario::new(
            "session_failure",
            "Data source manager refuses to open",
            vec![Self::flatbed_scanner("CanoScan LiDE 400", "Canon").with_pages(1)],
            expect(0, 1),
        )
        .with_session_failure(ReturnCode::Failure)
        .with_tags(vec!["error", "setup"])
    }

    /// Scenario: scanner busy, refuses to open
    pub fn busy_scanner() -> TestScenario {
        TestScenario::new(
            "busy_scanner",
            "Scanner is in use by another application",
            vec![Self::flatbed_scanner("CanoScan LiDE 400", "Canon")
                .with_pages(1)
                .failing_open(ReturnCode::Busy)],
            expect(0, 1),
        )
        .with_tags(vec!["error", "setup"])
    }

    /// Scenario: scanner opens but refuses to enable
    pub fn enable_failure() -> TestScenario {
        TestScenario::new(
            "enable_failure",
            "Scanner rejects the enable request",
            vec![Self::flatbed_scanner("CanoScan LiDE 400", "Canon")
                .with_pages(1)
                .failing_enable(ReturnCode::Failure)],
            expect(0, 1),
        )
        .with_tags(vec!["error", "setup"])
    }

    // =========================================================================
    // SCENARIO COLLECTIONS
    // =========================================================================

    /// All scenarios
    pub fn all_scenarios() -> Vec<TestScenario> {
        vec![
            Self::flatbed(),
            Self::feeder_batch(),
            Self::film_scanner(),
            Self::multi_device(),
            Self::file_transfer(),
            Self::slow_batch(),
            Self::minimal(),
            Self::corrupt_page(),
            Self::device_error(),
            Self::dialog_cancel(),
            Self::no_devices(),
            Self::session_failure(),
            Self::busy_scanner(),
            Self::enable_failure(),
        ]
    }

    /// Scenario by name
    pub fn by_name(name: &str) -> Option<TestScenario> {
        Self::all_scenarios()
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Scenarios carrying `tag`
    pub fn scenarios_by_tag(tag: &str) -> Vec<TestScenario> {
        Self::all_scenarios()
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Names of all scenarios
    pub fn names() -> Vec<String> {
        Self::all_scenarios().into_iter().map(|s| s.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scenario_names_unique() {
        let names = ScenarioLibrary::names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn test_by_name() {
        let scenario = ScenarioLibrary::by_name("Feeder_Batch").unwrap();
        assert_eq!(scenario.name, "feeder_batch");
        assert_eq!(scenario.scanners[0].pages.len(), 3);
        assert!(ScenarioLibrary::by_name("nonexistent").is_none());
    }

    #[test]
    fn test_scenarios_by_tag() {
        let errors = ScenarioLibrary::scenarios_by_tag("setup");
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|s| s.expected.exit_code == 1));
    }

    #[test]
    fn test_multi_device_contains_epson() {
        let scenario = ScenarioLibrary::multi_device();
        assert!(scenario
            .scanners
            .iter()
            .any(|s| s.descriptor.name == "EPSON WF-7710"));
    }

    #[test]
    fn test_session_failure_is_built_in() {
        use crate::device::traits::DeviceSubsystem;

        let subsystem = ScenarioLibrary::session_failure().build();
        assert!(subsystem.open_session().is_err());
    }
}

//! End-to-end runs against simulated scanners
//!
//! Each test drives `run_scan` through a `MockSubsystem` and checks what
//! reached the output directory together with the exact driver calls made.

use super::generator::MockPageGenerator;
use super::mock_scanner::MockSubsystem;
use super::scenarios::ScenarioLibrary;
use crate::core::config::ScanConfiguration;
use crate::core::context::SessionContext;
use crate::core::error::ScanError;
use crate::core::session::{run_scan, ScanOutcome};
use crate::device::traits::{EnableMode, HostReply, ReturnCode};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

fn config_in(temp: &TempDir) -> ScanConfiguration {
    ScanConfiguration {
        output_dir: temp.path().join("scans"),
        watch_dir: temp.path().join("control"),
        ..ScanConfiguration::default()
    }
}

fn run(subsystem: &Arc<MockSubsystem>, config: &ScanConfiguration) -> ScanOutcome {
    run_scan(subsystem.clone(), config, Arc::new(SessionContext::new()))
}

fn files_in(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}

// =============================================================================
// COMPLETED RUNS
// =============================================================================

#[test]
fn test_three_page_batch() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::feeder_batch().build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(files_in(&config.output_dir), 3);
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.pages(), 3);
    assert_eq!(summary.device, "EPSON WF-7710");

    let calls = subsystem.calls();
    assert_eq!(calls.close_device, 1);
    assert_eq!(calls.close_session, 1);
    assert_eq!(calls.enable_modes, vec![EnableMode::NoUi]);
    assert_eq!(calls.pages_delivered, 3);
}

#[test]
fn test_saved_names_follow_pattern() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::feeder_batch().build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    let files = &outcome.summary().unwrap().files;
    for (sequence, path) in files.iter().enumerate() {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        // scan_YYYYmmdd_HHMMSS_<seq>.jpg
        assert!(name.starts_with("scan_"), "{}", name);
        assert!(name.ends_with(&format!("_{}.jpg", sequence)), "{}", name);
        assert_eq!(name.len(), "scan_20240101_120000_.jpg".len() + sequence.to_string().len());
    }
}

#[test]
fn test_negotiated_resolution_reaches_pages() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::flatbed().build());
    let config = ScanConfiguration {
        resolution: 300,
        ..config_in(&temp)
    };

    let outcome = run(&subsystem, &config);

    let path = &outcome.summary().unwrap().files[0];
    let image = image::open(path).unwrap();
    assert_eq!(
        (image.width(), image.height()),
        MockPageGenerator::page_size(300)
    );
}

#[test]
fn test_selector_picks_matching_scanner() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::multi_device().build());
    let config = ScanConfiguration {
        device_selector: Some("epson".to_string()),
        ..config_in(&temp)
    };

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    assert_eq!(outcome.summary().unwrap().device, "EPSON WF-7710");
    assert_eq!(files_in(&config.output_dir), 3);
    assert_eq!(subsystem.calls().open_device, 1);
}

#[test]
fn test_capabilityless_scanner_still_scans() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::minimal().build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    assert_eq!(subsystem.calls().set_capability, 0);
    assert_eq!(files_in(&config.output_dir), 1);
}

#[test]
fn test_corrupt_page_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::corrupt_page().build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.stats.saved, 2);
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(files_in(&config.output_dir), 2);
}

#[test]
fn test_file_transfer_records_driver_files() {
    let temp = TempDir::new().unwrap();
    let mut scenario = ScenarioLibrary::file_transfer();
    scenario.scanners[0].behavior.file_dir = Some(temp.path().join("driver"));
    let subsystem = Arc::new(scenario.build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.stats.forwarded, 2);
    assert!(summary
        .files
        .iter()
        .all(|p| p.starts_with(temp.path().join("driver"))));
    assert_eq!(files_in(&config.output_dir), 0);
}

#[test]
fn test_show_ui_skips_negotiation() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::flatbed().build());
    let config = ScanConfiguration {
        show_ui: true,
        resolution: 600,
        ..config_in(&temp)
    };

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    let calls = subsystem.calls();
    assert_eq!(calls.set_capability, 0);
    assert_eq!(calls.enable_modes, vec![EnableMode::ShowUi]);
}

// =============================================================================
// SETUP FAILURES
// =============================================================================

#[test]
fn test_open_device_failure() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::busy_scanner().build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    assert!(matches!(
        outcome,
        ScanOutcome::SetupFailure(ScanError::DeviceOpen {
            code: ReturnCode::Busy,
            ..
        })
    ));
    assert_eq!(outcome.exit_code(), 1);
    let calls = subsystem.calls();
    assert_eq!(calls.set_capability, 0);
    assert_eq!(calls.close_session, 1);
    assert_eq!(calls.close_device, 0);
}

#[test]
fn test_session_open_failure() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::session_failure().build());

    let outcome = run(&subsystem, &config_in(&temp));

    assert!(matches!(
        outcome,
        ScanOutcome::SetupFailure(ScanError::SessionOpen(_))
    ));
    let calls = subsystem.calls();
    assert_eq!(calls.enumerate, 0);
    assert_eq!(calls.close_session, 0);
}

#[test]
fn test_no_devices() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::no_devices().build());

    let outcome = run(&subsystem, &config_in(&temp));

    assert!(matches!(
        outcome,
        ScanOutcome::SetupFailure(ScanError::NoDevicesFound)
    ));
    let calls = subsystem.calls();
    assert_eq!(calls.open_device, 0);
    assert_eq!(calls.close_session, 1);
}

#[test]
fn test_unmatched_selector() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::multi_device().build());
    let config = ScanConfiguration {
        device_selector: Some("brother".to_string()),
        ..config_in(&temp)
    };

    let outcome = run(&subsystem, &config);

    assert!(matches!(
        outcome,
        ScanOutcome::SetupFailure(ScanError::DeviceNotFound(_))
    ));
    assert_eq!(subsystem.calls().open_device, 0);
}

#[test]
fn test_enable_failure_closes_everything() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::enable_failure().build());

    let outcome = run(&subsystem, &config_in(&temp));

    assert!(matches!(
        outcome,
        ScanOutcome::SetupFailure(ScanError::Enable(_))
    ));
    let calls = subsystem.calls();
    assert!(calls.set_capability > 0);
    assert_eq!(calls.close_device, 1);
    assert_eq!(calls.close_session, 1);
}

// =============================================================================
// DEVICE ERRORS
// =============================================================================

#[test]
fn test_device_error_is_fatal() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::device_error().build());
    let config = config_in(&temp);

    let outcome = run(&subsystem, &config);

    assert!(matches!(
        outcome,
        ScanOutcome::DeviceError { code: Some(12), .. }
    ));
    assert_eq!(outcome.exit_code(), 1);
    // pages before the error are kept
    assert_eq!(files_in(&config.output_dir), 2);
    assert_eq!(subsystem.calls().close_device, 1);
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[test]
fn test_cancel_before_first_page() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let mut scenario = ScenarioLibrary::feeder_batch();
    scenario.scanners[0] = scenario.scanners[0]
        .clone()
        .with_trigger_before_page(0, config.watch_dir.join("cancel"));
    let subsystem = Arc::new(scenario.build());

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_cancelled(), "{}", outcome);
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(files_in(&config.output_dir), 0);
    let calls = subsystem.calls();
    // closed once, by the monitor
    assert_eq!(calls.close_device, 1);
    assert_eq!(calls.pages_delivered, 0);
    assert_eq!(calls.close_session, 1);
}

#[test]
fn test_trigger_mid_batch() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let trigger = config.watch_dir.join("cancel");
    let mut scenario = ScenarioLibrary::feeder_batch();
    scenario.scanners[0] = scenario.scanners[0]
        .clone()
        .with_trigger_before_page(1, &trigger);
    let subsystem = Arc::new(scenario.build());
    let ctx = Arc::new(SessionContext::new());

    let outcome = run_scan(subsystem.clone(), &config, Arc::clone(&ctx));

    assert!(outcome.is_cancelled(), "{}", outcome);
    let calls = subsystem.calls();
    let stats = outcome.summary().unwrap().stats;
    assert_eq!(calls.pages_delivered, 1);
    assert_eq!(stats.accepted, 1);
    // the page in flight is either saved or dropped, never lost
    assert_eq!(stats.saved + stats.discarded, calls.pages_delivered);
    assert_eq!(files_in(&config.output_dir), stats.saved);
    assert_eq!(calls.close_device, 1);
    assert!(ctx.is_cancelled());
    assert!(!ctx.cancel());
    // removed so the next run doesn't start cancelled
    assert!(!trigger.exists());
}

#[test]
fn test_existing_trigger_rejects_first_transfer() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    fs::create_dir_all(&config.watch_dir).unwrap();
    fs::write(config.watch_dir.join("cancel"), b"").unwrap();
    let subsystem = Arc::new(ScenarioLibrary::feeder_batch().build());

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_cancelled(), "{}", outcome);
    assert_eq!(files_in(&config.output_dir), 0);
    let calls = subsystem.calls();
    assert_eq!(
        calls.replies,
        vec![HostReply::Listening, HostReply::CancelAll]
    );
    assert_eq!(calls.pages_delivered, 0);
    assert_eq!(calls.close_device, 1);
    assert!(!config.watch_dir.join("cancel").exists());
}

#[test]
fn test_custom_trigger_name() {
    let temp = TempDir::new().unwrap();
    let config = ScanConfiguration {
        trigger_name: "stop.flag".to_string(),
        ..config_in(&temp)
    };
    fs::create_dir_all(&config.watch_dir).unwrap();
    // the default name means nothing now
    fs::write(config.watch_dir.join("cancel"), b"").unwrap();
    let subsystem = Arc::new(ScenarioLibrary::flatbed().build());

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_completed(), "{}", outcome);
    assert!(config.watch_dir.join("cancel").exists());
}

#[test]
fn test_cancel_from_another_thread() {
    let temp = TempDir::new().unwrap();
    let config = config_in(&temp);
    let mut scenario = ScenarioLibrary::feeder_batch();
    scenario.scanners[0] = scenario.scanners[0]
        .clone()
        .with_pages(7)
        .with_page_delay(Duration::from_millis(50));
    let subsystem = Arc::new(scenario.build());
    let ctx = Arc::new(SessionContext::new());

    let canceller = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            ctx.cancel();
            ctx.request_loop_exit();
        })
    };
    let outcome = run_scan(subsystem.clone(), &config, ctx);
    canceller.join().unwrap();

    assert!(outcome.is_cancelled(), "{}", outcome);
    assert!(files_in(&config.output_dir) < 10);
    assert_eq!(subsystem.calls().close_device, 1);
}

#[test]
fn test_dialog_cancel() {
    let temp = TempDir::new().unwrap();
    let subsystem = Arc::new(ScenarioLibrary::dialog_cancel().build());
    let config = ScanConfiguration {
        show_ui: true,
        ..config_in(&temp)
    };

    let outcome = run(&subsystem, &config);

    assert!(outcome.is_cancelled(), "{}", outcome);
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(files_in(&config.output_dir), 0);
}

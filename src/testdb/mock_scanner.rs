//! Simulated device subsystem
//!
//! `MockSubsystem` implements [`DeviceSubsystem`] over a list of in-memory
//! scanners. Each scanner has a capability table, a list of pages and a set
//! of behaviours (refusing to open or enable, rejecting writes, ending with a
//! device error, file-backed transfers, writing a cancel trigger mid-run).
//!
//! Enabling a scanner spawns a producer thread that plays the driver's side
//! of the transfer protocol over the returned [`EventChannel`]. Every driver
//! call is counted in a [`CallLog`] so tests can assert on exact call counts.

use super::generator::MockPageGenerator;
use crate::core::error::{Result, ScanError};
use crate::device::traits::{
    CapValue, Capability, CapabilityInfo, DeviceDescriptor, DeviceHandle, DeviceSubsystem,
    DisableReason, EnableMode, EventChannel, HostReply, PixelType, ReturnCode, TransferEvent,
    TransferPayload,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// How long a producer waits for the host to react to a trigger it wrote
const TRIGGER_WAIT: Duration = Duration::from_secs(5);

/// One page a simulated scanner delivers
#[derive(Debug, Clone, PartialEq)]
pub enum MockPage {
    /// A decodable page; its size follows the current resolution
    Image { shade: u8 },
    /// Bytes that fail to decode
    Corrupt,
}

/// Behaviour switches of a simulated scanner
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// `open_device` fails with this code
    pub fail_open: Option<ReturnCode>,
    /// `enable` fails with this code
    pub fail_enable: Option<ReturnCode>,
    /// Writes to these capabilities are rejected
    pub reject_sets: Vec<Capability>,
    /// Acquisition ends with this condition code instead of completing
    pub disable_error: Option<u16>,
    /// Pages are written into this directory and delivered as file paths
    pub file_dir: Option<PathBuf>,
    /// Delay before each page
    pub page_delay: Duration,
    /// Before delivering page `n`, create the file at this path and wait for
    /// the host to close the scanner
    pub trigger_before_page: Option<(usize, PathBuf)>,
    /// With the scanner's dialog shown, the user presses cancel
    pub cancel_in_dialog: bool,
}

/// A simulated scanner
#[derive(Debug, Clone)]
pub struct MockScanner {
    pub descriptor: DeviceDescriptor,
    pub capabilities: HashMap<Capability, CapabilityInfo>,
    pub pages: Vec<MockPage>,
    pub behavior: MockBehavior,
}

impl MockScanner {
    /// A scanner with no capabilities and no pages
    pub fn bare(name: &str) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(0, name),
            capabilities: HashMap::new(),
            pages: Vec::new(),
            behavior: MockBehavior::default(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.descriptor = self.descriptor.with_manufacturer(manufacturer);
        self
    }

    pub fn with_capability(mut self, capability: Capability, info: CapabilityInfo) -> Self {
        self.capabilities.insert(capability, info);
        self
    }

    /// Append `count` decodable pages
    pub fn with_pages(mut self, count: usize) -> Self {
        let start = self.pages.len();
        self.pages.extend((start..start + count).map(|i| MockPage::Image {
            shade: (i as u8).wrapping_mul(0x30),
        }));
        self
    }

    pub fn with_page(mut self, page: MockPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Reject every write to `capability`
    pub fn rejecting(mut self, capability: Capability) -> Self {
        self.behavior.reject_sets.push(capability);
        self
    }

    pub fn failing_open(mut self, code: ReturnCode) -> Self {
        self.behavior.fail_open = Some(code);
        self
    }

    pub fn failing_enable(mut self, code: ReturnCode) -> Self {
        self.behavior.fail_enable = Some(code);
        self
    }

    pub fn ending_with_error(mut self, code: u16) -> Self {
        self.behavior.disable_error = Some(code);
        self
    }

    pub fn with_file_transfer(mut self, dir: impl Into<PathBuf>) -> Self {
        self.behavior.file_dir = Some(dir.into());
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.behavior.page_delay = delay;
        self
    }

    pub fn with_trigger_before_page(mut self, page: usize, trigger: impl Into<PathBuf>) -> Self {
        self.behavior.trigger_before_page = Some((page, trigger.into()));
        self
    }

    pub fn cancelling_in_dialog(mut self) -> Self {
        self.behavior.cancel_in_dialog = true;
        self
    }

    fn current(&self, capability: Capability) -> Option<CapValue> {
        self.capabilities
            .get(&capability)
            .and_then(|info| info.current)
    }
}

/// Counts of every driver call made against a [`MockSubsystem`]
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub open_session: usize,
    pub close_session: usize,
    pub enumerate: usize,
    pub open_device: usize,
    pub close_device: usize,
    pub get_capability: usize,
    pub set_capability: usize,
    /// Every attempted write, accepted or not, in order
    pub sets: Vec<(Capability, CapValue)>,
    pub enable: usize,
    pub enable_modes: Vec<EnableMode>,
    /// Replies the host sent, in order
    pub replies: Vec<HostReply>,
    /// Data events sent to the host
    pub pages_delivered: usize,
}

#[derive(Debug)]
struct MockState {
    scanners: Vec<MockScanner>,
    session_open: bool,
    /// Open handles and the scanner index behind each
    open: HashMap<u32, usize>,
    next_handle: u32,
    calls: CallLog,
}

/// In-memory device subsystem
#[derive(Debug, Clone)]
pub struct MockSubsystem {
    state: Arc<Mutex<MockState>>,
    fail_session_open: Option<ReturnCode>,
}

impl MockSubsystem {
    /// Subsystem over `scanners`; ids are assigned in order starting at 1
    pub fn new(scanners: Vec<MockScanner>) -> Self {
        let scanners = scanners
            .into_iter()
            .enumerate()
            .map(|(i, mut scanner)| {
                scanner.descriptor.id = i as u32 + 1;
                scanner
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(MockState {
                scanners,
                session_open: false,
                open: HashMap::new(),
                next_handle: 1,
                calls: CallLog::default(),
            })),
            fail_session_open: None,
        }
    }

    /// Make `open_session` fail with `code`
    pub fn failing_session_open(mut self, code: ReturnCode) -> Self {
        self.fail_session_open = Some(code);
        self
    }

    /// Snapshot of the call counts
    pub fn calls(&self) -> CallLog {
        lock(&self.state).calls.clone()
    }

    /// Current value of a capability on the scanner at `index`
    pub fn current_value(&self, index: usize, capability: Capability) -> Option<CapValue> {
        lock(&self.state)
            .scanners
            .get(index)
            .and_then(|s| s.current(capability))
    }

    fn open_index(state: &MockState, handle: DeviceHandle) -> Result<usize> {
        state
            .open
            .get(&handle.0)
            .copied()
            .ok_or(ScanError::InvalidHandle(handle.0))
    }
}

impl DeviceSubsystem for MockSubsystem {
    fn open_session(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.open_session += 1;
        if let Some(code) = self.fail_session_open {
            return Err(ScanError::SessionOpen(code));
        }
        state.session_open = true;
        Ok(())
    }

    fn close_session(&self) {
        let mut state = lock(&self.state);
        state.calls.close_session += 1;
        state.session_open = false;
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut state = lock(&self.state);
        state.calls.enumerate += 1;
        if !state.session_open {
            return Err(ScanError::DeviceError("session is not open".to_string()));
        }
        Ok(state
            .scanners
            .iter()
            .map(|s| s.descriptor.clone())
            .collect())
    }

    fn open_device(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandle> {
        let mut state = lock(&self.state);
        state.calls.open_device += 1;
        if !state.session_open {
            return Err(ScanError::DeviceError("session is not open".to_string()));
        }

        let index = state
            .scanners
            .iter()
            .position(|s| s.descriptor.id == descriptor.id)
            .ok_or_else(|| ScanError::DeviceNotFound(descriptor.name.clone()))?;

        if let Some(code) = state.scanners[index].behavior.fail_open {
            return Err(ScanError::DeviceOpen {
                name: descriptor.name.clone(),
                code,
            });
        }

        let handle = state.next_handle;
        state.next_handle += 1;
        state.open.insert(handle, index);
        debug!("Mock scanner {} opened as #{}", descriptor, handle);
        Ok(DeviceHandle(handle))
    }

    fn close_device(&self, handle: DeviceHandle) {
        let mut state = lock(&self.state);
        state.calls.close_device += 1;
        if state.open.remove(&handle.0).is_some() {
            debug!("Mock scanner {} closed", handle);
        }
    }

    fn is_open(&self, handle: DeviceHandle) -> bool {
        lock(&self.state).open.contains_key(&handle.0)
    }

    fn get_capability(
        &self,
        handle: DeviceHandle,
        capability: Capability,
    ) -> Result<CapabilityInfo> {
        let mut state = lock(&self.state);
        state.calls.get_capability += 1;
        let index = Self::open_index(&state, handle)?;
        Ok(state.scanners[index]
            .capabilities
            .get(&capability)
            .cloned()
            .unwrap_or_else(CapabilityInfo::unsupported))
    }

    fn set_capability(
        &self,
        handle: DeviceHandle,
        capability: Capability,
        value: CapValue,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.set_capability += 1;
        state.calls.sets.push((capability, value));
        let index = Self::open_index(&state, handle)?;
        let scanner = &mut state.scanners[index];

        let rejected = scanner.behavior.reject_sets.contains(&capability);
        let Some(info) = scanner.capabilities.get_mut(&capability) else {
            return Err(ScanError::Capability {
                capability,
                code: ReturnCode::CapabilityUnsupported,
            });
        };

        let code = if !info.supported {
            Some(ReturnCode::CapabilityUnsupported)
        } else if !info.settable {
            Some(ReturnCode::BadCapability)
        } else if rejected {
            Some(ReturnCode::Failure)
        } else if !info.allowed.is_empty() && !info.allowed.contains(&value) {
            Some(ReturnCode::BadValue)
        } else {
            None
        };

        match code {
            Some(code) => Err(ScanError::Capability { capability, code }),
            None => {
                info.current = Some(value);
                Ok(())
            }
        }
    }

    fn enable(&self, handle: DeviceHandle, mode: EnableMode) -> Result<EventChannel> {
        let mut state = lock(&self.state);
        state.calls.enable += 1;
        state.calls.enable_modes.push(mode);
        let index = Self::open_index(&state, handle)?;
        let scanner = &state.scanners[index];

        if let Some(code) = scanner.behavior.fail_enable {
            return Err(ScanError::Enable(code));
        }

        let resolution = match scanner.current(Capability::XResolution) {
            Some(CapValue::UInt(dpi)) => dpi,
            _ => 0,
        };
        let pixel_type = match scanner.current(Capability::PixelType) {
            Some(CapValue::PixelType(pixel_type)) => pixel_type,
            _ => PixelType::Rgb,
        };

        let producer = Producer {
            state: Arc::clone(&self.state),
            handle,
            mode,
            pages: scanner.pages.clone(),
            behavior: scanner.behavior.clone(),
            page_size: MockPageGenerator::page_size(resolution),
            pixel_type,
        };
        drop(state);

        let (event_tx, events) = unbounded();
        let (replies, reply_rx) = unbounded();
        thread::Builder::new()
            .name(format!("mock-scanner-{}", handle.0))
            .spawn(move || producer.run(event_tx, reply_rx))
            .map_err(|e| ScanError::DeviceError(format!("Failed to start scanner: {}", e)))?;

        Ok(EventChannel { events, replies })
    }
}

/// Driver side of one acquisition
struct Producer {
    state: Arc<Mutex<MockState>>,
    handle: DeviceHandle,
    mode: EnableMode,
    pages: Vec<MockPage>,
    behavior: MockBehavior,
    page_size: (u32, u32),
    pixel_type: PixelType,
}

impl Producer {
    fn run(self, events: Sender<TransferEvent>, replies: Receiver<HostReply>) {
        // callbacks only start once the host's loop is running
        loop {
            match self.next_reply(&replies) {
                Some(HostReply::Listening) => break,
                Some(other) => trace!("Reply {:?} before the host was listening", other),
                None => return,
            }
        }

        if self.mode == EnableMode::ShowUi && self.behavior.cancel_in_dialog {
            debug!("Mock dialog cancelled by the user");
            let _ = events.send(TransferEvent::Disabled(DisableReason::Cancelled));
            return;
        }

        let total = self.pages.len();
        for (index, page) in self.pages.iter().enumerate() {
            if !self.behavior.page_delay.is_zero() {
                thread::sleep(self.behavior.page_delay);
            }

            if let Some((at, ref trigger)) = self.behavior.trigger_before_page {
                if at == index {
                    self.pull_trigger(trigger);
                }
            }

            if !self.is_open() {
                debug!("Mock scanner {} closed mid-batch", self.handle);
                let _ = events.send(TransferEvent::Disabled(DisableReason::Cancelled));
                return;
            }

            let pending = Some((total - index) as u32);
            if events.send(TransferEvent::Ready { pending }).is_err() {
                return;
            }

            match self.next_reply(&replies) {
                Some(HostReply::Proceed) => {}
                Some(HostReply::CancelAll) => {
                    debug!("Host cancelled the remaining {} page(s)", total - index);
                    let _ = events.send(TransferEvent::Disabled(DisableReason::Cancelled));
                    return;
                }
                Some(HostReply::Listening) => {
                    warn!("Unexpected listening reply, treating as proceed");
                }
                None => return,
            }

            let payload = match self.payload(index, page) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Mock scanner failed to produce page {}: {}", index, e);
                    let _ = events.send(TransferEvent::Disabled(DisableReason::Disconnected));
                    return;
                }
            };
            if events.send(TransferEvent::Data(payload)).is_err() {
                return;
            }
            lock(&self.state).calls.pages_delivered += 1;
        }

        let reason = match self.behavior.disable_error {
            Some(code) => DisableReason::Error(code),
            None => DisableReason::Completed,
        };
        let _ = events.send(TransferEvent::Disabled(reason));
    }

    /// Next host reply, logged; `None` once the host hung up
    fn next_reply(&self, replies: &Receiver<HostReply>) -> Option<HostReply> {
        let reply = replies.recv().ok()?;
        lock(&self.state).calls.replies.push(reply);
        Some(reply)
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open.contains_key(&self.handle.0)
    }

    /// Create the trigger file and give the host time to close the scanner
    fn pull_trigger(&self, trigger: &Path) {
        if let Some(parent) = trigger.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(trigger, b"") {
            warn!("Mock scanner could not write trigger {}: {}", trigger.display(), e);
            return;
        }
        debug!("Mock scanner wrote trigger {}", trigger.display());

        let deadline = Instant::now() + TRIGGER_WAIT;
        while self.is_open() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn payload(&self, index: usize, page: &MockPage) -> Result<TransferPayload> {
        let data = match page {
            MockPage::Image { shade } => {
                let (width, height) = self.page_size;
                MockPageGenerator::render(width, height, *shade, self.pixel_type)
            }
            MockPage::Corrupt => MockPageGenerator::corrupt(512, index as u64),
        };

        match self.behavior.file_dir {
            Some(ref dir) => {
                fs::create_dir_all(dir)?;
                let path = dir.join(format!("twain_{:04}.bmp", index + 1));
                fs::write(&path, &data)?;
                Ok(TransferPayload::File(path))
            }
            None => Ok(TransferPayload::Buffer(data)),
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::traits::{LightPath, Unit};

    fn scanner() -> MockScanner {
        MockScanner::bare("Test Scanner")
            .with_capability(
                Capability::XResolution,
                CapabilityInfo::settable(CapValue::UInt(150)),
            )
            .with_capability(
                Capability::LightPath,
                CapabilityInfo::read_only(CapValue::LightPath(LightPath::Reflective)),
            )
            .with_capability(
                Capability::Units,
                CapabilityInfo::settable(CapValue::Unit(Unit::Inches))
                    .with_allowed(vec![CapValue::Unit(Unit::Inches)]),
            )
            .with_pages(2)
    }

    fn open(subsystem: &MockSubsystem) -> DeviceHandle {
        subsystem.open_session().unwrap();
        let devices = subsystem.enumerate_devices().unwrap();
        subsystem.open_device(&devices[0]).unwrap()
    }

    #[test]
    fn test_ids_assigned_in_order() {
        let subsystem = MockSubsystem::new(vec![
            MockScanner::bare("First"),
            MockScanner::bare("Second"),
        ]);
        subsystem.open_session().unwrap();

        let devices = subsystem.enumerate_devices().unwrap();

        assert_eq!(devices[0].id, 1);
        assert_eq!(devices[1].id, 2);
        assert_eq!(devices[1].to_string(), "Second (ID: 2)");
    }

    #[test]
    fn test_enumerate_requires_session() {
        let subsystem = MockSubsystem::new(vec![scanner()]);
        assert!(subsystem.enumerate_devices().is_err());
    }

    #[test]
    fn test_session_open_failure() {
        let subsystem =
            MockSubsystem::new(vec![scanner()]).failing_session_open(ReturnCode::Failure);
        assert!(matches!(
            subsystem.open_session(),
            Err(ScanError::SessionOpen(ReturnCode::Failure))
        ));
        assert_eq!(subsystem.calls().open_session, 1);
    }

    #[test]
    fn test_set_capability_validation() {
        let subsystem = MockSubsystem::new(vec![scanner().rejecting(Capability::XResolution)]);
        let handle = open(&subsystem);

        let err = subsystem
            .set_capability(handle, Capability::FilmType, CapValue::Bool(true))
            .unwrap_err();
        assert_eq!(err.return_code(), Some(ReturnCode::CapabilityUnsupported));

        let err = subsystem
            .set_capability(
                handle,
                Capability::LightPath,
                CapValue::LightPath(LightPath::Transmissive),
            )
            .unwrap_err();
        assert_eq!(err.return_code(), Some(ReturnCode::BadCapability));

        let err = subsystem
            .set_capability(handle, Capability::XResolution, CapValue::UInt(300))
            .unwrap_err();
        assert_eq!(err.return_code(), Some(ReturnCode::Failure));

        let err = subsystem
            .set_capability(handle, Capability::Units, CapValue::Unit(Unit::Millimeters))
            .unwrap_err();
        assert_eq!(err.return_code(), Some(ReturnCode::BadValue));

        assert_eq!(subsystem.calls().set_capability, 4);
        assert_eq!(
            subsystem.current_value(0, Capability::XResolution),
            Some(CapValue::UInt(150))
        );
    }

    #[test]
    fn test_closed_handle_is_invalid() {
        let subsystem = MockSubsystem::new(vec![scanner()]);
        let handle = open(&subsystem);

        subsystem.close_device(handle);
        subsystem.close_device(handle);

        assert!(!subsystem.is_open(handle));
        assert!(matches!(
            subsystem.get_capability(handle, Capability::XResolution),
            Err(ScanError::InvalidHandle(_))
        ));
        assert_eq!(subsystem.calls().close_device, 2);
    }

    #[test]
    fn test_producer_plays_the_protocol() {
        let subsystem = MockSubsystem::new(vec![scanner()]);
        let handle = open(&subsystem);
        let channel = subsystem.enable(handle, EnableMode::NoUi).unwrap();
        let timeout = Duration::from_secs(5);

        channel.replies.send(HostReply::Listening).unwrap();
        for remaining in [2u32, 1] {
            assert_eq!(
                channel.events.recv_timeout(timeout).unwrap(),
                TransferEvent::Ready {
                    pending: Some(remaining)
                }
            );
            channel.replies.send(HostReply::Proceed).unwrap();
            match channel.events.recv_timeout(timeout).unwrap() {
                TransferEvent::Data(TransferPayload::Buffer(data)) => {
                    assert!(image::load_from_memory(&data).is_ok())
                }
                other => panic!("expected a page, got {:?}", other),
            }
        }
        assert_eq!(
            channel.events.recv_timeout(timeout).unwrap(),
            TransferEvent::Disabled(DisableReason::Completed)
        );
        assert_eq!(subsystem.calls().pages_delivered, 2);
    }

    #[test]
    fn test_producer_honours_cancel_all() {
        let subsystem = MockSubsystem::new(vec![scanner()]);
        let handle = open(&subsystem);
        let channel = subsystem.enable(handle, EnableMode::NoUi).unwrap();
        let timeout = Duration::from_secs(5);

        channel.replies.send(HostReply::Listening).unwrap();
        assert!(matches!(
            channel.events.recv_timeout(timeout).unwrap(),
            TransferEvent::Ready { .. }
        ));
        channel.replies.send(HostReply::CancelAll).unwrap();

        assert_eq!(
            channel.events.recv_timeout(timeout).unwrap(),
            TransferEvent::Disabled(DisableReason::Cancelled)
        );
        let calls = subsystem.calls();
        assert_eq!(calls.pages_delivered, 0);
        assert_eq!(
            calls.replies,
            vec![HostReply::Listening, HostReply::CancelAll]
        );
    }

    #[test]
    fn test_enable_failure() {
        let subsystem = MockSubsystem::new(vec![scanner().failing_enable(ReturnCode::Busy)]);
        let handle = open(&subsystem);

        let err = subsystem.enable(handle, EnableMode::NoUi).unwrap_err();

        assert!(matches!(err, ScanError::Enable(ReturnCode::Busy)));
        assert_eq!(subsystem.calls().enable_modes, vec![EnableMode::NoUi]);
    }
}

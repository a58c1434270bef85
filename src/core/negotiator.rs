//! Capability negotiation
//!
//! Translates a [`ScanConfiguration`] into capability writes against an open
//! scanner. Negotiation is best effort: a capability the scanner doesn't
//! support, can't set, or rejects is logged and skipped, and the remaining
//! categories are still applied.

use crate::core::config::{DuplexPolicy, ScanConfiguration};
use crate::device::traits::{
    CapValue, Capability, CapabilityInfo, DeviceHandle, DeviceSubsystem, Frame, LightPath, Unit,
};
use log::{debug, info, warn};

/// Counters of one negotiation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiationStats {
    /// Capability writes the scanner accepted
    pub applied: usize,
    /// Capabilities skipped as unsupported, read-only or not offered
    pub skipped: usize,
    /// Capability writes the scanner rejected
    pub failed: usize,
}

/// Apply `config` to the scanner behind `handle`.
///
/// Returns the number of capability writes that were accepted.
pub fn configure(
    subsystem: &dyn DeviceSubsystem,
    handle: DeviceHandle,
    config: &ScanConfiguration,
) -> usize {
    let mut negotiator = CapabilityNegotiator::new(subsystem, handle);
    negotiator.apply(config);
    let stats = negotiator.stats();
    info!(
        "Scanner configured: {} applied, {} skipped, {} rejected",
        stats.applied, stats.skipped, stats.failed
    );
    stats.applied
}

/// Stateful negotiator for one scanner
pub struct CapabilityNegotiator<'a> {
    subsystem: &'a dyn DeviceSubsystem,
    handle: DeviceHandle,
    stats: NegotiationStats,
}

impl<'a> CapabilityNegotiator<'a> {
    pub fn new(subsystem: &'a dyn DeviceSubsystem, handle: DeviceHandle) -> Self {
        Self {
            subsystem,
            handle,
            stats: NegotiationStats::default(),
        }
    }

    pub fn stats(&self) -> NegotiationStats {
        self.stats
    }

    /// Run every category in order
    pub fn apply(&mut self, config: &ScanConfiguration) {
        self.apply_feeder(config);
        self.apply_light_path(config);
        self.apply_pixel_type(config);
        self.apply_resolution(config);
        self.apply_duplex(config);
        self.apply_area(config);
        self.apply_lamp();
    }

    fn apply_feeder(&mut self, config: &ScanConfiguration) {
        let use_feeder = config.source.map(|s| s.uses_feeder()).unwrap_or(false);
        if self.writable(Capability::FeederEnabled).is_some() {
            self.set(Capability::FeederEnabled, CapValue::Bool(use_feeder));
        }
    }

    fn apply_light_path(&mut self, config: &ScanConfiguration) {
        let Some(source) = config.source else {
            return;
        };
        let Some(light_path) = source.light_path() else {
            return;
        };
        if self.writable(Capability::LightPath).is_none() {
            return;
        }
        if !self.set(Capability::LightPath, CapValue::LightPath(light_path)) {
            return;
        }

        if light_path == LightPath::Transmissive {
            if let Some(film) = source.film_type() {
                if self.writable(Capability::FilmType).is_some() {
                    self.set(Capability::FilmType, CapValue::FilmType(film));
                }
            }
        }
    }

    fn apply_pixel_type(&mut self, config: &ScanConfiguration) {
        let Some(mode) = config.color_mode else {
            return;
        };
        let Some(info) = self.writable(Capability::PixelType) else {
            return;
        };

        let wanted = CapValue::PixelType(mode.pixel_type());
        if !info.offers(&wanted) {
            debug!(
                "Scanner doesn't offer {:?}, keeping its default pixel type",
                mode.pixel_type()
            );
            self.stats.skipped += 1;
            return;
        }
        self.set(Capability::PixelType, wanted);
    }

    fn apply_resolution(&mut self, config: &ScanConfiguration) {
        if config.resolution == 0 {
            return;
        }
        for capability in [Capability::XResolution, Capability::YResolution] {
            if self.writable(capability).is_some() {
                self.set(capability, CapValue::UInt(config.resolution));
            }
        }
    }

    fn apply_duplex(&mut self, config: &ScanConfiguration) {
        let value = match (config.duplex_policy, config.duplex) {
            (_, true) => true,
            (DuplexPolicy::Explicit, false) => false,
            (DuplexPolicy::OnlyWhenRequested, false) => return,
        };
        if self.writable(Capability::DuplexEnabled).is_some() {
            self.set(Capability::DuplexEnabled, CapValue::Bool(value));
        }
    }

    fn apply_area(&mut self, config: &ScanConfiguration) {
        let Some(area) = config.area else {
            return;
        };
        if self.writable(Capability::Frame).is_none() {
            return;
        }

        // the frame is read in whatever unit is current, so units go first
        let unit_set = self.writable(Capability::Units).is_some()
            && self.set(Capability::Units, CapValue::Unit(Unit::Millimeters));
        if !unit_set {
            warn!("Could not switch units to millimeters; scan area uses the scanner's unit");
        }

        self.set(
            Capability::Frame,
            CapValue::Frame(Frame {
                left: area.left,
                top: area.top,
                right: area.right(),
                bottom: area.bottom(),
            }),
        );
    }

    fn apply_lamp(&mut self) {
        if self.writable(Capability::LampState).is_some() {
            self.set(Capability::LampState, CapValue::Bool(true));
        }
    }

    /// Capability info if the scanner supports and allows writing it
    fn writable(&mut self, capability: Capability) -> Option<CapabilityInfo> {
        let info = match self.subsystem.get_capability(self.handle, capability) {
            Ok(info) => info,
            Err(e) => {
                debug!("Skipping {}: query failed: {}", capability, e);
                self.stats.skipped += 1;
                return None;
            }
        };

        if !info.is_writable() {
            let reason = if info.supported { "read-only" } else { "not supported" };
            debug!("Skipping {}: {}", capability, reason);
            self.stats.skipped += 1;
            return None;
        }
        Some(info)
    }

    /// Write a value, swallowing rejections. Returns whether it was applied.
    fn set(&mut self, capability: Capability, value: CapValue) -> bool {
        match self.subsystem.set_capability(self.handle, capability, value) {
            Ok(()) => {
                debug!("Set {} = {:?}", capability, value);
                self.stats.applied += 1;
                true
            }
            Err(e) => {
                warn!("Failed to set {}: {}", capability, e);
                self.stats.failed += 1;
                false
            }
        }
    }
}

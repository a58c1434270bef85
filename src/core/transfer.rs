//! Transfer protocol state machine
//!
//! Consumes the scanner's callbacks one at a time, in arrival order:
//!
//! ```text
//! Idle -> Enabled -> (Ready <-> Transferring) -> Disabled
//! ```
//!
//! `Disabled` is terminal and is reached only through a disable event. The
//! cancellation flag is checked on every ready and data event: once it is
//! raised, proposed transfers are refused and delivered payloads are dropped.

use crate::core::context::SessionContext;
use crate::core::error::{Result, ScanError};
use crate::core::output::ImageSink;
use crate::device::traits::{
    DisableReason, EventChannel, EventSource, HostReply, TransferEvent, TransferPayload,
};
use crossbeam_channel::{select, Receiver};
use indicatif::ProgressBar;
use log::{debug, error, info, trace, warn};
use std::fmt;

/// Protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Scanner opened, acquisition not enabled yet
    Idle,
    /// Enabled, no transfer proposed yet
    Enabled,
    /// Waiting for the next proposal after a page
    Ready,
    /// A transfer was accepted, data is expected
    Transferring,
    /// Terminal
    Disabled,
}

/// How the transfer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Cancelled,
    /// The scanner reported an error condition, or vanished
    DeviceError { code: Option<u16> },
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Completed => write!(f, "completed"),
            TransferOutcome::Cancelled => write!(f, "cancelled"),
            TransferOutcome::DeviceError { code: Some(code) } => {
                write!(f, "device error (condition code {})", code)
            }
            TransferOutcome::DeviceError { code: None } => {
                write!(f, "device error (scanner stopped responding)")
            }
        }
    }
}

/// Counters of one transfer loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Transfers accepted
    pub accepted: usize,
    /// Transfers refused because of cancellation
    pub refused: usize,
    /// Pages decoded and written
    pub saved: usize,
    /// Pages the driver wrote to disk itself
    pub forwarded: usize,
    /// Payloads dropped (cancelled or unexpected)
    pub discarded: usize,
    /// Pages that failed to decode or persist
    pub failed: usize,
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Saved: {}, File transfers: {}, Failed: {}, Discarded: {}, Refused: {}",
            self.saved, self.forwarded, self.failed, self.discarded, self.refused
        )
    }
}

/// What the loop must do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Answer the ready event
    Reply(HostReply),
    /// Wait for the next event
    Continue,
    /// The scanner is disabled
    Finished(TransferOutcome),
}

/// The transfer state machine
pub struct TransferMachine<'a, S: ImageSink> {
    ctx: &'a SessionContext,
    sink: &'a mut S,
    state: TransferState,
    stats: TransferStats,
    progress: Option<ProgressBar>,
}

impl<'a, S: ImageSink> TransferMachine<'a, S> {
    pub fn new(ctx: &'a SessionContext, sink: &'a mut S) -> Self {
        Self {
            ctx,
            sink,
            state: TransferState::Idle,
            stats: TransferStats::default(),
            progress: None,
        }
    }

    /// Report pages on a spinner
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// The scanner accepted the enable request
    pub fn mark_enabled(&mut self) {
        if self.state == TransferState::Idle {
            self.state = TransferState::Enabled;
        }
    }

    /// Pump `source` until the scanner is disabled
    pub fn run(&mut self, source: &mut dyn EventSource) -> Result<TransferOutcome> {
        self.mark_enabled();
        loop {
            let event = source.next_event()?;
            match self.handle(event) {
                Step::Reply(reply) => {
                    if let Err(e) = source.reply(reply) {
                        // the disable event that follows decides the outcome
                        warn!("Scanner did not take the reply {:?}: {}", reply, e);
                    }
                }
                Step::Continue => {}
                Step::Finished(outcome) => {
                    self.finish_progress(outcome);
                    return Ok(outcome);
                }
            }
        }
    }

    /// Process one event
    pub fn handle(&mut self, event: TransferEvent) -> Step {
        if self.state == TransferState::Disabled {
            trace!("Ignoring event after disable: {:?}", event_name(&event));
            return Step::Continue;
        }

        match event {
            TransferEvent::Ready { pending } => self.on_ready(pending),
            TransferEvent::Data(payload) => self.on_data(payload),
            TransferEvent::Disabled(reason) => Step::Finished(self.on_disabled(reason)),
        }
    }

    fn on_ready(&mut self, pending: Option<u32>) -> Step {
        if matches!(self.state, TransferState::Idle | TransferState::Transferring) {
            warn!("Transfer proposed in state {:?}", self.state);
        }

        if self.ctx.is_cancelled() {
            info!("Cancellation pending, refusing transfer");
            self.stats.refused += 1;
            self.state = TransferState::Ready;
            return Step::Reply(HostReply::CancelAll);
        }

        match pending {
            Some(pending) => info!("Preparing to transfer image... ({} pending)", pending),
            None => info!("Preparing to transfer image..."),
        }
        self.stats.accepted += 1;
        self.state = TransferState::Transferring;
        Step::Reply(HostReply::Proceed)
    }

    fn on_data(&mut self, payload: TransferPayload) -> Step {
        if self.state != TransferState::Transferring {
            warn!(
                "Unexpected {} data in state {:?}, discarding",
                payload.mechanism(),
                self.state
            );
            self.stats.discarded += 1;
            return Step::Continue;
        }
        self.state = TransferState::Ready;

        if self.ctx.is_cancelled() {
            info!("Cancellation pending, discarding received page");
            self.stats.discarded += 1;
            return Step::Continue;
        }

        debug!("Data received, transfer type: {}", payload.mechanism());
        let result = match &payload {
            TransferPayload::Buffer(data) => self.sink.persist_buffer(data).map(|path| {
                self.stats.saved += 1;
                path
            }),
            TransferPayload::File(path) => self.sink.record_file(path).map(|path| {
                self.stats.forwarded += 1;
                path
            }),
        };

        match result {
            Ok(path) => {
                if let Some(ref progress) = self.progress {
                    progress.set_message(format!(
                        "{} page(s) received, last: {}",
                        self.stats.saved + self.stats.forwarded,
                        path.display()
                    ));
                }
            }
            Err(e) => {
                self.stats.failed += 1;
                log_page_failure(&e);
            }
        }
        Step::Continue
    }

    fn on_disabled(&mut self, reason: DisableReason) -> TransferOutcome {
        let previous = self.state;
        self.state = TransferState::Disabled;

        let outcome = if self.ctx.is_cancelled() {
            TransferOutcome::Cancelled
        } else {
            match reason {
                DisableReason::Completed => TransferOutcome::Completed,
                DisableReason::Cancelled => TransferOutcome::Cancelled,
                DisableReason::Error(code) => TransferOutcome::DeviceError { code: Some(code) },
                DisableReason::Disconnected => TransferOutcome::DeviceError { code: None },
            }
        };

        if previous == TransferState::Transferring {
            warn!("Scanner disabled while a page was in flight");
        }
        info!("Scan {} ({:?})", outcome, reason);
        outcome
    }

    fn finish_progress(&self, outcome: TransferOutcome) {
        if let Some(ref progress) = self.progress {
            progress.finish_with_message(format!("Scan {}: {}", outcome, self.stats));
        }
    }
}

fn log_page_failure(err: &ScanError) {
    match err {
        ScanError::Decode(_) => warn!("Error processing transferred data: {}", err),
        _ => error!("Error processing transferred data: {}", err),
    }
}

fn event_name(event: &TransferEvent) -> &'static str {
    match event {
        TransferEvent::Ready { .. } => "ready",
        TransferEvent::Data(_) => "data",
        TransferEvent::Disabled(_) => "disabled",
    }
}

/// Event source fed by the scanner's channel and the session wake signal
///
/// A wake request (cancellation) ends the wait with a synthetic
/// `Disabled(Cancelled)`; a closed event channel ends it with
/// `Disabled(Disconnected)`.
pub struct ChannelEventSource {
    channel: EventChannel,
    wake: Receiver<()>,
    listening: bool,
}

impl ChannelEventSource {
    pub fn new(channel: EventChannel, wake: Receiver<()>) -> Self {
        Self {
            channel,
            wake,
            listening: false,
        }
    }
}

impl EventSource for ChannelEventSource {
    fn next_event(&mut self) -> Result<TransferEvent> {
        if !self.listening {
            self.listening = true;
            if self.channel.replies.send(HostReply::Listening).is_err() {
                debug!("Scanner is not listening for host replies");
            }
        }

        if self.wake.try_recv().is_ok() {
            return Ok(TransferEvent::Disabled(DisableReason::Cancelled));
        }

        let event = select! {
            recv(self.channel.events) -> event => {
                event.unwrap_or(TransferEvent::Disabled(DisableReason::Disconnected))
            }
            recv(self.wake) -> _ => TransferEvent::Disabled(DisableReason::Cancelled),
        };
        Ok(event)
    }

    fn reply(&mut self, reply: HostReply) -> Result<()> {
        self.channel
            .replies
            .send(reply)
            .map_err(|_| ScanError::DeviceError("scanner stopped listening".to_string()))
    }
}

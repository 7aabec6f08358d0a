//! Fixed-cadence polling loop.
//!
//! Each iteration sends `poll_all`, waits for the reply and hands a
//! `report_all` to the sink. Missed or garbled replies and dropped links are
//! logged and skipped; anything else is a bug or bad configuration and ends
//! the loop.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::command::Command;
use crate::config::DriverConfig;
use crate::errors::{DriverError, Result};
use crate::offsets::OffsetRecord;
use crate::report::SensorReport;
use crate::session::DecodedMessage;
use crate::supervisor::Supervisor;
use crate::transport::Connector;

const NO_ARGS: [&str; 0] = [];

/// Downstream consumer of `report_all` replies.
///
/// Returning [`DriverError::Report`] marks the payload as unusable; the loop
/// logs it and keeps polling. Any other error stops the loop.
pub trait ReportSink {
    fn on_report(&mut self, message: &DecodedMessage) -> Result<()>;
}

impl<F> ReportSink for F
where
    F: FnMut(&DecodedMessage) -> Result<()>,
{
    fn on_report(&mut self, message: &DecodedMessage) -> Result<()> {
        self(message)
    }
}

/// What one poll produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Report,
    Timeout,
    LinkLost,
    DeviceError(String),
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u64,
    pub reports: u64,
    pub timeouts: u64,
    pub link_losses: u64,
    pub device_errors: u64,
    pub offset_writes: u64,
}

pub struct Poller<C: Connector> {
    link: Supervisor<C>,
    read_timeout: Duration,
    interval: Duration,
    desired_offsets: Option<OffsetRecord>,
    offsets_checked: Option<u64>,
    resync: bool,
    stats: PollStats,
}

impl<C: Connector> Poller<C> {
    pub fn new(link: Supervisor<C>, read_timeout: Duration, interval: Duration) -> Self {
        Self {
            link,
            read_timeout,
            interval,
            desired_offsets: None,
            offsets_checked: None,
            resync: false,
            stats: PollStats::default(),
        }
    }

    pub fn from_config(connector: C, config: &DriverConfig) -> Result<Self> {
        config.validate()?;
        let poller = Self::new(
            Supervisor::from_config(connector, config),
            config.read_timeout(),
            config.poll_interval(),
        );
        Ok(poller.with_offsets(config.desired_offsets()?))
    }

    /// Keep the device's stored offsets equal to `offsets`.
    pub fn with_offsets(mut self, offsets: Option<OffsetRecord>) -> Self {
        self.desired_offsets = offsets;
        self
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn supervisor(&self) -> &Supervisor<C> {
        &self.link
    }

    /// Poll forever. Returns only on an error that polling cannot recover
    /// from.
    pub fn run<S: ReportSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        info!("polling every {:?}", self.interval);
        loop {
            self.poll_once(sink)?;
            thread::sleep(self.interval);
        }
    }

    /// One request/response round.
    pub fn poll_once<S: ReportSink + ?Sized>(&mut self, sink: &mut S) -> Result<PollOutcome> {
        self.stats.polls += 1;
        match self.exchange(sink) {
            Ok(outcome) => Ok(outcome),
            Err(e @ (DriverError::FrameTimeout(_) | DriverError::MalformedFrame(_))) => {
                warn!("poll {} missed: {}", self.stats.polls, e);
                self.stats.timeouts += 1;
                self.resync = true;
                Ok(PollOutcome::Timeout)
            }
            Err(e) if e.is_transport() => {
                warn!("poll {} lost the link: {}", self.stats.polls, e);
                self.stats.link_losses += 1;
                self.resync = false;
                Ok(PollOutcome::LinkLost)
            }
            Err(e) => Err(e),
        }
    }

    fn exchange<S: ReportSink + ?Sized>(&mut self, sink: &mut S) -> Result<PollOutcome> {
        if self.resync {
            self.link.flush_input()?;
            self.resync = false;
        }

        self.link.send(Command::PollAll.name(), &NO_ARGS)?;
        let reply = self.link.receive(self.read_timeout)?;

        if reply.command == Command::ReportAll.name() {
            self.stats.reports += 1;
            match sink.on_report(&reply) {
                Ok(()) => {}
                Err(DriverError::Report(msg)) => warn!("unusable report: {}", msg),
                Err(e) => return Err(e),
            }
            self.sync_offsets(&reply)?;
            Ok(PollOutcome::Report)
        } else if reply.command == Command::Error.name() {
            let msg = reply.args.join(",");
            warn!("device error: {}", msg);
            self.stats.device_errors += 1;
            Ok(PollOutcome::DeviceError(msg))
        } else {
            warn!("unexpected reply to poll: {}", reply.command);
            Ok(PollOutcome::Unexpected(reply.command))
        }
    }

    /// Send `set_offsets` when the device reports different offsets than
    /// configured. Checked once per session.
    fn sync_offsets(&mut self, reply: &DecodedMessage) -> Result<()> {
        let Some(desired) = self.desired_offsets else {
            return Ok(());
        };
        let generation = self.link.generation();
        if self.offsets_checked == Some(generation) {
            return Ok(());
        }

        let stored = match SensorReport::from_fields(&reply.args) {
            Ok(report) => match report.stored_offsets() {
                Some(Ok(stored)) => Some(stored),
                Some(Err(e)) => {
                    warn!("device reported unreadable offsets: {}", e);
                    None
                }
                None => None,
            },
            Err(e) => {
                debug!("cannot read stored offsets: {}", e);
                None
            }
        };

        self.offsets_checked = Some(generation);
        if stored == Some(desired) {
            debug!("device offsets already up to date");
            return Ok(());
        }

        let encoded = desired.encode()?;
        info!("updating device offsets to {}", encoded);
        self.link.send(Command::SetOffsets.name(), &[encoded])?;
        self.stats.offset_writes += 1;
        Ok(())
    }
}

/// Sink that parses each report and logs it as JSON.
#[derive(Debug, Default)]
pub struct LogSink {
    pub last: Option<SensorReport>,
}

impl ReportSink for LogSink {
    fn on_report(&mut self, message: &DecodedMessage) -> Result<()> {
        let report = SensorReport::from_fields(&message.args)?;
        let json = serde_json::to_string(&report)
            .map_err(|e| DriverError::Report(format!("cannot serialize report: {e}")))?;
        info!("{} {}", message.received_at.to_rfc3339(), json);
        self.last = Some(report);
        Ok(())
    }
}

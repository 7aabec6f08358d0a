//! Byte transport boundary.
//!
//! A transport is any blocking byte stream whose reads return within a short
//! slice (`ErrorKind::TimedOut`/`WouldBlock` when idle). Closing is dropping.

use std::io::{Read, Write};
use std::time::Duration;

use log::debug;

use crate::errors::Result;

/// Trait for Read + Write + Send, allowing different transport backends.
pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

/// Opens fresh transports for the reconnect supervisor.
#[cfg_attr(test, mockall::automock)]
pub trait Connector {
    /// Open a new transport. Failures here are retried by the supervisor.
    fn open(&mut self) -> Result<Box<dyn Transport>>;

    /// Human-readable address for logs.
    fn describe(&self) -> String;
}

/// Serial port connector (USB CDC, `/dev/ttyACM*`, `COM*`).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud_rate: u32,
    io_slice: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, baud_rate: u32, io_slice: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            io_slice,
        }
    }
}

impl Connector for SerialConnector {
    fn open(&mut self) -> Result<Box<dyn Transport>> {
        debug!(
            "opening serial port: path={}, baud={}",
            self.path, self.baud_rate
        );
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.io_slice)
            .open()?;
        port.clear(serialport::ClearBuffer::Input)?;
        Ok(Box::new(port))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}

//! One conversation over one open transport.
//!
//! A session is either open (holds its transport) or closed (holds nothing).
//! Any disconnect-class failure closes it; a closed session is never reopened,
//! the supervisor builds a new one instead.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, trace};

use crate::codec::{self, FrameBuffer};
use crate::command::CommandTable;
use crate::errors::{DriverError, Result};
use crate::transport::Transport;

/// Upper bound on how long `flush_input` drains stale bytes.
const MAX_FLUSH: Duration = Duration::from_millis(200);

/// A decoded reply, stamped when its terminator arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub command: String,
    pub args: Vec<String>,
    pub received_at: DateTime<Utc>,
}

pub struct Session {
    transport: Option<Box<dyn Transport>>,
    table: Arc<CommandTable>,
    frames: FrameBuffer,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, table: Arc<CommandTable>) -> Self {
        Self {
            transport: Some(transport),
            table,
            frames: FrameBuffer::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Drop the transport. Idempotent.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("session closed");
        }
        self.frames.clear();
    }

    /// Encode and write one command.
    ///
    /// Table and argument errors are returned before anything is written and
    /// leave the session open.
    pub fn send<S: AsRef<str>>(&mut self, command: &str, args: &[S]) -> Result<()> {
        let bytes = codec::encode_command(&self.table, command, args)?;
        let transport = self.open_transport()?;

        let written = transport
            .write_all(&bytes)
            .and_then(|_| transport.flush());
        if let Err(e) = written {
            self.close();
            return Err(DriverError::Transport(format!("write failed: {e}")));
        }

        debug!("sent {}: {}", command, String::from_utf8_lossy(&bytes));
        Ok(())
    }

    /// Read until one complete frame arrives or `timeout` elapses.
    ///
    /// A timeout keeps the session open. A read failure or end of stream
    /// closes it.
    pub fn receive(&mut self, timeout: Duration) -> Result<DecodedMessage> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(body) = self.frames.next_frame()? {
                let received_at = Utc::now();
                trace!("frame body: {}", String::from_utf8_lossy(&body));
                let (command, args) = codec::decode(&self.table, &body)?;
                debug!("received {} with {} field(s)", command, args.len());
                return Ok(DecodedMessage {
                    command,
                    args,
                    received_at,
                });
            }
            if Instant::now() >= deadline {
                return Err(DriverError::FrameTimeout(timeout));
            }

            let read = self.open_transport()?.read(&mut chunk);
            match read {
                Ok(0) => {
                    self.close();
                    return Err(DriverError::Transport("end of stream".into()));
                }
                Ok(n) => self.frames.push(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    self.close();
                    return Err(DriverError::Transport(format!("read failed: {e}")));
                }
            }
        }
    }

    /// Discard buffered and pending input, e.g. a reply that arrived after
    /// its receive timed out.
    pub fn flush_input(&mut self) -> Result<usize> {
        let mut discarded = self.frames.buffered_len();
        self.frames.clear();

        let mut buf = [0u8; 256];
        let start = Instant::now();
        let mut iterations = 0usize;
        loop {
            iterations += 1;
            match self.open_transport()?.read(&mut buf) {
                Ok(0) => {
                    self.close();
                    return Err(DriverError::Transport("end of stream".into()));
                }
                Ok(n) => discarded += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    break
                }
                Err(e) => {
                    self.close();
                    return Err(DriverError::Transport(format!("read failed: {e}")));
                }
            }

            if iterations > 64 || start.elapsed() > MAX_FLUSH {
                break;
            }
        }

        if discarded > 0 {
            debug!("flushed {} stale byte(s)", discarded);
        }
        Ok(discarded)
    }

    fn open_transport(&mut self) -> Result<&mut Box<dyn Transport>> {
        self.transport
            .as_mut()
            .ok_or_else(|| DriverError::Transport("session is closed".into()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

//! Reconnect supervisor.
//!
//! Owns the only [`Session`] and replaces it whenever the link drops:
//!
//! ```text
//! Disconnected --use--> Connecting --open ok + settle--> Connected
//!                           |  ^                            |
//!                           +--+ open failed (backoff)       |
//! Disconnected <-------- transport error on send/receive ----+
//! ```
//!
//! Callers see the transport error of the failed call once; the next call
//! reconnects and runs against the new session.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::command::CommandTable;
use crate::config::DriverConfig;
use crate::errors::{DriverError, Result};
use crate::session::{DecodedMessage, Session};
use crate::transport::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delay policy between failed open attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Retry immediately; for tests and loopback transports.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay before open attempt `attempt` (1-based). The first attempt runs
    /// immediately, retry `k` waits `base * 2^min(k-1, 4)`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 2).min(4);
        self.base.saturating_mul(1 << doublings).min(self.cap)
    }
}

pub struct Supervisor<C: Connector> {
    connector: C,
    table: Arc<CommandTable>,
    session: Option<Session>,
    state: LinkState,
    settle_delay: Duration,
    backoff: Backoff,
    max_attempts: Option<u32>,
    generation: u64,
    open_attempts: u64,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(
        connector: C,
        table: Arc<CommandTable>,
        settle_delay: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            connector,
            table,
            session: None,
            state: LinkState::Disconnected,
            settle_delay,
            backoff,
            max_attempts: None,
            generation: 0,
            open_attempts: 0,
        }
    }

    pub fn from_config(connector: C, config: &DriverConfig) -> Self {
        Self::new(
            connector,
            Arc::new(CommandTable::standard().clone()),
            config.settle_delay(),
            config.backoff(),
        )
        .with_max_attempts(config.max_connect_attempts)
    }

    /// Stop retrying after `max` consecutive failed opens. `None` retries
    /// forever.
    pub fn with_max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Number of sessions established so far. Changes on every reconnect.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total open attempts, successful or not.
    pub fn open_attempts(&self) -> u64 {
        self.open_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected && self.session.as_ref().is_some_and(Session::is_open)
    }

    /// Open the transport if needed, retrying until it succeeds or the
    /// attempt limit is reached.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.teardown();
        self.state = LinkState::Connecting;
        info!("connecting to {}", self.connector.describe());

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                debug!("waiting {:?} before open attempt {}", delay, attempt);
                thread::sleep(delay);
            }

            self.open_attempts += 1;
            match self.connector.open() {
                Ok(transport) => {
                    if !self.settle_delay.is_zero() {
                        debug!("letting device settle for {:?}", self.settle_delay);
                        thread::sleep(self.settle_delay);
                    }
                    self.session = Some(Session::new(transport, Arc::clone(&self.table)));
                    self.generation += 1;
                    self.state = LinkState::Connected;
                    info!(
                        "connected to {} (attempt={}, generation={})",
                        self.connector.describe(),
                        attempt,
                        self.generation
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "open failed: target={}, attempt={}, error={}",
                        self.connector.describe(),
                        attempt,
                        e
                    );
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        self.state = LinkState::Disconnected;
                        return Err(e);
                    }
                }
            }
        }
    }

    pub fn send<S: AsRef<str>>(&mut self, command: &str, args: &[S]) -> Result<()> {
        self.with_session(|session| session.send(command, args))
    }

    pub fn receive(&mut self, timeout: Duration) -> Result<DecodedMessage> {
        self.with_session(|session| session.receive(timeout))
    }

    pub fn flush_input(&mut self) -> Result<usize> {
        self.with_session(Session::flush_input)
    }

    /// Close the session for good, e.g. on process shutdown.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.state = LinkState::Disconnected;
    }

    fn with_session<T>(&mut self, op: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        self.connect()?;
        let result = match self.session.as_mut() {
            Some(session) => op(session),
            None => Err(DriverError::Transport("no session".into())),
        };

        if let Err(e) = &result {
            if e.is_transport() {
                warn!("link lost ({}), will reconnect", e);
                self.shutdown();
            }
        }
        result
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

//! Host-side driver for the aqsensor air quality controller.
//!
//! The controller speaks a command messenger protocol over USB serial:
//! ASCII frames of `ordinal,field,...;` with `/` escaping. This crate
//! provides the command table, the frame codec, a session over one open
//! transport, a supervisor that reconnects whenever the link drops, and a
//! polling loop on top.
//!
//! # Example
//! ```no_run
//! use aqsensor_rs::{DriverConfig, LogSink, Poller, SerialConnector};
//!
//! let config = DriverConfig::default();
//! let connector = SerialConnector::new(&config.port, config.baud_rate, config.io_slice());
//! let mut poller = Poller::from_config(connector, &config)?;
//! poller.run(&mut LogSink::default())?;
//! # Ok::<(), aqsensor_rs::DriverError>(())
//! ```
//!
//! # Error policy
//!
//! Transport errors end the current session and are retried by the
//! supervisor. Frame timeouts are skipped. Table, codec and offset errors are
//! returned to the caller unchanged.

pub mod codec;
pub mod command;
pub mod config;
mod errors;
pub mod logging;
pub mod offsets;
pub mod poller;
pub mod report;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use codec::{Frame, FrameBuffer};
pub use command::{ArgShape, Command, CommandSpec, CommandTable};
pub use config::DriverConfig;
pub use errors::*;
pub use offsets::{OffsetLayout, OffsetRecord};
pub use poller::{LogSink, PollOutcome, PollStats, Poller, ReportSink};
pub use report::SensorReport;
pub use session::{DecodedMessage, Session};
pub use supervisor::{Backoff, LinkState, Supervisor};
pub use transport::{Connector, SerialConnector, Transport};

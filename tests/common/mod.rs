#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aqsensor_rs::codec;
use aqsensor_rs::{
    Backoff, CommandTable, Connector, DriverError, FrameBuffer, OffsetLayout, OffsetRecord,
    Poller, Supervisor, Transport,
};

/// Firmware-side state shared by every transport the connector hands out.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub stored: OffsetRecord,
    pub offset_writes: Vec<String>,
    pub polls: usize,
    /// Swallow this many upcoming polls without answering.
    pub mute_next: usize,
    /// Answer this many upcoming polls with line noise.
    pub garble_next: usize,
    /// Answer polls with this `error` frame body instead of a report. The
    /// firmware writes it unescaped.
    pub error_reply: Option<&'static str>,
    /// Kill the currently open transport on its next read or write.
    pub unplug: bool,
}

pub type SharedDevice = Arc<Mutex<DeviceState>>;

/// In-memory stand-in for the aqsensor firmware.
pub struct SimulatedDevice {
    state: SharedDevice,
    inbound: FrameBuffer,
    outbound: VecDeque<u8>,
    dead: bool,
}

impl SimulatedDevice {
    pub fn new(state: SharedDevice) -> Self {
        Self {
            state,
            inbound: FrameBuffer::new(),
            outbound: VecDeque::new(),
            dead: false,
        }
    }

    fn check_alive(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.unplug {
            state.unplug = false;
            self.dead = true;
        }
        if self.dead {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(())
    }

    fn handle(&mut self, body: &[u8]) {
        let table = CommandTable::standard();
        let reply = match codec::decode(table, body) {
            Ok((name, args)) => self.dispatch(&name, &args),
            Err(_) => Some(b"3,Command without callback.;".to_vec()),
        };
        if let Some(bytes) = reply {
            self.outbound.extend(bytes);
            self.outbound.extend(b"\r\n");
        }
    }

    fn dispatch(&mut self, name: &str, args: &[String]) -> Option<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        match name {
            "poll_all" => {
                state.polls += 1;
                if state.mute_next > 0 {
                    state.mute_next -= 1;
                    return None;
                }
                if state.garble_next > 0 {
                    state.garble_next -= 1;
                    return Some(b"\x15zz;".to_vec());
                }
                if let Some(message) = state.error_reply {
                    return Some(format!("3,{message};").into_bytes());
                }
                Some(report_frame(&state.stored))
            }
            "set_offsets" => {
                state.offset_writes.push(args[0].clone());
                if let Ok(record) = OffsetRecord::decode(&args[0]) {
                    state.stored = record;
                }
                None
            }
            _ => Some(b"3,Command without callback.;".to_vec()),
        }
    }
}

/// Build a `report_all` frame the way the firmware does: JSON written
/// straight into the frame without escaping.
pub fn report_frame(stored: &OffsetRecord) -> Vec<u8> {
    let offsets = OffsetLayout::REPORT
        .encode(stored)
        .unwrap_or_else(|_| "invalid".to_string());
    format!(
        r#"1,{{"device_id":"3a9f","version":"0.0.1","temperature":{},"pressure":1012.5,"humidity":40.5,"eco2":612,"pm25":-1,"alerting":false,"offsets":"{}"}};"#,
        21.0 + stored.temperature,
        offsets
    )
    .into_bytes()
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_alive()?;
        if self.outbound.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_alive()?;
        self.inbound.push(buf);
        while let Ok(Some(body)) = self.inbound.next_frame() {
            self.handle(&body);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fails a fixed number of opens, then hands out simulated devices.
pub struct FlakyConnector {
    pub failures_left: usize,
    pub state: SharedDevice,
}

impl FlakyConnector {
    pub fn new(failures: usize) -> (Self, SharedDevice) {
        let state = SharedDevice::default();
        (
            Self {
                failures_left: failures,
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Connector for FlakyConnector {
    fn open(&mut self) -> aqsensor_rs::Result<Box<dyn Transport>> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(DriverError::Transport("no such device".into()));
        }
        Ok(Box::new(SimulatedDevice::new(Arc::clone(&self.state))))
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

pub fn supervisor(connector: FlakyConnector) -> Supervisor<FlakyConnector> {
    Supervisor::new(
        connector,
        Arc::new(CommandTable::standard().clone()),
        Duration::ZERO,
        Backoff::none(),
    )
}

pub fn poller(connector: FlakyConnector) -> Poller<FlakyConnector> {
    Poller::new(supervisor(connector), Duration::from_millis(50), Duration::ZERO)
}

//! Command table shared with the device firmware.
//!
//! A command's position in the table is its wire ordinal. The firmware
//! declares the same commands in a C enum, so the two orderings must agree
//! exactly; reordering here without reflashing the device silently breaks
//! every exchange.

use once_cell::sync::Lazy;

use crate::errors::{DriverError, Result};

/// Argument shape accepted by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// No arguments.
    None,
    /// Exactly one string argument, escaped on the wire.
    SingleString,
    /// Zero or more string arguments.
    StringList,
}

impl ArgShape {
    /// Check an argument count against this shape.
    pub fn check(self, command: &str, count: usize) -> Result<()> {
        let ok = match self {
            ArgShape::None => count == 0,
            ArgShape::SingleString => count == 1,
            ArgShape::StringList => true,
        };
        if ok {
            Ok(())
        } else {
            Err(DriverError::ArgumentCountMismatch {
                command: command.to_string(),
                expected: self.describe(),
                actual: count,
            })
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ArgShape::None => "no",
            ArgShape::SingleString => "exactly one",
            ArgShape::StringList => "any number of",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub shape: ArgShape,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, shape: ArgShape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }
}

/// Commands understood by the aqsensor firmware, with explicit ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Host asks for a full sensor report.
    PollAll = 0,
    /// Device answers with its JSON report, split on commas.
    ReportAll = 1,
    /// Host pushes a calibration offset string.
    SetOffsets = 2,
    /// Device reports a problem (e.g. a command without a callback).
    Error = 3,
}

impl Command {
    /// Every command in firmware enum order.
    pub const ALL: [Command; 4] = [
        Command::PollAll,
        Command::ReportAll,
        Command::SetOffsets,
        Command::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::PollAll => "poll_all",
            Command::ReportAll => "report_all",
            Command::SetOffsets => "set_offsets",
            Command::Error => "error",
        }
    }

    pub fn shape(self) -> ArgShape {
        match self {
            Command::PollAll => ArgShape::None,
            Command::ReportAll => ArgShape::StringList,
            Command::SetOffsets => ArgShape::SingleString,
            Command::Error => ArgShape::SingleString,
        }
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }
}

static STANDARD: Lazy<CommandTable> = Lazy::new(|| {
    CommandTable::new(
        Command::ALL
            .iter()
            .map(|cmd| CommandSpec::new(cmd.name(), cmd.shape()))
            .collect(),
    )
});

/// Ordered, read-only registry of commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    specs: Vec<CommandSpec>,
}

impl CommandTable {
    /// Build a table from a literal ordered list. Insertion order is the
    /// wire contract.
    pub fn new(specs: Vec<CommandSpec>) -> Self {
        Self { specs }
    }

    /// The table for the aqsensor firmware.
    pub fn standard() -> &'static CommandTable {
        &STANDARD
    }

    pub fn lookup(&self, name: &str) -> Result<&CommandSpec> {
        self.specs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| DriverError::UnknownCommand(name.to_string()))
    }

    pub fn ordinal_of(&self, name: &str) -> Result<usize> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| DriverError::UnknownCommand(name.to_string()))
    }

    /// Reverse lookup used when decoding a received frame.
    pub fn by_ordinal(&self, ordinal: usize) -> Result<&CommandSpec> {
        self.specs
            .get(ordinal)
            .ok_or_else(|| DriverError::UnknownCommand(format!("ordinal {ordinal}")))
    }

    /// Compare against an ordering reported by the other side, failing at the
    /// first disagreement.
    pub fn verify_order(&self, names: &[&str]) -> Result<()> {
        for ordinal in 0..self.specs.len().max(names.len()) {
            let ours = self.specs.get(ordinal).map(|s| s.name.as_str());
            let theirs = names.get(ordinal).copied();
            if ours != theirs {
                return Err(DriverError::TableMismatch {
                    ordinal,
                    expected: ours.unwrap_or("<none>").to_string(),
                    actual: theirs.unwrap_or("<none>").to_string(),
                });
            }
        }
        Ok(())
    }
}

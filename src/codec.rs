//! Command messenger frame codec.
//!
//! A frame is an ASCII ordinal followed by zero or more fields, each
//! introduced by the field separator, and closed by the command terminator:
//!
//! ```text
//! <ordinal> [ ',' <field> ]* ';'
//! ```
//!
//! Separator, terminator and escape bytes inside a field are prefixed with the
//! escape byte. CR/LF noise between frames is ignored.

use crate::command::{ArgShape, CommandSpec, CommandTable};
use crate::errors::{DriverError, Result};

pub const FIELD_SEPARATOR: u8 = b',';
pub const COMMAND_TERMINATOR: u8 = b';';
pub const ESCAPE: u8 = b'/';

/// Longest frame body accepted before the receive buffer is discarded.
pub const MAX_FRAME_LEN: usize = 4096;

/// One frame on the wire, before command names are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ordinal: usize,
    pub fields: Vec<Vec<u8>>,
}

impl Frame {
    pub fn new(ordinal: usize, fields: Vec<Vec<u8>>) -> Self {
        Self { ordinal, fields }
    }

    /// Serialize including the trailing terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.ordinal.to_string().into_bytes();
        for field in &self.fields {
            out.push(FIELD_SEPARATOR);
            escape_into(field, &mut out);
        }
        out.push(COMMAND_TERMINATOR);
        out
    }

    /// Parse a frame body (terminator already stripped).
    pub fn parse(body: &[u8]) -> Result<Self> {
        let start = body
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .ok_or_else(|| DriverError::MalformedFrame("empty frame".into()))?;

        let mut tokens = split_unescaped(&body[start..])?.into_iter();
        let head = tokens.next().unwrap_or_default();
        let ordinal = std::str::from_utf8(&head)
            .ok()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                DriverError::MalformedFrame(format!(
                    "bad ordinal {:?}",
                    String::from_utf8_lossy(&head)
                ))
            })?;

        Ok(Self {
            ordinal,
            fields: tokens.collect(),
        })
    }
}

fn escape_into(field: &[u8], out: &mut Vec<u8>) {
    for &b in field {
        if matches!(b, FIELD_SEPARATOR | COMMAND_TERMINATOR | ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(b);
    }
}

/// Escape a single field for transmission.
pub fn escape(field: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.len());
    escape_into(field, &mut out);
    out
}

/// Split on unescaped separators, removing escapes from each token.
fn split_unescaped(body: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut tokens = Vec::new();
    let mut current = Vec::new();
    let mut escaped = false;

    for &b in body {
        if escaped {
            current.push(b);
            escaped = false;
        } else if b == ESCAPE {
            escaped = true;
        } else if b == FIELD_SEPARATOR {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(b);
        }
    }

    if escaped {
        return Err(DriverError::MalformedFrame("dangling escape".into()));
    }
    tokens.push(current);
    Ok(tokens)
}

/// Validate arguments against the command's shape and build its frame bytes.
pub fn encode<S: AsRef<str>>(spec: &CommandSpec, ordinal: usize, args: &[S]) -> Result<Vec<u8>> {
    spec.shape.check(&spec.name, args.len())?;
    let fields = args.iter().map(|a| a.as_ref().as_bytes().to_vec()).collect();
    Ok(Frame::new(ordinal, fields).to_bytes())
}

/// Encode a command by name against `table`.
pub fn encode_command<S: AsRef<str>>(
    table: &CommandTable,
    name: &str,
    args: &[S],
) -> Result<Vec<u8>> {
    let ordinal = table.ordinal_of(name)?;
    let spec = table.lookup(name)?;
    encode(spec, ordinal, args)
}

/// Decode a frame body into a command name and its arguments.
///
/// The firmware writes string arguments without escaping, so a
/// `SingleString` frame split by stray separators is joined back into one
/// argument. Fields on a `None` command are malformed input.
pub fn decode(table: &CommandTable, body: &[u8]) -> Result<(String, Vec<String>)> {
    let frame = Frame::parse(body)?;
    let spec = table.by_ordinal(frame.ordinal)?;

    let mut args = frame
        .fields
        .into_iter()
        .map(|field| {
            String::from_utf8(field)
                .map_err(|_| DriverError::MalformedFrame("field is not valid UTF-8".into()))
        })
        .collect::<Result<Vec<_>>>()?;

    match spec.shape {
        ArgShape::None if !args.is_empty() => {
            return Err(DriverError::MalformedFrame(format!(
                "{} carries {} unexpected field(s)",
                spec.name,
                args.len()
            )));
        }
        ArgShape::SingleString if args.len() != 1 => {
            args = vec![args.join(",")];
        }
        _ => {}
    }

    Ok((spec.name.clone(), args))
}

/// Accumulates received bytes and yields complete frame bodies.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete frame body, if one has been received.
    ///
    /// A body that grows past [`MAX_FRAME_LEN`] without a terminator is
    /// dropped and reported as malformed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut escaped = false;
        let mut end = None;
        for (i, &b) in self.buffer.iter().enumerate() {
            if escaped {
                escaped = false;
            } else if b == ESCAPE {
                escaped = true;
            } else if b == COMMAND_TERMINATOR {
                end = Some(i);
                break;
            }
        }

        match end {
            Some(i) => {
                let mut body: Vec<u8> = self.buffer.drain(..=i).collect();
                body.pop();
                Ok(Some(body))
            }
            None if self.buffer.len() > MAX_FRAME_LEN => {
                let len = self.buffer.len();
                self.buffer.clear();
                Err(DriverError::MalformedFrame(format!(
                    "no terminator in {len} bytes"
                )))
            }
            None => Ok(None),
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

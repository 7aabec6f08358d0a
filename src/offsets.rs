//! Calibration offset strings.
//!
//! The device trims five channels by fixed offsets. On the wire the offsets
//! travel as one fixed-width string: per channel a one-letter tag followed by
//! a zero-padded signed numeral, e.g. `t-1.4b0000p0000h000000e000000`.
//!
//! The host sends offsets in [`OffsetLayout::COMMAND`] order. The firmware
//! reports what it has stored in its own order, [`OffsetLayout::REPORT`].

use std::str::FromStr;

use crate::errors::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Temperature,
    Pressure,
    Pm25,
    Humidity,
    Eco2,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Pressure => "pressure",
            Channel::Pm25 => "pm25",
            Channel::Humidity => "humidity",
            Channel::Eco2 => "eco2",
        }
    }

    fn is_integer(self) -> bool {
        matches!(self, Channel::Pm25 | Channel::Humidity | Channel::Eco2)
    }
}

/// One tagged, fixed-width channel field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetField {
    pub tag: u8,
    pub channel: Channel,
    pub width: usize,
}

const fn field(tag: u8, channel: Channel, width: usize) -> OffsetField {
    OffsetField {
        tag,
        channel,
        width,
    }
}

/// Channel order and field widths of an offset string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetLayout {
    fields: [OffsetField; 5],
}

impl OffsetLayout {
    /// Layout accepted by the `set_offsets` command.
    pub const COMMAND: OffsetLayout = OffsetLayout {
        fields: [
            field(b't', Channel::Temperature, 4),
            field(b'b', Channel::Pressure, 4),
            field(b'p', Channel::Pm25, 4),
            field(b'h', Channel::Humidity, 6),
            field(b'e', Channel::Eco2, 6),
        ],
    };

    /// Layout of the `offsets` key in the device's JSON report.
    pub const REPORT: OffsetLayout = OffsetLayout {
        fields: [
            field(b't', Channel::Temperature, 4),
            field(b'h', Channel::Humidity, 4),
            field(b'p', Channel::Pm25, 4),
            field(b'b', Channel::Pressure, 6),
            field(b'e', Channel::Eco2, 6),
        ],
    };

    pub fn fields(&self) -> &[OffsetField] {
        &self.fields
    }

    /// Total length: every field's width plus its tag.
    pub fn encoded_len(&self) -> usize {
        self.fields.iter().map(|f| f.width + 1).sum()
    }

    pub fn encode(&self, record: &OffsetRecord) -> Result<String> {
        let mut out = String::with_capacity(self.encoded_len());
        for f in &self.fields {
            let text = record.numeral(f.channel);
            out.push(f.tag as char);
            out.push_str(&pad(&text, f.width).ok_or_else(|| {
                DriverError::OffsetOutOfRange {
                    channel: f.channel.name(),
                    value: text.clone(),
                }
            })?);
        }
        Ok(out)
    }

    pub fn decode(&self, input: &str) -> Result<OffsetRecord> {
        let expected = self.encoded_len();
        if !input.is_ascii() || input.len() != expected {
            return Err(DriverError::MalformedOffsetString(format!(
                "expected {} ASCII characters, got {:?}",
                expected, input
            )));
        }

        let bytes = input.as_bytes();
        let mut record = OffsetRecord::default();
        let mut pos = 0;
        for f in &self.fields {
            if bytes[pos] != f.tag {
                return Err(DriverError::MalformedOffsetString(format!(
                    "expected tag '{}' at {}, found '{}'",
                    f.tag as char, pos, bytes[pos] as char
                )));
            }
            let numeral = &input[pos + 1..pos + 1 + f.width];
            let value = parse_numeral(numeral).ok_or_else(|| {
                DriverError::MalformedOffsetString(format!(
                    "bad {} numeral {:?}",
                    f.channel.name(),
                    numeral
                ))
            })?;
            record.set(f.channel, value)?;
            pos += f.width + 1;
        }
        Ok(record)
    }
}

/// Per-channel calibration offsets applied on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OffsetRecord {
    pub temperature: f64,
    pub pressure: f64,
    pub pm25: i32,
    pub humidity: i32,
    pub eco2: i32,
}

impl OffsetRecord {
    /// Encode in the `set_offsets` command layout.
    pub fn encode(&self) -> Result<String> {
        OffsetLayout::COMMAND.encode(self)
    }

    /// Decode the `set_offsets` command layout.
    pub fn decode(input: &str) -> Result<Self> {
        OffsetLayout::COMMAND.decode(input)
    }

    fn numeral(&self, channel: Channel) -> String {
        match channel {
            Channel::Temperature => float_numeral(self.temperature),
            Channel::Pressure => float_numeral(self.pressure),
            Channel::Pm25 => self.pm25.to_string(),
            Channel::Humidity => self.humidity.to_string(),
            Channel::Eco2 => self.eco2.to_string(),
        }
    }

    fn set(&mut self, channel: Channel, value: f64) -> Result<()> {
        if channel.is_integer() {
            if value.fract() != 0.0 || value.abs() > i32::MAX as f64 {
                return Err(DriverError::MalformedOffsetString(format!(
                    "{} offset must be a whole number, got {}",
                    channel.name(),
                    value
                )));
            }
        }
        match channel {
            Channel::Temperature => self.temperature = value,
            Channel::Pressure => self.pressure = value,
            Channel::Pm25 => self.pm25 = value as i32,
            Channel::Humidity => self.humidity = value as i32,
            Channel::Eco2 => self.eco2 = value as i32,
        }
        Ok(())
    }
}

impl FromStr for OffsetRecord {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

fn float_numeral(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Left-pad with zeros after any sign. `None` if the text cannot fit.
fn pad(text: &str, width: usize) -> Option<String> {
    if text.len() > width || text.parse::<f64>().map_or(true, |v| !v.is_finite()) {
        return None;
    }
    let zeros = "0".repeat(width - text.len());
    Some(match text.strip_prefix('-') {
        Some(digits) => format!("-{zeros}{digits}"),
        None => format!("{zeros}{text}"),
    })
}

/// Accept `[+-]digits[.digits]` only; no exponents, no `inf`/`nan`.
fn parse_numeral(text: &str) -> Option<f64> {
    let unsigned = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);
    let mut digits = 0;
    let mut dots = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }
    text.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reference_string() {
        let record = OffsetRecord {
            temperature: -1.4,
            ..Default::default()
        };
        assert_eq!(record.encode().unwrap(), "t-1.4b0000p0000h000000e000000");
    }

    #[test]
    fn decodes_reference_string() {
        let record: OffsetRecord = "t-1.4b0000p0000h000000e000000".parse().unwrap();
        assert_eq!(
            record,
            OffsetRecord {
                temperature: -1.4,
                pressure: 0.0,
                pm25: 0,
                humidity: 0,
                eco2: 0,
            }
        );
    }

    #[test]
    fn length_is_sum_of_widths_and_tags() {
        assert_eq!(OffsetLayout::COMMAND.encoded_len(), 29);
        assert_eq!(OffsetLayout::REPORT.encoded_len(), 29);
    }

    #[test]
    fn round_trips_values_within_widths() {
        let records = [
            OffsetRecord {
                temperature: 2.5,
                pressure: -12.0,
                pm25: 15,
                humidity: -3,
                eco2: 40000,
            },
            OffsetRecord {
                temperature: -9.0,
                pressure: 1.25,
                pm25: -999,
                humidity: 99999,
                eco2: -5,
            },
        ];
        for record in records {
            let encoded = record.encode().unwrap();
            assert_eq!(encoded.len(), 29);
            assert_eq!(OffsetRecord::decode(&encoded).unwrap(), record);
        }
    }

    #[test]
    fn negative_integers_pad_after_sign() {
        let record = OffsetRecord {
            humidity: -3,
            ..Default::default()
        };
        assert_eq!(record.encode().unwrap(), "t0000b0000p0000h-00003e000000");
    }

    #[test]
    fn oversize_values_are_rejected() {
        let record = OffsetRecord {
            pm25: 12345,
            ..Default::default()
        };
        assert!(matches!(
            record.encode(),
            Err(DriverError::OffsetOutOfRange { channel: "pm25", .. })
        ));

        let record = OffsetRecord {
            temperature: -1.25,
            ..Default::default()
        };
        assert!(record.encode().is_err());

        let record = OffsetRecord {
            pressure: f64::NAN,
            ..Default::default()
        };
        assert!(record.encode().is_err());
    }

    #[test]
    fn wrong_length_is_malformed() {
        for input in ["", "t-1.4b0000p0000h000000e00000", "t-1.4b0000p0000h000000e0000000"] {
            assert!(matches!(
                OffsetRecord::decode(input),
                Err(DriverError::MalformedOffsetString(_))
            ));
        }
    }

    #[test]
    fn wrong_tag_or_numeral_is_malformed() {
        let bad = [
            "x-1.4b0000p0000h000000e000000",
            "t-1.4p0000b0000h000000e000000",
            "t1e-1b0000p0000h000000e000000",
            "tnanab0000p0000h000000e000000",
            "t-1.4b0000p00.5h000000e000000",
            "t----b0000p0000h000000e000000",
        ];
        for input in bad {
            assert!(
                matches!(
                    OffsetRecord::decode(input),
                    Err(DriverError::MalformedOffsetString(_))
                ),
                "accepted {input}"
            );
        }
    }

    #[test]
    fn decodes_firmware_report_layout() {
        let record = OffsetLayout::REPORT
            .decode("t-1.4h0.00p0.00b0.0000e0.0000")
            .unwrap();
        assert_eq!(record.temperature, -1.4);
        assert_eq!(record.humidity, 0);
        assert_eq!(record.pressure, 0.0);

        let same = OffsetRecord::decode("t-1.4b0000p0000h000000e000000").unwrap();
        assert_eq!(record, same);
    }
}

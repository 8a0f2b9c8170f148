//! Typed payload codec
//!
//! A [`Payload`] is written as its one byte [`DataType`] tag followed by the
//! type's wire bytes. All multi-byte values are big-endian.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DataType;

/// Longest string a String128 field can carry, leaving room for the NUL
pub const STRING_MAX_LEN: usize = 127;

/// Size of a String128 field on the wire
pub const STRING_FIELD_LEN: usize = 128;

/// Payload errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("Unknown data type: {0:#04x}")]
    UnknownDataType(u8),

    #[error("Bool can only be 0x00 or 0x01, got {0:#04x}")]
    InvalidBoolEncoding(u8),

    #[error("String of {0} bytes exceeds the 127 byte limit")]
    StringTooLong(usize),

    #[error("String field is not NUL terminated")]
    StringNotTerminated,

    #[error("Raw byte payloads must be 16 or 65 bytes long, got {0}")]
    ByteLengthInvalid(usize),

    #[error("No payload encoding for data type {0}")]
    UnsupportedPayloadType(DataType),

    #[error("{dtype} payload must be {expected} bytes, got {actual}")]
    InvalidLength {
        dtype: DataType,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot parse {value:?} as {dtype}")]
    InvalidValue { dtype: DataType, value: String },
}

pub type PayloadResult<T> = Result<T, PayloadError>;

/// Calendar date and wall clock time as kept by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub day: u8,
    pub month: u8,
    pub year: u16,
    /// 0 = Sunday
    pub day_of_week: u8,
}

impl DateTime {
    /// Build a DateTime, deriving the day of week from the date
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            day,
            month,
            year,
            day_of_week: day_of_week(year, month, day),
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

// Sakamoto's method, valid for the Gregorian calendar.
fn day_of_week(year: u16, month: u8, day: u8) -> u8 {
    const OFFSETS: [u32; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let month = month.clamp(1, 12);
    let mut y = year as u32;
    if month < 3 {
        y = y.saturating_sub(1);
    }
    let dow = (y + y / 4 - y / 100 + y / 400 + OFFSETS[month as usize - 1] + day as u32) % 7;
    dow as u8
}

/// Seconds since the device booted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub total_seconds: u32,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.total_seconds)
    }
}

/// A value carried by Info and Write packets.
///
/// The variants map one to one onto the data types that have an encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bool(bool),
    UInt8(u8),
    UInt32(u32),
    DateTime(DateTime),
    Float32(f32),
    String128(String),
    Timestamp(Timestamp),
    Bytes65([u8; 65]),
    Bytes16([u8; 16]),
}

impl Payload {
    pub fn data_type(&self) -> DataType {
        match self {
            Payload::Bool(_) => DataType::Bool,
            Payload::UInt8(_) => DataType::UInt8,
            Payload::UInt32(_) => DataType::UInt32,
            Payload::DateTime(_) => DataType::DateTime,
            Payload::Float32(_) => DataType::Float32,
            Payload::String128(_) => DataType::String128,
            Payload::Timestamp(_) => DataType::Timestamp,
            Payload::Bytes65(_) => DataType::Bytes65,
            Payload::Bytes16(_) => DataType::Bytes16,
        }
    }

    /// Wrap raw bytes, choosing Bytes16 or Bytes65 by length
    pub fn bytes(data: &[u8]) -> PayloadResult<Self> {
        if let Ok(array) = <[u8; 16]>::try_from(data) {
            Ok(Payload::Bytes16(array))
        } else if let Ok(array) = <[u8; 65]>::try_from(data) {
            Ok(Payload::Bytes65(array))
        } else {
            Err(PayloadError::ByteLengthInvalid(data.len()))
        }
    }

    /// The all-zero value of a data type
    pub fn zero(dtype: DataType) -> PayloadResult<Self> {
        Ok(match dtype {
            DataType::Undefined => return Err(PayloadError::UnsupportedPayloadType(dtype)),
            DataType::Bool => Payload::Bool(false),
            DataType::UInt8 => Payload::UInt8(0),
            DataType::UInt32 => Payload::UInt32(0),
            DataType::DateTime => Payload::DateTime(DateTime::new(2000, 1, 1, 0, 0, 0)),
            DataType::Float32 => Payload::Float32(0.0),
            DataType::String128 => Payload::String128(String::new()),
            DataType::Timestamp => Payload::Timestamp(Timestamp { total_seconds: 0 }),
            DataType::Bytes65 => Payload::Bytes65([0; 65]),
            DataType::Bytes16 => Payload::Bytes16([0; 16]),
        })
    }

    /// Parse a textual value into a payload of the given type.
    ///
    /// DateTime expects `YYYY-MM-DD HH:MM:SS`, raw byte types expect hex.
    pub fn parse(dtype: DataType, value: &str) -> PayloadResult<Self> {
        let invalid = || PayloadError::InvalidValue {
            dtype,
            value: value.to_string(),
        };
        let trimmed = value.trim();

        match dtype {
            DataType::Undefined => Err(PayloadError::UnsupportedPayloadType(dtype)),
            DataType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Ok(Payload::Bool(true)),
                "0" | "false" | "off" => Ok(Payload::Bool(false)),
                _ => Err(invalid()),
            },
            DataType::UInt8 => trimmed.parse().map(Payload::UInt8).map_err(|_| invalid()),
            DataType::UInt32 => trimmed.parse().map(Payload::UInt32).map_err(|_| invalid()),
            DataType::Float32 => trimmed.parse().map(Payload::Float32).map_err(|_| invalid()),
            DataType::Timestamp => trimmed
                .parse()
                .map(|total_seconds| Payload::Timestamp(Timestamp { total_seconds }))
                .map_err(|_| invalid()),
            DataType::DateTime => parse_date_time(trimmed)
                .map(Payload::DateTime)
                .ok_or_else(invalid),
            DataType::String128 => {
                if value.len() > STRING_MAX_LEN {
                    return Err(PayloadError::StringTooLong(value.len()));
                }
                Ok(Payload::String128(value.to_string()))
            }
            DataType::Bytes16 | DataType::Bytes65 => {
                let data = hex::decode(trimmed).map_err(|_| invalid())?;
                let payload = Payload::bytes(&data)?;
                if payload.data_type() != dtype {
                    return Err(PayloadError::ByteLengthInvalid(data.len()));
                }
                Ok(payload)
            }
        }
    }

    /// Write the data type tag followed by the value
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> PayloadResult<()> {
        // A failed encode writes nothing.
        self.validate()?;
        buf.put_u8(self.data_type() as u8);
        self.encode_value(buf)
    }

    /// Write only the value bytes, without the tag
    pub fn encode_value<B: BufMut>(&self, buf: &mut B) -> PayloadResult<()> {
        self.validate()?;

        match self {
            Payload::Bool(v) => buf.put_u8(u8::from(*v)),
            Payload::UInt8(v) => buf.put_u8(*v),
            Payload::UInt32(v) => buf.put_u32(*v),
            Payload::DateTime(dt) => {
                buf.put_u8(dt.hour);
                buf.put_u8(dt.minute);
                buf.put_u8(dt.second);
                buf.put_u8(dt.day);
                buf.put_u8(dt.month);
                buf.put_u16(dt.year);
                buf.put_u8(dt.day_of_week);
            }
            Payload::Float32(v) => buf.put_f32(*v),
            Payload::String128(s) => {
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, STRING_FIELD_LEN - s.len());
            }
            Payload::Timestamp(ts) => buf.put_u32(ts.total_seconds),
            Payload::Bytes65(data) => buf.put_slice(data),
            Payload::Bytes16(data) => buf.put_slice(data),
        }

        Ok(())
    }

    fn validate(&self) -> PayloadResult<()> {
        match self {
            Payload::String128(s) if s.len() > STRING_MAX_LEN => {
                Err(PayloadError::StringTooLong(s.len()))
            }
            _ => Ok(()),
        }
    }

    /// Decode value bytes for the given tag byte
    pub fn decode(bytes: &[u8], tag: u8) -> PayloadResult<Self> {
        let dtype = DataType::try_from(tag).map_err(PayloadError::UnknownDataType)?;
        Self::decode_as(bytes, dtype)
    }

    /// Decode value bytes as the given data type.
    ///
    /// `bytes` must hold exactly the type's wire size.
    pub fn decode_as(bytes: &[u8], dtype: DataType) -> PayloadResult<Self> {
        let expected = dtype
            .wire_size()
            .ok_or(PayloadError::UnsupportedPayloadType(dtype))?;

        if bytes.len() != expected {
            return Err(match dtype {
                DataType::Bytes16 | DataType::Bytes65 => {
                    PayloadError::ByteLengthInvalid(bytes.len())
                }
                _ => PayloadError::InvalidLength {
                    dtype,
                    expected,
                    actual: bytes.len(),
                },
            });
        }

        let mut buf = bytes;
        let payload = match dtype {
            DataType::Undefined => return Err(PayloadError::UnsupportedPayloadType(dtype)),
            DataType::Bool => match buf.get_u8() {
                0x00 => Payload::Bool(false),
                0x01 => Payload::Bool(true),
                other => return Err(PayloadError::InvalidBoolEncoding(other)),
            },
            DataType::UInt8 => Payload::UInt8(buf.get_u8()),
            DataType::UInt32 => Payload::UInt32(buf.get_u32()),
            DataType::DateTime => Payload::DateTime(DateTime {
                hour: buf.get_u8(),
                minute: buf.get_u8(),
                second: buf.get_u8(),
                day: buf.get_u8(),
                month: buf.get_u8(),
                year: buf.get_u16(),
                day_of_week: buf.get_u8(),
            }),
            DataType::Float32 => Payload::Float32(buf.get_f32()),
            DataType::String128 => Payload::String128(decode_string128(bytes)?),
            DataType::Timestamp => Payload::Timestamp(Timestamp {
                total_seconds: buf.get_u32(),
            }),
            DataType::Bytes65 => Payload::Bytes65(to_array(bytes)?),
            DataType::Bytes16 => Payload::Bytes16(to_array(bytes)?),
        };

        Ok(payload)
    }
}

/// Read a String128 field: exactly 128 bytes, text up to the first NUL
pub(crate) fn decode_string128(bytes: &[u8]) -> PayloadResult<String> {
    if bytes.len() != STRING_FIELD_LEN {
        return Err(PayloadError::InvalidLength {
            dtype: DataType::String128,
            expected: STRING_FIELD_LEN,
            actual: bytes.len(),
        });
    }

    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(PayloadError::StringNotTerminated)?;
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

fn to_array<const N: usize>(bytes: &[u8]) -> PayloadResult<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| PayloadError::ByteLengthInvalid(bytes.len()))
}

fn parse_date_time(value: &str) -> Option<DateTime> {
    let (date, time) = value.split_once(|c: char| c == ' ' || c == 'T')?;

    let mut date = date.splitn(3, '-');
    let year = date.next()?.parse().ok()?;
    let month: u8 = date.next()?.parse().ok()?;
    let day: u8 = date.next()?.parse().ok()?;

    let mut time = time.splitn(3, ':');
    let hour: u8 = time.next()?.parse().ok()?;
    let minute: u8 = time.next()?.parse().ok()?;
    let second: u8 = time.next()?.parse().ok()?;

    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return None;
    }

    Some(DateTime::new(year, month, day, hour, minute, second))
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bool(v) => write!(f, "{}", v),
            Payload::UInt8(v) => write!(f, "{}", v),
            Payload::UInt32(v) => write!(f, "{}", v),
            Payload::DateTime(dt) => write!(f, "{}", dt),
            Payload::Float32(v) => write!(f, "{}", v),
            Payload::String128(s) => write!(f, "{}", s),
            Payload::Timestamp(ts) => write!(f, "{}", ts),
            Payload::Bytes65(data) => write!(f, "{}", hex::encode(data)),
            Payload::Bytes16(data) => write!(f, "{}", hex::encode(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(payload: Payload) {
        let mut buf = BytesMut::new();
        payload.encode(&mut buf).unwrap();

        assert_eq!(buf[0], payload.data_type() as u8);
        assert_eq!(Some(buf.len() - 1), payload.data_type().wire_size());

        let decoded = Payload::decode(&buf[1..], buf[0]).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_roundtrip_boundaries() {
        roundtrip(Payload::Bool(true));
        roundtrip(Payload::Bool(false));
        roundtrip(Payload::UInt8(0));
        roundtrip(Payload::UInt8(u8::MAX));
        roundtrip(Payload::UInt32(0));
        roundtrip(Payload::UInt32(0xFFFF_FFFF));
        roundtrip(Payload::Float32(10.10293));
        roundtrip(Payload::Float32(f32::MIN));
        roundtrip(Payload::Float32(f32::MAX));
        roundtrip(Payload::DateTime(DateTime::new(2014, 3, 6, 17, 2, 15)));
        roundtrip(Payload::DateTime(DateTime {
            hour: 0,
            minute: 0,
            second: 0,
            day: 0,
            month: 0,
            year: 0,
            day_of_week: 0,
        }));
        roundtrip(Payload::DateTime(DateTime {
            hour: u8::MAX,
            minute: u8::MAX,
            second: u8::MAX,
            day: u8::MAX,
            month: u8::MAX,
            year: 0xFFFF,
            day_of_week: u8::MAX,
        }));
        roundtrip(Payload::Timestamp(Timestamp { total_seconds: 0 }));
        roundtrip(Payload::Timestamp(Timestamp { total_seconds: 899992 }));
        roundtrip(Payload::Timestamp(Timestamp {
            total_seconds: u32::MAX,
        }));
        roundtrip(Payload::String128(String::new()));
        roundtrip(Payload::String128("x".repeat(STRING_MAX_LEN)));
        roundtrip(Payload::Bytes16([0x00; 16]));
        roundtrip(Payload::Bytes16([0xFF; 16]));
        roundtrip(Payload::Bytes65([0x00; 65]));
        roundtrip(Payload::Bytes65([0xFF; 65]));
    }

    #[test]
    fn test_date_time_is_eight_bytes() {
        let mut buf = BytesMut::new();
        let dt = DateTime::new(2014, 3, 6, 17, 2, 15);
        Payload::DateTime(dt).encode_value(&mut buf).unwrap();

        assert_eq!(buf.len(), 8);
        assert_eq!(
            Payload::decode(&buf, DataType::DateTime as u8),
            Ok(Payload::DateTime(dt))
        );
        assert!(matches!(
            Payload::decode(&buf[..7], DataType::DateTime as u8),
            Err(PayloadError::InvalidLength { expected: 8, actual: 7, .. })
        ));
    }

    #[test]
    fn test_wire_layout() {
        let mut buf = BytesMut::new();
        Payload::UInt32(0x0102_0304).encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x03, 0x01, 0x02, 0x03, 0x04]);

        let mut buf = BytesMut::new();
        Payload::DateTime(DateTime::new(2014, 3, 6, 17, 2, 15))
            .encode(&mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x04, 17, 2, 15, 6, 3, 0x07, 0xDE, 4]);

        let mut buf = BytesMut::new();
        Payload::String128("hi".into()).encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 1 + STRING_FIELD_LEN);
        assert_eq!(&buf[..4], &[0x06, b'h', b'i', 0x00]);
        assert!(buf[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_string_too_long() {
        let mut buf = BytesMut::new();
        let err = Payload::String128("x".repeat(128)).encode(&mut buf).unwrap_err();
        assert_eq!(err, PayloadError::StringTooLong(128));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_string_decode_errors() {
        assert_eq!(
            Payload::decode(&[b'a'; 128], DataType::String128 as u8),
            Err(PayloadError::StringNotTerminated)
        );
        assert!(matches!(
            Payload::decode(&[0; 127], DataType::String128 as u8),
            Err(PayloadError::InvalidLength { expected: 128, actual: 127, .. })
        ));
    }

    #[test]
    fn test_invalid_bool() {
        assert_eq!(
            Payload::decode(&[0x02], DataType::Bool as u8),
            Err(PayloadError::InvalidBoolEncoding(0x02))
        );
    }

    #[test]
    fn test_byte_lengths() {
        assert_eq!(Payload::bytes(&[0; 15]), Err(PayloadError::ByteLengthInvalid(15)));
        assert_eq!(Payload::bytes(&[0; 66]), Err(PayloadError::ByteLengthInvalid(66)));
        assert_eq!(
            Payload::decode(&[0; 17], DataType::Bytes16 as u8),
            Err(PayloadError::ByteLengthInvalid(17))
        );
        assert_eq!(
            Payload::decode(&[0; 16], DataType::Bytes65 as u8),
            Err(PayloadError::ByteLengthInvalid(16))
        );
    }

    #[test]
    fn test_unknown_and_undefined_tags() {
        assert_eq!(Payload::decode(&[0], 0x0a), Err(PayloadError::UnknownDataType(0x0a)));
        assert_eq!(
            Payload::decode(&[], DataType::Undefined as u8),
            Err(PayloadError::UnsupportedPayloadType(DataType::Undefined))
        );
    }

    #[test]
    fn test_scalar_length_checked() {
        assert!(matches!(
            Payload::decode(&[0, 1, 2], DataType::UInt32 as u8),
            Err(PayloadError::InvalidLength { expected: 4, actual: 3, .. })
        ));
        assert!(Payload::decode(&[], DataType::Bool as u8).is_err());
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(Payload::parse(DataType::Bool, "on"), Ok(Payload::Bool(true)));
        assert_eq!(Payload::parse(DataType::Bool, "0"), Ok(Payload::Bool(false)));
        assert_eq!(Payload::parse(DataType::UInt8, "109"), Ok(Payload::UInt8(109)));
        assert_eq!(Payload::parse(DataType::Float32, "1.5"), Ok(Payload::Float32(1.5)));
        assert_eq!(
            Payload::parse(DataType::DateTime, "2014-03-06 17:02:15"),
            Ok(Payload::DateTime(DateTime {
                hour: 17,
                minute: 2,
                second: 15,
                day: 6,
                month: 3,
                year: 2014,
                day_of_week: 4,
            }))
        );
        assert_eq!(
            Payload::parse(DataType::Bytes16, &"ab".repeat(16)),
            Ok(Payload::Bytes16([0xAB; 16]))
        );
        assert!(matches!(
            Payload::parse(DataType::UInt8, "256"),
            Err(PayloadError::InvalidValue { .. })
        ));
        assert_eq!(
            Payload::parse(DataType::Bytes65, &"00".repeat(16)),
            Err(PayloadError::ByteLengthInvalid(16))
        );
    }

    #[test]
    fn test_zero_values_encode() {
        for dtype in DataType::ALL {
            match Payload::zero(dtype) {
                Ok(payload) => assert_eq!(payload.data_type(), dtype),
                Err(err) => {
                    assert_eq!(dtype, DataType::Undefined);
                    assert_eq!(err, PayloadError::UnsupportedPayloadType(dtype));
                }
            }
        }
    }
}

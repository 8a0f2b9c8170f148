//! Protocol message definitions
//!
//! Defines the six Hexabus packet shapes and the byte-valued enumerations
//! (packet kind, data type, error code) they are built from.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Payload, FLAG_NONE};

/// Packet kind byte at offset 4.
///
/// `EndpointInfo` and `EndpointQuery` share the wire byte `0x09`. Which one a
/// packet is depends on the direction it travels: a client only ever sends
/// EndpointQuery and only ever receives EndpointInfo. There is therefore no
/// generic "decode by kind" entry point; each shape has its own decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Error,
    Info,
    Query,
    Write,
    EndpointInfo,
    EndpointQuery,
}

impl PacketKind {
    /// Byte written at offset 4
    pub fn wire_byte(self) -> u8 {
        match self {
            PacketKind::Error => 0x00,
            PacketKind::Info => 0x01,
            PacketKind::Query => 0x02,
            PacketKind::Write => 0x04,
            PacketKind::EndpointInfo | PacketKind::EndpointQuery => 0x09,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Error => "Error",
            PacketKind::Info => "Info",
            PacketKind::Query => "Query",
            PacketKind::Write => "Write",
            PacketKind::EndpointInfo => "EndpointInfo",
            PacketKind::EndpointQuery => "EndpointQuery",
        }
    }
}

/// Classifies a byte as seen by a client, so `0x09` is `EndpointInfo`.
impl TryFrom<u8> for PacketKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(PacketKind::Error),
            0x01 => Ok(PacketKind::Info),
            0x02 => Ok(PacketKind::Query),
            0x04 => Ok(PacketKind::Write),
            0x09 => Ok(PacketKind::EndpointInfo),
            other => Err(other),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data type tag carried by Info, Write and EndpointInfo packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Undefined = 0x00,
    Bool = 0x01,
    UInt8 = 0x02,
    UInt32 = 0x03,
    DateTime = 0x04,
    Float32 = 0x05,
    String128 = 0x06,
    Timestamp = 0x07,
    Bytes65 = 0x08,
    Bytes16 = 0x09,
}

impl DataType {
    pub const ALL: [DataType; 10] = [
        DataType::Undefined,
        DataType::Bool,
        DataType::UInt8,
        DataType::UInt32,
        DataType::DateTime,
        DataType::Float32,
        DataType::String128,
        DataType::Timestamp,
        DataType::Bytes65,
        DataType::Bytes16,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataType::Undefined => "Undefined",
            DataType::Bool => "Bool",
            DataType::UInt8 => "UInt8",
            DataType::UInt32 => "UInt32",
            DataType::DateTime => "DateTime",
            DataType::Float32 => "Float32",
            DataType::String128 => "String128",
            DataType::Timestamp => "Timestamp",
            DataType::Bytes65 => "Bytes65",
            DataType::Bytes16 => "Bytes16",
        }
    }

    /// Number of payload bytes following the tag, `None` for `Undefined`
    pub fn wire_size(self) -> Option<usize> {
        match self {
            DataType::Undefined => None,
            DataType::Bool | DataType::UInt8 => Some(1),
            DataType::UInt32 | DataType::Float32 | DataType::Timestamp => Some(4),
            // hour, minute, second, day, month, year(2), day_of_week
            DataType::DateTime => Some(8),
            DataType::String128 => Some(128),
            DataType::Bytes65 => Some(65),
            DataType::Bytes16 => Some(16),
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        DataType::ALL
            .into_iter()
            .find(|dtype| *dtype as u8 == value)
            .ok_or(value)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error codes a device reports in an Error packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// Reserved, never sent by a device
    Success = 0x00,
    UnknownEid = 0x01,
    WriteOnReadOnly = 0x02,
    ChecksumFailed = 0x03,
    DataTypeMismatch = 0x04,
    InvalidValue = 0x05,
}

impl ErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "no error",
            ErrorCode::UnknownEid => "endpoint does not exist on the device",
            ErrorCode::WriteOnReadOnly => "write to a read-only endpoint",
            ErrorCode::ChecksumFailed => "device rejected the packet checksum",
            ErrorCode::DataTypeMismatch => "data type does not fit the endpoint",
            ErrorCode::InvalidValue => "value cannot be interpreted by the device",
        }
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(ErrorCode::Success),
            0x01 => Ok(ErrorCode::UnknownEid),
            0x02 => Ok(ErrorCode::WriteOnReadOnly),
            0x03 => Ok(ErrorCode::ChecksumFailed),
            0x04 => Ok(ErrorCode::DataTypeMismatch),
            0x05 => Ok(ErrorCode::InvalidValue),
            other => Err(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.description(), *self as u8)
    }
}

/// Error report from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPacket {
    pub flags: u8,
    pub error_code: u8,
}

impl ErrorPacket {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            flags: FLAG_NONE,
            error_code: code as u8,
        }
    }
}

/// Value of an endpoint, sent in reply to a Query or broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPacket {
    pub flags: u8,
    pub eid: u32,
    /// The data type byte is always the payload's own tag
    pub payload: Payload,
}

impl InfoPacket {
    pub fn new(eid: u32, payload: Payload) -> Self {
        Self {
            flags: FLAG_NONE,
            eid,
            payload,
        }
    }
}

/// Request for an endpoint's current value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPacket {
    pub flags: u8,
    pub eid: u32,
}

impl QueryPacket {
    pub fn new(eid: u32) -> Self {
        Self {
            flags: FLAG_NONE,
            eid,
        }
    }
}

/// Request to set an endpoint's value
#[derive(Debug, Clone, PartialEq)]
pub struct WritePacket {
    pub flags: u8,
    pub eid: u32,
    pub payload: Payload,
}

impl WritePacket {
    pub fn new(eid: u32, payload: Payload) -> Self {
        Self {
            flags: FLAG_NONE,
            eid,
            payload,
        }
    }
}

/// Endpoint metadata, the reply to an EndpointQuery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfoPacket {
    pub flags: u8,
    pub eid: u32,
    /// Raw type byte of the endpoint's value, kept even when it names no
    /// known [`DataType`]
    pub dtype: u8,
    /// Always carried as a String128 on the wire
    pub description: String,
}

impl EndpointInfoPacket {
    pub fn new(eid: u32, dtype: DataType, description: impl Into<String>) -> Self {
        Self {
            flags: FLAG_NONE,
            eid,
            dtype: dtype as u8,
            description: description.into(),
        }
    }

    /// The endpoint's type, or the raw byte when it is not a known type
    pub fn data_type(&self) -> Result<DataType, u8> {
        DataType::try_from(self.dtype)
    }
}

/// Request for an endpoint's type and description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointQueryPacket {
    pub flags: u8,
    pub eid: u32,
}

impl EndpointQueryPacket {
    pub fn new(eid: u32) -> Self {
        Self {
            flags: FLAG_NONE,
            eid,
        }
    }
}

/// All packet shapes of the protocol
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Error(ErrorPacket),
    Info(InfoPacket),
    Query(QueryPacket),
    Write(WritePacket),
    EndpointInfo(EndpointInfoPacket),
    EndpointQuery(EndpointQueryPacket),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Error(_) => PacketKind::Error,
            Packet::Info(_) => PacketKind::Info,
            Packet::Query(_) => PacketKind::Query,
            Packet::Write(_) => PacketKind::Write,
            Packet::EndpointInfo(_) => PacketKind::EndpointInfo,
            Packet::EndpointQuery(_) => PacketKind::EndpointQuery,
        }
    }

    /// Endpoint the packet refers to, `None` for Error packets
    pub fn eid(&self) -> Option<u32> {
        match self {
            Packet::Error(_) => None,
            Packet::Info(p) => Some(p.eid),
            Packet::Query(p) => Some(p.eid),
            Packet::Write(p) => Some(p.eid),
            Packet::EndpointInfo(p) => Some(p.eid),
            Packet::EndpointQuery(p) => Some(p.eid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_kinds_share_wire_byte() {
        assert_eq!(PacketKind::EndpointInfo.wire_byte(), 0x09);
        assert_eq!(PacketKind::EndpointQuery.wire_byte(), 0x09);
        assert_eq!(PacketKind::try_from(0x09), Ok(PacketKind::EndpointInfo));
    }

    #[test]
    fn test_unknown_bytes_rejected() {
        assert_eq!(PacketKind::try_from(0x03), Err(0x03));
        assert_eq!(DataType::try_from(0x0a), Err(0x0a));
        assert_eq!(ErrorCode::try_from(0x06), Err(0x06));
    }

    #[test]
    fn test_data_type_tags() {
        for dtype in DataType::ALL {
            assert_eq!(DataType::try_from(dtype as u8), Ok(dtype));
        }
        assert_eq!(DataType::Bytes65 as u8, 0x08);
        assert_eq!(DataType::Bytes16 as u8, 0x09);
    }

    #[test]
    fn test_packet_eid() {
        assert_eq!(Packet::Query(QueryPacket::new(7)).eid(), Some(7));
        assert_eq!(Packet::Error(ErrorPacket::new(ErrorCode::UnknownEid)).eid(), None);
    }
}

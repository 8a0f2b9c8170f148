//! Protocol codec for encoding/decoding packets
//!
//! Each packet shape has its own `encode`/`decode` pair. Decoding checks, in
//! order: minimum length, magic header, checksum, kind byte, then the fields.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::crc::{self, ChecksumMismatch, CHECKSUM_SIZE};
use super::{
    DataType, EndpointInfoPacket, EndpointQueryPacket, ErrorPacket, InfoPacket, Packet,
    PacketKind, Payload, PayloadError, QueryPacket, WritePacket, MAGIC_BYTES, STRING_FIELD_LEN,
};
use super::payload::decode_string128;

/// magic(4) + kind(1) + flags(1)
const HEADER_SIZE: usize = 6;

/// Offset of the packet kind byte
const KIND_OFFSET: usize = 4;

/// Error packets: header + error code + checksum
pub const ERROR_PACKET_LEN: usize = HEADER_SIZE + 1 + CHECKSUM_SIZE;

/// Query and EndpointQuery packets: header + eid + checksum
pub const QUERY_PACKET_LEN: usize = HEADER_SIZE + 4 + CHECKSUM_SIZE;

/// Shortest Info/Write/EndpointInfo packet: header + eid + dtype + checksum
pub const MIN_VALUE_PACKET_LEN: usize = HEADER_SIZE + 4 + 1 + CHECKSUM_SIZE;

/// EndpointInfo packets always carry a full String128
pub const ENDPOINT_INFO_PACKET_LEN: usize = MIN_VALUE_PACKET_LEN + STRING_FIELD_LEN;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Packet too short: {actual} bytes (need at least {expected})")]
    Truncated { expected: usize, actual: usize },

    #[error("{kind} packet must be {expected} bytes, got {actual}")]
    InvalidLength {
        kind: PacketKind,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed header: missing HX0C magic")]
    MalformedHeader,

    #[error(transparent)]
    ChecksumMismatch(#[from] ChecksumMismatch),

    #[error("Unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("Expected {expected} packet, got type byte {actual:#04x}")]
    UnexpectedKind { expected: PacketKind, actual: u8 },

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Determine the kind of a received packet from byte 4 alone.
///
/// `0x09` is reported as [`PacketKind::EndpointInfo`], the only packet with
/// that byte a client receives.
pub fn packet_kind(bytes: &[u8]) -> CodecResult<PacketKind> {
    let byte = *bytes.get(KIND_OFFSET).ok_or(CodecError::Truncated {
        expected: KIND_OFFSET + 1,
        actual: bytes.len(),
    })?;
    PacketKind::try_from(byte).map_err(CodecError::UnknownPacketType)
}

/// Check length, header and checksum of a received buffer
pub fn validate(bytes: &[u8]) -> CodecResult<()> {
    ensure_len(bytes, HEADER_SIZE + CHECKSUM_SIZE)?;
    check_header(bytes)?;
    crc::verify(bytes)?;
    Ok(())
}

fn ensure_len(bytes: &[u8], min_len: usize) -> CodecResult<()> {
    if bytes.len() < min_len {
        return Err(CodecError::Truncated {
            expected: min_len,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn check_header(bytes: &[u8]) -> CodecResult<()> {
    if bytes[..MAGIC_BYTES.len()] != MAGIC_BYTES {
        return Err(CodecError::MalformedHeader);
    }
    Ok(())
}

/// Validate a buffer as a packet of `kind` and return the bytes between the
/// kind byte and the checksum.
fn open(bytes: &[u8], kind: PacketKind, min_len: usize) -> CodecResult<&[u8]> {
    ensure_len(bytes, min_len)?;
    check_header(bytes)?;
    crc::verify(bytes)?;

    let actual = bytes[KIND_OFFSET];
    if actual != kind.wire_byte() {
        return Err(CodecError::UnexpectedKind {
            expected: kind,
            actual,
        });
    }

    Ok(&bytes[KIND_OFFSET + 1..bytes.len() - CHECKSUM_SIZE])
}

fn ensure_exact(bytes: &[u8], kind: PacketKind, expected: usize) -> CodecResult<()> {
    if bytes.len() != expected {
        return Err(CodecError::InvalidLength {
            kind,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn start(kind: PacketKind, flags: u8, capacity: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_slice(&MAGIC_BYTES);
    buf.put_u8(kind.wire_byte());
    buf.put_u8(flags);
    buf
}

fn finish(mut buf: BytesMut) -> Bytes {
    crc::append_checksum(&mut buf);
    buf.freeze()
}

fn encode_value_packet(
    kind: PacketKind,
    flags: u8,
    eid: u32,
    payload: &Payload,
) -> CodecResult<Bytes> {
    let mut buf = start(kind, flags, ENDPOINT_INFO_PACKET_LEN);
    buf.put_u32(eid);
    payload.encode(&mut buf)?;
    Ok(finish(buf))
}

/// flags, eid, tag and the payload bytes of an Info or Write body
fn decode_value_body(mut body: &[u8]) -> CodecResult<(u8, u32, Payload)> {
    let flags = body.get_u8();
    let eid = body.get_u32();
    let tag = body.get_u8();
    let payload = Payload::decode(body, tag)?;
    Ok((flags, eid, payload))
}

impl ErrorPacket {
    pub fn encode(&self) -> Bytes {
        let mut buf = start(PacketKind::Error, self.flags, ERROR_PACKET_LEN);
        buf.put_u8(self.error_code);
        finish(buf)
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut body = open(bytes, PacketKind::Error, ERROR_PACKET_LEN)?;
        ensure_exact(bytes, PacketKind::Error, ERROR_PACKET_LEN)?;

        Ok(Self {
            flags: body.get_u8(),
            error_code: body.get_u8(),
        })
    }
}

impl InfoPacket {
    pub fn encode(&self) -> CodecResult<Bytes> {
        encode_value_packet(PacketKind::Info, self.flags, self.eid, &self.payload)
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let body = open(bytes, PacketKind::Info, MIN_VALUE_PACKET_LEN)?;
        let (flags, eid, payload) = decode_value_body(body)?;
        Ok(Self {
            flags,
            eid,
            payload,
        })
    }

    pub fn data_type(&self) -> DataType {
        self.payload.data_type()
    }
}

impl QueryPacket {
    pub fn encode(&self) -> Bytes {
        let mut buf = start(PacketKind::Query, self.flags, QUERY_PACKET_LEN);
        buf.put_u32(self.eid);
        finish(buf)
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut body = open(bytes, PacketKind::Query, QUERY_PACKET_LEN)?;
        ensure_exact(bytes, PacketKind::Query, QUERY_PACKET_LEN)?;

        Ok(Self {
            flags: body.get_u8(),
            eid: body.get_u32(),
        })
    }
}

impl WritePacket {
    pub fn encode(&self) -> CodecResult<Bytes> {
        encode_value_packet(PacketKind::Write, self.flags, self.eid, &self.payload)
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let body = open(bytes, PacketKind::Write, MIN_VALUE_PACKET_LEN)?;
        let (flags, eid, payload) = decode_value_body(body)?;
        Ok(Self {
            flags,
            eid,
            payload,
        })
    }

    pub fn data_type(&self) -> DataType {
        self.payload.data_type()
    }
}

impl EndpointInfoPacket {
    pub fn encode(&self) -> CodecResult<Bytes> {
        let mut buf = start(PacketKind::EndpointInfo, self.flags, ENDPOINT_INFO_PACKET_LEN);
        buf.put_u32(self.eid);
        // The dtype slot carries the endpoint's type; the description follows untagged.
        buf.put_u8(self.dtype);
        Payload::String128(self.description.clone()).encode_value(&mut buf)?;
        Ok(finish(buf))
    }

    /// Decode an EndpointInfo reply.
    ///
    /// The description is always read as a String128, whatever the dtype byte,
    /// and the dtype byte is kept as received.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut body = open(bytes, PacketKind::EndpointInfo, MIN_VALUE_PACKET_LEN)?;
        let flags = body.get_u8();
        let eid = body.get_u32();
        let dtype = body.get_u8();

        let description = decode_string128(body)?;

        Ok(Self {
            flags,
            eid,
            dtype,
            description,
        })
    }
}

impl EndpointQueryPacket {
    pub fn encode(&self) -> Bytes {
        let mut buf = start(PacketKind::EndpointQuery, self.flags, QUERY_PACKET_LEN);
        buf.put_u32(self.eid);
        finish(buf)
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut body = open(bytes, PacketKind::EndpointQuery, QUERY_PACKET_LEN)?;
        ensure_exact(bytes, PacketKind::EndpointQuery, QUERY_PACKET_LEN)?;

        Ok(Self {
            flags: body.get_u8(),
            eid: body.get_u32(),
        })
    }
}

impl Packet {
    /// Encode any packet shape into a datagram
    pub fn encode(&self) -> CodecResult<Bytes> {
        match self {
            Packet::Error(p) => Ok(p.encode()),
            Packet::Info(p) => p.encode(),
            Packet::Query(p) => Ok(p.encode()),
            Packet::Write(p) => p.encode(),
            Packet::EndpointInfo(p) => p.encode(),
            Packet::EndpointQuery(p) => Ok(p.encode()),
        }
    }
}

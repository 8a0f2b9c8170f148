//! Protocol module - Defines the Hexabus wire format
//!
//! Every packet is a single UDP datagram:
//! - 4 bytes magic header ("HX0C")
//! - 1 byte packet kind
//! - 1 byte flags
//! - 4 bytes endpoint id (big-endian, all kinds except Error)
//! - 1 byte data type + payload (Info, Write, EndpointInfo)
//! - 2 bytes CRC16 over everything before it (big-endian)

pub mod crc;
mod message;
mod payload;
mod codec;

pub use message::*;
pub use payload::*;
pub use codec::*;

/// Default UDP port Hexabus devices listen on
pub const DEFAULT_PORT: u16 = 61616;

/// Magic bytes for protocol identification
pub const MAGIC_BYTES: [u8; 4] = [0x48, 0x58, 0x30, 0x43]; // "HX0C"

/// "No flag set", the only flag value the protocol defines
pub const FLAG_NONE: u8 = 0x00;

/// Largest datagram a device sends us: an EndpointInfo packet carrying a
/// 128 byte description is 141 bytes, the rest is headroom.
pub const MAX_PACKET_SIZE: usize = 152;

//! CRC16 checksum used by Hexabus packets
//!
//! The register starts at zero and is shifted right with the reflected
//! polynomial `0x8408` (CRC-16/KERMIT). Unlike classic Kermit the two result
//! bytes are not swapped; the value is written big-endian after the packet.

use bytes::BufMut;
use ::crc::{Crc, CRC_16_KERMIT};
use thiserror::Error;

const HEXABUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

/// Size of the checksum trailer in bytes
pub const CHECKSUM_SIZE: usize = 2;

/// Raised when a received trailer does not match the recomputed checksum
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
pub struct ChecksumMismatch {
    pub computed: u16,
    pub received: u16,
}

/// Compute the checksum over `bytes`
pub fn checksum(bytes: &[u8]) -> u16 {
    HEXABUS_CRC.checksum(bytes)
}

/// Append the big-endian checksum of everything currently in `buf`
pub fn append_checksum<B: BufMut + AsRef<[u8]>>(buf: &mut B) {
    let crc = checksum(buf.as_ref());
    buf.put_u16(crc);
}

/// Verify a buffer whose last two bytes are its checksum.
///
/// Buffers shorter than the trailer never verify.
pub fn verify(bytes: &[u8]) -> Result<(), ChecksumMismatch> {
    if bytes.len() < CHECKSUM_SIZE {
        return Err(ChecksumMismatch {
            computed: checksum(&[]),
            received: 0,
        });
    }

    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let computed = checksum(body);
    let received = u16::from_be_bytes([trailer[0], trailer[1]]);

    if computed == received {
        Ok(())
    } else {
        Err(ChecksumMismatch { computed, received })
    }
}

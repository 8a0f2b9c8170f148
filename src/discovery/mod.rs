//! Endpoint discovery
//!
//! Enumerates the endpoints of a device in two passes:
//! - a bitmask scan, querying the first EID of every block of 32 and reading
//!   the reply as a 32 bit availability mask,
//! - an EndpointQuery for each available EID to learn its type and description.
//!
//! All exchanges are sequential and nothing is retried.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::network::{Client, ClientError};
use crate::protocol::{DataType, ErrorCode, Payload};

/// Number of EIDs covered by one availability mask
pub const MASK_BLOCK_SIZE: u32 = 32;

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Availability scan of block {block} failed: {source}")]
    Scan {
        block: u32,
        #[source]
        source: ClientError,
    },

    #[error("Block {block} answered with a {dtype} value instead of a UInt32 mask")]
    UnexpectedMask { block: u32, dtype: DataType },

    #[error(
        "Discovery incomplete: {} endpoint(s) described, {} failed",
        .found.len(),
        .failures.len()
    )]
    Incomplete {
        /// Endpoints that were described successfully
        found: Directory,
        /// Available EIDs whose description could not be fetched
        failures: Vec<(u32, ClientError)>,
    },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// An endpoint found on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub eid: u32,
    /// Type byte of the endpoint's value as the device reported it
    pub dtype: u8,
    pub description: String,
    /// Only probed when enabled, otherwise `false`
    pub writable: bool,
}

impl Endpoint {
    /// The endpoint's type, or the raw byte when it is not a known type
    pub fn data_type(&self) -> Result<DataType, u8> {
        DataType::try_from(self.dtype)
    }
}

/// Endpoints of one device keyed by EID
pub type Directory = BTreeMap<u32, Endpoint>;

/// EIDs flagged in the mask returned for `block`.
///
/// The four mask bytes are read last to first, and each byte from its least
/// significant bit up, so bit `i` of the `j`th byte read is EID
/// `block + j * 8 + i`.
pub fn mask_eids(block: u32, mask: [u8; 4]) -> Vec<u32> {
    mask.iter()
        .rev()
        .enumerate()
        .flat_map(|(j, byte)| {
            (0..8u32)
                .filter(move |i| (*byte >> *i) & 1 == 1)
                .map(move |i| j as u32 * 8 + i)
        })
        .filter_map(|offset| block.checked_add(offset))
        .collect()
}

/// Discovers endpoints on a device through a [`Client`]
#[derive(Debug, Clone)]
pub struct Discovery {
    client: Client,
    probe_writability: bool,
}

impl Discovery {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            probe_writability: false,
        }
    }

    /// Probe each endpoint for writability with a trial write.
    ///
    /// The trial write sends the zero value of the endpoint's type and counts
    /// the endpoint as writable unless the device answers `WriteOnReadOnly`.
    /// This changes device state and the classification has not been
    /// confirmed against the protocol definition, so it is off by default.
    pub fn with_writability_probe(mut self, enabled: bool) -> Self {
        self.probe_writability = enabled;
        self
    }

    /// Availability of every EID in `[0, eid_count)`, rounded up to whole
    /// blocks of 32.
    pub async fn scan(&self, address: &str, eid_count: u32) -> DiscoveryResult<Vec<bool>> {
        let mut available = Vec::new();

        for block in (0..eid_count).step_by(MASK_BLOCK_SIZE as usize) {
            let info = self
                .client
                .query_info(address, block)
                .await
                .map_err(|source| DiscoveryError::Scan { block, source })?;

            let mask = match info.payload {
                Payload::UInt32(value) => value.to_be_bytes(),
                other => {
                    return Err(DiscoveryError::UnexpectedMask {
                        block,
                        dtype: other.data_type(),
                    })
                }
            };
            tracing::debug!("Block {} mask {}", block, hex::encode(mask));

            let mut bits = [false; MASK_BLOCK_SIZE as usize];
            for eid in mask_eids(block, mask) {
                bits[(eid - block) as usize] = true;
            }
            available.extend_from_slice(&bits);
        }

        Ok(available)
    }

    /// Build the endpoint directory of the device at `address`.
    ///
    /// A failed scan aborts. Failures describing single endpoints are
    /// collected and returned with the partial directory in
    /// [`DiscoveryError::Incomplete`].
    pub async fn discover(&self, address: &str, eid_count: u32) -> DiscoveryResult<Directory> {
        let available = self.scan(address, eid_count).await?;

        let mut found = Directory::new();
        let mut failures = Vec::new();

        let eids = available
            .iter()
            .enumerate()
            .filter(|(_, available)| **available)
            .map(|(eid, _)| eid as u32);

        for eid in eids {
            match self.describe(address, eid).await {
                Ok(endpoint) => {
                    tracing::debug!(
                        "Endpoint {}: {} (type {:#04x})",
                        eid,
                        endpoint.description,
                        endpoint.dtype
                    );
                    found.insert(eid, endpoint);
                }
                Err(e) => {
                    tracing::warn!("Failed to describe endpoint {} at {}: {}", eid, address, e);
                    failures.push((eid, e));
                }
            }
        }

        tracing::info!(
            "Discovered {} endpoint(s) at {} ({} failed)",
            found.len(),
            address,
            failures.len()
        );

        if failures.is_empty() {
            Ok(found)
        } else {
            Err(DiscoveryError::Incomplete { found, failures })
        }
    }

    async fn describe(&self, address: &str, eid: u32) -> Result<Endpoint, ClientError> {
        let info = self.client.endpoint_query(address, eid).await?;

        let writable = if self.probe_writability {
            self.probe_writable(address, eid, info.dtype).await
        } else {
            false
        };

        Ok(Endpoint {
            eid,
            dtype: info.dtype,
            description: info.description,
            writable,
        })
    }

    async fn probe_writable(&self, address: &str, eid: u32, dtype: u8) -> bool {
        let payload = match DataType::try_from(dtype).map(Payload::zero) {
            Ok(Ok(payload)) => payload,
            _ => return false,
        };

        match self.client.write(address, eid, payload).await {
            Err(ClientError::Remote(ErrorCode::WriteOnReadOnly)) => false,
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Writability probe of endpoint {} failed: {}", eid, e);
                true
            }
        }
    }
}

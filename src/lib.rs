//! Hexabus - client for the Hexabus device protocol
//!
//! Query, write and discover endpoints of Hexabus devices (relays, sensors,
//! power meters) over UDP.

pub mod config;
pub mod discovery;
pub mod network;
pub mod protocol;

pub use discovery::{Directory, Discovery, DiscoveryError, Endpoint};
pub use network::{Client, ClientError, NetworkConfig};
pub use protocol::{DataType, ErrorCode, Payload};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library version, for front ends that print it
pub fn version() -> &'static str {
    VERSION
}

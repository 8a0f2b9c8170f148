//! Hexabus Client
//!
//! Sends one request per UDP socket and waits for at most one reply. The
//! socket is dropped, and with it released, when the call returns.

use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::{resolve_host, NetworkConfig};
use crate::protocol::{
    self, CodecError, EndpointInfoPacket, EndpointQueryPacket, ErrorCode, ErrorPacket, InfoPacket,
    PacketKind, Payload, QueryPacket, WritePacket, MAX_PACKET_SIZE,
};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Request timed out")]
    Timeout,

    #[error("Device reported an error: {0}")]
    Remote(ErrorCode),

    #[error("Device reported unknown error code {0:#04x}")]
    UnknownRemoteError(u8),
}

impl From<protocol::PayloadError> for ClientError {
    fn from(err: protocol::PayloadError) -> Self {
        ClientError::Codec(CodecError::Payload(err))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Hexabus Client
#[derive(Debug, Clone, Default)]
pub struct Client {
    /// Client configuration
    config: NetworkConfig,
}

impl Client {
    /// Create a new client
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Query an endpoint and return the raw, validated reply.
    ///
    /// A reply is mandatory, so a receive timeout is an error.
    pub async fn query(&self, address: &str, eid: u32) -> ClientResult<Bytes> {
        tracing::debug!("Query eid {} at {}", eid, address);
        self.request(address, QueryPacket::new(eid).encode()).await
    }

    /// Query an endpoint and decode its Info reply
    pub async fn query_info(&self, address: &str, eid: u32) -> ClientResult<InfoPacket> {
        let reply = self.query(address, eid).await?;
        Ok(InfoPacket::decode(&reply)?)
    }

    /// Ask an endpoint for its data type and description
    pub async fn endpoint_query(
        &self,
        address: &str,
        eid: u32,
    ) -> ClientResult<EndpointInfoPacket> {
        tracing::debug!("Endpoint query eid {} at {}", eid, address);
        let reply = self
            .request(address, EndpointQueryPacket::new(eid).encode())
            .await?;
        Ok(EndpointInfoPacket::decode(&reply)?)
    }

    /// Write a value to an endpoint.
    ///
    /// Devices only answer writes when they fail, so a receive timeout is a
    /// success. An Error reply becomes [`ClientError::Remote`]; any other
    /// reply is accepted.
    pub async fn write(&self, address: &str, eid: u32, payload: Payload) -> ClientResult<()> {
        tracing::debug!(
            "Write eid {} at {}: {} ({})",
            eid,
            address,
            payload,
            payload.data_type()
        );
        let packet = WritePacket::new(eid, payload).encode()?;

        let socket = self.open(address).await?;
        self.send(&socket, &packet).await?;

        match self.recv(&socket).await? {
            None => {
                tracing::debug!("No reply to write of eid {}, assuming success", eid);
                Ok(())
            }
            Some(reply) => {
                let kind = check_reply(&reply)?;
                tracing::debug!("Write of eid {} answered with {} packet", eid, kind);
                Ok(())
            }
        }
    }

    /// Send `packet` and wait for the mandatory reply
    async fn request(&self, address: &str, packet: Bytes) -> ClientResult<Bytes> {
        let socket = self.open(address).await?;
        self.send(&socket, &packet).await?;

        let reply = self.recv(&socket).await?.ok_or(ClientError::Timeout)?;
        check_reply(&reply)?;
        Ok(reply)
    }

    /// Resolve, bind and connect a socket within the configured timeout
    async fn open(&self, address: &str) -> ClientResult<UdpSocket> {
        let dial = async {
            let remote = resolve_host(address, self.config.port).await?;
            let local = match self.config.bind_address {
                Some(ip) => SocketAddr::new(ip, 0),
                None if remote.is_ipv6() => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
                None => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            };

            let socket = UdpSocket::bind(local).await?;
            socket.connect(remote).await?;
            tracing::trace!("Socket {} connected to {}", local, remote);
            Ok::<_, std::io::Error>(socket)
        };

        match timeout(self.config.timeout(), dial).await {
            Ok(Ok(socket)) => Ok(socket),
            Ok(Err(e)) => Err(ClientError::Io(e)),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    async fn send(&self, socket: &UdpSocket, packet: &[u8]) -> ClientResult<()> {
        tracing::trace!("-> {}", hex::encode(packet));

        match timeout(self.config.timeout(), socket.send(packet)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ClientError::Io(e)),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Receive one datagram, `None` when the deadline passes first
    async fn recv(&self, socket: &UdpSocket) -> ClientResult<Option<Bytes>> {
        let mut buf = [0u8; MAX_PACKET_SIZE];

        match timeout(self.config.timeout(), socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                tracing::trace!("<- {}", hex::encode(&buf[..len]));
                Ok(Some(Bytes::copy_from_slice(&buf[..len])))
            }
            Ok(Err(e)) => Err(ClientError::Io(e)),
            Err(_) => Ok(None),
        }
    }
}

/// Validate a reply and turn an Error packet into [`ClientError::Remote`]
fn check_reply(reply: &[u8]) -> ClientResult<PacketKind> {
    protocol::validate(reply)?;
    let kind = protocol::packet_kind(reply)?;

    if kind == PacketKind::Error {
        let error = ErrorPacket::decode(reply)?;
        tracing::debug!("Device replied with error code {:#04x}", error.error_code);
        return Err(match ErrorCode::try_from(error.error_code) {
            Ok(code) => ClientError::Remote(code),
            Err(code) => ClientError::UnknownRemoteError(code),
        });
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::spawn_device;
    use crate::protocol::DataType;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn test_client() -> Client {
        Client::new(NetworkConfig::default().with_timeout(Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_query_returns_info() {
        let (addr, _device) = spawn_device(|request| {
            let query = QueryPacket::decode(request).ok()?;
            InfoPacket::new(query.eid, Payload::Float32(21.5)).encode().ok()
        })
        .await;

        let client = test_client();
        let raw = client.query(&addr.to_string(), 3).await.unwrap();
        assert_eq!(protocol::packet_kind(&raw).unwrap(), PacketKind::Info);

        let info = client.query_info(&addr.to_string(), 3).await.unwrap();
        assert_eq!(info.eid, 3);
        assert_eq!(info.payload, Payload::Float32(21.5));
    }

    #[tokio::test]
    async fn test_query_timeout_is_error() {
        let (addr, _device) = spawn_device(|_| None).await;

        let result = test_client().query(&addr.to_string(), 1).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn test_write_timeout_is_success() {
        let (addr, _device) = spawn_device(|_| None).await;

        let result = test_client()
            .write(&addr.to_string(), 1, Payload::Bool(true))
            .await;
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_write_sends_payload() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (addr, _device) = spawn_device(move |request| {
            let _ = tx.send(request.to_vec());
            None
        })
        .await;

        test_client()
            .write(&addr.to_string(), 1, Payload::Bool(true))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        let write = WritePacket::decode(&received).unwrap();
        assert_eq!(write.eid, 1);
        assert_eq!(write.payload, Payload::Bool(true));
    }

    #[tokio::test]
    async fn test_write_error_reply() {
        let (addr, _device) = spawn_device(|_| {
            Some(ErrorPacket::new(ErrorCode::WriteOnReadOnly).encode())
        })
        .await;

        let result = test_client()
            .write(&addr.to_string(), 2, Payload::UInt32(5))
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Remote(ErrorCode::WriteOnReadOnly))
        ));
    }

    #[tokio::test]
    async fn test_write_other_reply_accepted() {
        let (addr, _device) = spawn_device(|_| {
            InfoPacket::new(1, Payload::Bool(true)).encode().ok()
        })
        .await;

        let result = test_client()
            .write(&addr.to_string(), 1, Payload::Bool(true))
            .await;
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_write_corrupted_reply_rejected() {
        let (addr, _device) = spawn_device(|_| {
            let mut reply = ErrorPacket::new(ErrorCode::InvalidValue).encode().to_vec();
            reply[6] ^= 0x10;
            Some(Bytes::from(reply))
        })
        .await;

        let result = test_client()
            .write(&addr.to_string(), 1, Payload::Bool(true))
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Codec(CodecError::ChecksumMismatch(_)))
        ));
    }

    #[tokio::test]
    async fn test_write_rejects_long_string_before_sending() {
        let client = test_client();
        let result = client
            .write("127.0.0.1:9", 1, Payload::String128("x".repeat(200)))
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Codec(CodecError::Payload(_)))
        ));
    }

    #[tokio::test]
    async fn test_query_error_reply() {
        let (addr, _device) = spawn_device(|_| {
            Some(ErrorPacket::new(ErrorCode::UnknownEid).encode())
        })
        .await;

        let result = test_client().query(&addr.to_string(), 99).await;
        assert!(matches!(
            result,
            Err(ClientError::Remote(ErrorCode::UnknownEid))
        ));
    }

    #[tokio::test]
    async fn test_unknown_remote_error_code() {
        let (addr, _device) = spawn_device(|_| {
            Some(
                ErrorPacket {
                    flags: 0,
                    error_code: 0x42,
                }
                .encode(),
            )
        })
        .await;

        let result = test_client().query(&addr.to_string(), 1).await;
        assert!(matches!(result, Err(ClientError::UnknownRemoteError(0x42))));
    }

    #[tokio::test]
    async fn test_query_malformed_reply() {
        let (addr, _device) = spawn_device(|_| Some(Bytes::from_static(b"not a hexabus packet")))
            .await;

        let result = test_client().query(&addr.to_string(), 1).await;
        assert!(matches!(
            result,
            Err(ClientError::Codec(CodecError::MalformedHeader))
        ));
    }

    #[tokio::test]
    async fn test_endpoint_query() {
        let (addr, _device) = spawn_device(|request| {
            let query = EndpointQueryPacket::decode(request).ok()?;
            EndpointInfoPacket::new(query.eid, DataType::Bool, "Main switch")
                .encode()
                .ok()
        })
        .await;

        let info = test_client()
            .endpoint_query(&addr.to_string(), 1)
            .await
            .unwrap();
        assert_eq!(info.eid, 1);
        assert_eq!(info.data_type(), Ok(DataType::Bool));
        assert_eq!(info.description, "Main switch");
    }
}

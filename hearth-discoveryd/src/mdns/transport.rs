use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::mdns::record::{RecordBatch, RecordKind};
use crate::mdns::wire;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const MAX_PACKET_LEN: usize = 1500;

/// Speaks multicast DNS for the scanner: best-effort queries out, decoded
/// response batches fanned out to subscribers.
#[async_trait]
pub trait MdnsTransport: Send + Sync {
    /// Stream of response batches. Dropping the receiver detaches it.
    fn subscribe(&self) -> broadcast::Receiver<RecordBatch>;

    /// Send one multicast query. No response is awaited.
    async fn query(&self, name: &str, kind: RecordKind) -> Result<()>;
}

/// The production transport: one UDP socket joined to the mDNS group,
/// shared by every scan.
pub struct MulticastTransport {
    socket: UdpSocket,
    events: broadcast::Sender<RecordBatch>,
}

impl MulticastTransport {
    /// Join the mDNS multicast group on the default interface.
    pub fn bind() -> Result<Arc<Self>> {
        let socket = multicast_socket().context("Failed to set up multicast socket")?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self { socket, events }))
    }

    /// Receive loop: decode whatever arrives on the group and fan out the
    /// response batches. Runs until cancelled; per-packet errors only warn.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            "mDNS transport listening on {}:{}",
            wire::MDNS_GROUP,
            wire::MDNS_PORT
        );

        let mut buf = vec![0u8; MAX_PACKET_LEN];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("mDNS transport shutting down");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, _source)) => {
                            if let Some(batch) = wire::decode_response(&buf[..len]) {
                                let _ = self.events.send(batch);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("mDNS receive error: {}", e);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MdnsTransport for MulticastTransport {
    fn subscribe(&self) -> broadcast::Receiver<RecordBatch> {
        self.events.subscribe()
    }

    async fn query(&self, name: &str, kind: RecordKind) -> Result<()> {
        let packet = wire::encode_query(name, kind)?;
        self.socket
            .send_to(&packet, (wire::MDNS_GROUP, wire::MDNS_PORT))
            .await
            .with_context(|| format!("Failed to send mDNS query for {}", name))?;
        Ok(())
    }
}

/// Reusable socket on 5353; an OS mDNS responder may already hold the port.
fn multicast_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("Failed to create UDP socket")?;
    socket
        .set_reuse_address(true)
        .context("Failed to set SO_REUSEADDR")?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .context("Failed to set SO_REUSEPORT")?;

    let listen: SocketAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, wire::MDNS_PORT));
    socket
        .bind(&listen.into())
        .with_context(|| format!("Failed to bind {}", listen))?;
    socket
        .join_multicast_v4(&wire::MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)
        .context("Failed to join the mDNS multicast group")?;
    socket
        .set_multicast_loop_v4(true)
        .context("Failed to enable multicast loopback")?;
    socket
        .set_nonblocking(true)
        .context("Failed to set nonblocking")?;

    UdpSocket::from_std(socket.into()).context("Failed to register socket with tokio")
}

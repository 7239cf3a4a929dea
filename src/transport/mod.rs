//! TCP transport endpoint
//!
//! The overlay exchanges one JSON frame per short-lived connection: the
//! sender connects to the peer's well-known port, writes the document, and
//! closes. Receives are bounded and EOF-delimited; oversized or malformed
//! frames are dropped. Sends are best-effort: failures are logged, never
//! surfaced to the routing logic.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::wire::{self, Message, MAX_FRAME_LEN};

const INBOUND_QUEUE: usize = 64;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Well-known overlay port every node listens on.
    pub port: u16,
    pub connect_timeout: Duration,
    pub max_frame: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 60000,
            connect_timeout: Duration::from_secs(2),
            max_frame: MAX_FRAME_LEN,
        }
    }
}

/// One-frame-per-connection TCP endpoint.
pub struct TcpEndpoint {
    config: TransportConfig,
}

impl TcpEndpoint {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Bind the overlay port and start the accept loop. Each inbound
    /// connection is read in its own task; decoded messages flow out of the
    /// returned channel in arrival order.
    pub async fn listen(
        &self,
        bind_ip: IpAddr,
    ) -> Result<(SocketAddr, mpsc::Receiver<Message>, JoinHandle<()>)> {
        let listener = TcpListener::bind((bind_ip, self.config.port)).await?;
        let local = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let max_frame = self.config.max_frame;

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            match read_frame(stream, max_frame).await {
                                Ok(message) => {
                                    let _ = tx.send(message).await;
                                }
                                Err(e) => {
                                    debug!(%peer, error = %e, "dropping inbound frame")
                                }
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok((local, rx, task))
    }

    /// Best-effort send of one frame to `addr` on the overlay port.
    /// Unreachable peers, timeouts, and refused connections are logged and
    /// dropped; the caller never sees them.
    pub async fn send(&self, addr: &str, message: &Message) {
        if let Err(e) = self.try_send(addr, message).await {
            debug!(%addr, error = %e, "send failed, dropping frame");
        }
    }

    async fn try_send(&self, addr: &str, message: &Message) -> Result<()> {
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| Error::Transport(format!("bad peer address {addr}")))?;
        let frame = wire::encode(message)?;

        let connect = TcpStream::connect((ip, self.config.port));
        let stream = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| Error::Transport(format!("connect to {addr} timed out")))?;
        let mut stream = stream?;
        stream.write_all(&frame).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

async fn read_frame(stream: TcpStream, max_frame: usize) -> Result<Message> {
    let mut buf = Vec::with_capacity(1024);
    let mut limited = stream.take(max_frame as u64 + 1);
    limited.read_to_end(&mut buf).await?;
    if buf.len() > max_frame {
        return Err(Error::Transport(format!(
            "frame exceeds {max_frame} bytes"
        )));
    }
    wire::decode(&buf)
}

/// Discover the address of the interface carrying the default route. A UDP
/// connect never sends a packet; it only asks the kernel which source
/// address it would pick.
pub async fn probe_local_addr() -> Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.connect(("8.8.8.8", 80)).await?;
    Ok(socket.local_addr()?.ip())
}

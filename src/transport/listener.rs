use super::osc::{decode_packet, OscArg};
use super::{ContextChange, TransportError, AVATAR_CHANGE_ADDRESS};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Listens for avatar-change notifications and forwards them to the driver loop.
pub struct ContextListener {
    socket: UdpSocket,
}

impl ContextListener {
    /// Binds the inbound socket. A port held by another process is reported as
    /// [`TransportError::BindConflict`] so the caller can treat it as fatal.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        match UdpSocket::bind(addr).await {
            Ok(socket) => {
                info!("Context listener bound to {}", addr);
                Ok(Self { socket })
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                error!("Port {} is already in use: {}", addr.port(), e);
                Err(TransportError::BindConflict(addr.port()))
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn spawn(
        self,
        changes: mpsc::Sender<ContextChange>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(changes, shutdown).await;
        })
    }

    async fn run(self, changes: mpsc::Sender<ContextChange>, shutdown: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Context listener shutting down");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Context listener receive failed: {}", e);
                        continue;
                    }
                },
            };

            let messages = match decode_packet(&buf[..len]) {
                Ok(messages) => messages,
                Err(e) => {
                    debug!("Ignoring packet from {}: {}", peer, e);
                    continue;
                }
            };

            for message in messages {
                if message.address != AVATAR_CHANGE_ADDRESS {
                    continue;
                }
                let Some(OscArg::String(context_id)) = message.args.into_iter().next() else {
                    warn!("Avatar change without a string argument from {}", peer);
                    continue;
                };

                debug!("Avatar change notification: {}", context_id);
                if changes.send(ContextChange { context_id }).await.is_err() {
                    info!("Driver loop gone, stopping context listener");
                    return;
                }
            }
        }
    }
}

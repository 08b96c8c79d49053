use super::osc::OscMessage;
use super::{resolve, ParamValue, ParameterSink, TransportError, AVATAR_PARAMETERS_PREFIX};
use std::net::{SocketAddr, UdpSocket};
use tracing::{info, trace, warn};

/// UDP sender publishing avatar parameters to the game client.
///
/// The socket is non-blocking; a full send buffer drops the datagram instead of
/// stalling the dispatch loop.
#[derive(Debug)]
pub struct OscSender {
    socket: UdpSocket,
    target: SocketAddr,
    sent: u64,
}

impl OscSender {
    pub fn connect(ip: &str, port: u16) -> Result<Self, TransportError> {
        let target = resolve(ip, port)?;

        let bind_addr: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;

        info!("OSC sender targeting {}", target);
        Ok(Self {
            socket,
            target,
            sent: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Number of datagrams handed to the OS so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl ParameterSink for OscSender {
    fn send_parameter(&mut self, parameter: &str, value: ParamValue) {
        let address = format!("{}{}", AVATAR_PARAMETERS_PREFIX, parameter);
        let packet = OscMessage::new(address, vec![value.into()]).encode();

        match self.socket.send_to(&packet, self.target) {
            Ok(_) => {
                self.sent += 1;
                trace!("Sent {} = {}", parameter, value);
            }
            Err(e) => warn!("Dropped {} = {}: {}", parameter, value, e),
        }
    }
}

//! Multicast socket setup.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Errors that can occur while setting up the multicast transport.
///
/// All of these are unrecoverable configuration or environment problems; the
/// caller is expected to report them and exit.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid multicast ip address: {0}")]
    InvalidGroup(String),
    #[error("{0} is not a multicast address")]
    NotMulticast(IpAddr),
}

/// A multicast group, tagged by address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticastGroup {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl MulticastGroup {
    /// Parse a group address literal, trying the IPv4 dotted form first and
    /// falling back to IPv6.
    pub fn parse(s: &str) -> Result<Self, TransportError> {
        let group = if let Ok(v4) = s.parse::<Ipv4Addr>() {
            MulticastGroup::V4(v4)
        } else if let Ok(v6) = s.parse::<Ipv6Addr>() {
            MulticastGroup::V6(v6)
        } else {
            return Err(TransportError::InvalidGroup(s.to_string()));
        };

        if !group.ip().is_multicast() {
            return Err(TransportError::NotMulticast(group.ip()));
        }

        Ok(group)
    }

    /// The group address.
    pub fn ip(&self) -> IpAddr {
        match self {
            MulticastGroup::V4(ip) => IpAddr::V4(*ip),
            MulticastGroup::V6(ip) => IpAddr::V6(*ip),
        }
    }

    /// Name of the selected address family, for the startup banner.
    pub fn family(&self) -> &'static str {
        match self {
            MulticastGroup::V4(_) => "IPv4",
            MulticastGroup::V6(_) => "IPv6",
        }
    }

    /// The wildcard address of the same family.
    fn unspecified(&self) -> IpAddr {
        match self {
            MulticastGroup::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            MulticastGroup::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    fn domain(&self) -> Domain {
        match self {
            MulticastGroup::V4(_) => Domain::IPV4,
            MulticastGroup::V6(_) => Domain::IPV6,
        }
    }
}

impl std::fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ip())
    }
}

/// Bound, group-joined sockets plus the send destination.
pub struct Transport {
    /// Receive socket: bound to the wildcard address at the group port and
    /// joined to the group, with address reuse enabled so several local
    /// instances can share the port.
    pub recv: UdpSocket,
    /// Send socket: bound to an ephemeral port so each instance announces
    /// from a distinct source endpoint.
    pub send: UdpSocket,
    /// Where heartbeats are sent: group address + port.
    pub dest: SocketAddr,
}

impl Transport {
    /// Open the receive and send sockets for `group` on `port`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(group: MulticastGroup, port: u16) -> Result<Self, TransportError> {
        let recv = Self::recv_socket(group, port)?;
        let send = Self::send_socket(group)?;
        let dest = SocketAddr::new(group.ip(), port);

        Ok(Self { recv, send, dest })
    }

    fn recv_socket(group: MulticastGroup, port: u16) -> Result<UdpSocket, TransportError> {
        let socket = Socket::new(group.domain(), Type::DGRAM, Some(Protocol::UDP))?;

        // Several instances on the same host must be able to bind the group
        // port concurrently; that is the whole point of this tool.
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        let bind_addr = SocketAddr::new(group.unspecified(), port);
        socket.bind(&bind_addr.into())?;

        match group {
            MulticastGroup::V4(ip) => socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?,
            MulticastGroup::V6(ip) => socket.join_multicast_v6(&ip, 0)?,
        }

        socket.set_nonblocking(true)?;
        Ok(UdpSocket::from_std(socket.into())?)
    }

    fn send_socket(group: MulticastGroup) -> Result<UdpSocket, TransportError> {
        let socket = Socket::new(group.domain(), Type::DGRAM, Some(Protocol::UDP))?;

        // Loop our own datagrams back so a second copy on the same host is
        // still visible to everyone, ourselves included.
        match group {
            MulticastGroup::V4(_) => socket.set_multicast_loop_v4(true)?,
            MulticastGroup::V6(_) => socket.set_multicast_loop_v6(true)?,
        }

        let bind_addr = SocketAddr::new(group.unspecified(), 0);
        socket.bind(&bind_addr.into())?;

        socket.set_nonblocking(true)?;
        Ok(UdpSocket::from_std(socket.into())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_group() {
        let group = MulticastGroup::parse("239.255.0.1").unwrap();
        assert_eq!(group, MulticastGroup::V4(Ipv4Addr::new(239, 255, 0, 1)));
        assert_eq!(group.family(), "IPv4");
    }

    #[test]
    fn test_parse_ipv6_group() {
        let group = MulticastGroup::parse("ff02::114").unwrap();
        assert!(matches!(group, MulticastGroup::V6(_)));
        assert_eq!(group.family(), "IPv6");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            MulticastGroup::parse("not-an-address"),
            Err(TransportError::InvalidGroup(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unicast() {
        assert!(matches!(
            MulticastGroup::parse("10.0.0.5"),
            Err(TransportError::NotMulticast(_))
        ));
        assert!(matches!(
            MulticastGroup::parse("fe80::1"),
            Err(TransportError::NotMulticast(_))
        ));
    }

    #[test]
    fn test_ipv4_parsed_before_ipv6() {
        // "224.0.0.1" is a valid IPv4 literal and must select the V4 variant
        // even though IPv6 sockets could carry a mapped form of it.
        let group = MulticastGroup::parse("224.0.0.1").unwrap();
        assert!(matches!(group, MulticastGroup::V4(_)));
    }
}

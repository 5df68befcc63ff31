use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Transport protocols the forwarder carries
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
}

/// One send/capture exchange on the raw network. Opened per forwarded packet
/// so concurrent workers never see each other's replies.
pub trait RawConduit: Send {
    /// Emit one complete IPv4 packet, header included
    fn send(&mut self, packet: &[u8], dst: Ipv4Addr) -> io::Result<()>;

    /// Receive one raw IPv4 packet, waiting at most `timeout`. A timeout
    /// surfaces as `WouldBlock`/`TimedOut`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Factory for conduits; the seam tests replace with an in-memory network
pub trait RawNetwork: Send + Sync + 'static {
    fn open(&self, kind: TransportKind) -> io::Result<Box<dyn RawConduit>>;
}

/// Production implementation: raw IPv4 sockets with IP_HDRINCL, one per
/// exchange. Requires CAP_NET_RAW or equivalent.
pub struct RawSocketNetwork;

impl RawNetwork for RawSocketNetwork {
    fn open(&self, kind: TransportKind) -> io::Result<Box<dyn RawConduit>> {
        let protocol = match kind {
            TransportKind::Tcp => Protocol::TCP,
            TransportKind::Udp => Protocol::UDP,
        };
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(protocol))?;
        socket.set_header_included(true)?;
        Ok(Box::new(RawSocketConduit { socket }))
    }
}

struct RawSocketConduit {
    socket: Socket,
}

impl RawConduit for RawSocketConduit {
    fn send(&mut self, packet: &[u8], dst: Ipv4Addr) -> io::Result<()> {
        let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(dst, 0)));
        self.socket.send_to(packet, &addr)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        // A zero timeout would mean "block forever" to the kernel
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        self.socket.read(buf)
    }
}

// Each test binary compiles this module and uses a different slice of it
#![allow(dead_code)]

use bifrost::session::{RawConduit, RawNetwork, TransportKind};
use parking_lot::Mutex;
use smoltcp::wire::{IpProtocol, Ipv4Packet, UdpPacket};
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// In-memory stand-in for the raw network: records sends, feeds scripted
/// replies to whichever worker polls next.
#[derive(Clone, Default)]
pub struct MockRawNetwork {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    sent: Mutex<Vec<Vec<u8>>>,
    replies: Mutex<VecDeque<Vec<u8>>>,
}

impl MockRawNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, packet: Vec<u8>) {
        self.state.replies.lock().push_back(packet);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().clone()
    }
}

impl RawNetwork for MockRawNetwork {
    fn open(&self, _kind: TransportKind) -> io::Result<Box<dyn RawConduit>> {
        Ok(Box::new(MockConduit {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConduit {
    state: Arc<MockState>,
}

impl RawConduit for MockConduit {
    fn send(&mut self, packet: &[u8], _dst: Ipv4Addr) -> io::Result<()> {
        self.state.sent.lock().push(packet.to_vec());
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(reply) = self.state.replies.lock().pop_front() {
                let len = reply.len().min(buf.len());
                buf[..len].copy_from_slice(&reply[..len]);
                return Ok(len);
            }
            if Instant::now() >= deadline {
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

/// A checksummed UDP/IPv4 packet, addresses given as "ip:port"
pub fn udp_packet(src: &str, dst: &str, payload: &[u8]) -> Vec<u8> {
    let src: SocketAddrV4 = src.parse().expect("source address");
    let dst: SocketAddrV4 = dst.parse().expect("destination address");
    let mut buf = vec![0u8; IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len()];

    buf[IPV4_HEADER_LEN + UDP_HEADER_LEN..].copy_from_slice(payload);
    {
        let mut udp = UdpPacket::new_unchecked(&mut buf[IPV4_HEADER_LEN..]);
        udp.set_src_port(src.port());
        udp.set_dst_port(dst.port());
        udp.set_len((UDP_HEADER_LEN + payload.len()) as u16);
        udp.fill_checksum(&(*src.ip()).into(), &(*dst.ip()).into());
    }
    let total_len = buf.len() as u16;
    let mut ip = Ipv4Packet::new_unchecked(&mut buf[..]);
    ip.set_version(4);
    ip.set_header_len(IPV4_HEADER_LEN as u8);
    ip.set_total_len(total_len);
    ip.set_hop_limit(64);
    ip.set_next_header(IpProtocol::Udp);
    ip.set_src_addr(*src.ip());
    ip.set_dst_addr(*dst.ip());
    ip.fill_checksum();
    buf
}

/// Addressing of a UDP/IPv4 packet as (src, src port, dst, dst port)
pub fn endpoints(raw: &[u8]) -> (Ipv4Addr, u16, Ipv4Addr, u16) {
    let ip = Ipv4Packet::new_checked(raw).expect("ip packet");
    assert_eq!(ip.next_header(), IpProtocol::Udp);
    let udp = UdpPacket::new_checked(ip.payload()).expect("udp packet");
    (ip.src_addr(), udp.src_port(), ip.dst_addr(), udp.dst_port())
}

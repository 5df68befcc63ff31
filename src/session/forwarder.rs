use super::ports::{PortLease, PortPool};
use super::raw::{RawNetwork, TransportKind};
use super::store::Session;
use base64::Engine;
use smoltcp::wire::{IpProtocol, Ipv4Packet, TcpPacket, UdpPacket};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::PACKET_ENCODING;

/// Extra slack the watchdog grants a worker beyond its capture window before
/// reporting it wedged
const WATCHDOG_GRACE: Duration = Duration::from_secs(5);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    InvalidPacket,
    NoFreePorts,
}

/// What a worker needs to recognize and un-spoof replies for one exchange
struct ReplyMatch {
    kind: TransportKind,
    peer: Ipv4Addr,
    peer_port: u16,
    spoofed_port: u16,
    original_src: Ipv4Addr,
    original_src_port: u16,
}

/// NAT-like per-packet forwarder: spoofs the source endpoint on the way out,
/// captures replies on a dedicated worker, restores the original addressing
/// and parks them in the session's queue.
pub struct Forwarder {
    public_ip: Ipv4Addr,
    window: Duration,
    ports: Arc<PortPool>,
    network: Arc<dyn RawNetwork>,
}

impl Forwarder {
    pub fn new(
        public_ip: Ipv4Addr,
        window: Duration,
        ports: Arc<PortPool>,
        network: Arc<dyn RawNetwork>,
    ) -> Self {
        Self {
            public_ip,
            window,
            ports,
            network,
        }
    }

    pub fn ports(&self) -> &Arc<PortPool> {
        &self.ports
    }

    /// Rewrite and emit one raw IP packet on behalf of `session`. Returns as
    /// soon as the worker is spawned; replies surface through the session's
    /// pending queue.
    pub fn forward(&self, session: &Arc<Session>, raw: Vec<u8>) -> ForwardOutcome {
        let Some((kind, original_src, original_src_port, peer, peer_port)) = inspect(&raw) else {
            return ForwardOutcome::InvalidPacket;
        };

        let Some(lease) = self.ports.acquire() else {
            return ForwardOutcome::NoFreePorts;
        };
        let spoofed_port = lease.port();

        let Some(rewritten) = rewrite_outbound(raw, self.public_ip, spoofed_port) else {
            return ForwardOutcome::InvalidPacket;
        };

        debug!(
            "Forwarding {:?} packet for session {} to {}:{} via port {}",
            kind,
            session.id(),
            peer,
            peer_port,
            spoofed_port
        );

        let reply_match = ReplyMatch {
            kind,
            peer,
            peer_port,
            spoofed_port,
            original_src,
            original_src_port,
        };
        self.spawn_worker(Arc::clone(session), lease, rewritten, reply_match);
        ForwardOutcome::Sent
    }

    fn spawn_worker(
        &self,
        session: Arc<Session>,
        lease: PortLease,
        packet: Vec<u8>,
        reply_match: ReplyMatch,
    ) {
        session.track_port(lease.port());
        let guard = WorkerGuard { session, lease };
        let network = Arc::clone(&self.network);
        let window = self.window;

        tokio::spawn(async move {
            let session_id = guard.session.id().to_string();
            let worker =
                tokio::task::spawn_blocking(move || run_exchange(network, packet, reply_match, guard, window));
            match tokio::time::timeout(window + WATCHDOG_GRACE, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    error!("Forward worker for session {} died: {}", session_id, join_error);
                }
                Err(_) => {
                    warn!(
                        "Forward worker for session {} overran its capture window",
                        session_id
                    );
                }
            }
        });
    }
}

/// Ties the port's session bookkeeping to the lease: untrack first, then the
/// lease drop returns the port to the pool.
struct WorkerGuard {
    session: Arc<Session>,
    lease: PortLease,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.session.untrack_port(self.lease.port());
    }
}

/// Send the rewritten packet, then collect matching replies until the window
/// closes. Runs on the blocking pool; every receive is bounded by the
/// remaining window so the worker cannot outlive its deadline by much.
fn run_exchange(
    network: Arc<dyn RawNetwork>,
    packet: Vec<u8>,
    reply_match: ReplyMatch,
    guard: WorkerGuard,
    window: Duration,
) {
    let deadline = Instant::now() + window;
    let session = &guard.session;

    let mut conduit = match network.open(reply_match.kind) {
        Ok(conduit) => conduit,
        Err(e) => {
            warn!("Could not open raw conduit: {}", e);
            return;
        }
    };

    if let Err(e) = conduit.send(&packet, reply_match.peer) {
        warn!("Raw send for session {} failed: {}", session.id(), e);
        return;
    }

    let mut buf = vec![0u8; 65535];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match conduit.recv(&mut buf, remaining) {
            Ok(len) => {
                if let Some(reply) = match_and_rewrite(&buf[..len], &reply_match) {
                    debug!("Captured response packet for session {}", session.id());
                    session.push_pending(PACKET_ENCODING.encode(&reply));
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Window poll tick; the deadline check above decides
            }
            Err(e) => {
                warn!("Raw recv for session {} failed: {}", session.id(), e);
                break;
            }
        }
    }
    // guard drops here: port untracked, lease released
}

/// Classify a client packet: IPv4 carrying TCP or UDP, with its addressing
fn inspect(raw: &[u8]) -> Option<(TransportKind, Ipv4Addr, u16, Ipv4Addr, u16)> {
    if raw.first()? >> 4 != 4 {
        return None;
    }
    let ip = Ipv4Packet::new_checked(raw).ok()?;
    let src = ip.src_addr();
    let dst = ip.dst_addr();
    match ip.next_header() {
        IpProtocol::Tcp => {
            let tcp = TcpPacket::new_checked(ip.payload()).ok()?;
            Some((TransportKind::Tcp, src, tcp.src_port(), dst, tcp.dst_port()))
        }
        IpProtocol::Udp => {
            let udp = UdpPacket::new_checked(ip.payload()).ok()?;
            Some((TransportKind::Udp, src, udp.src_port(), dst, udp.dst_port()))
        }
        _ => None,
    }
}

/// Spoof the source endpoint and recompute both checksums
fn rewrite_outbound(mut raw: Vec<u8>, new_src: Ipv4Addr, new_port: u16) -> Option<Vec<u8>> {
    let total_len = Ipv4Packet::new_checked(&raw[..]).ok()?.total_len() as usize;
    raw.truncate(total_len);

    let mut ip = Ipv4Packet::new_checked(&mut raw[..]).ok()?;
    ip.set_src_addr(new_src);
    let src = ip.src_addr();
    let dst = ip.dst_addr();
    match ip.next_header() {
        IpProtocol::Tcp => {
            let mut tcp = TcpPacket::new_checked(ip.payload_mut()).ok()?;
            tcp.set_src_port(new_port);
            tcp.fill_checksum(&src.into(), &dst.into());
        }
        IpProtocol::Udp => {
            let mut udp = UdpPacket::new_checked(ip.payload_mut()).ok()?;
            udp.set_src_port(new_port);
            udp.fill_checksum(&src.into(), &dst.into());
        }
        _ => return None,
    }
    ip.fill_checksum();
    Some(raw)
}

/// Restore the client's original endpoint on a reply and recompute checksums
fn rewrite_inbound(mut raw: Vec<u8>, new_dst: Ipv4Addr, new_port: u16) -> Option<Vec<u8>> {
    let total_len = Ipv4Packet::new_checked(&raw[..]).ok()?.total_len() as usize;
    raw.truncate(total_len);

    let mut ip = Ipv4Packet::new_checked(&mut raw[..]).ok()?;
    ip.set_dst_addr(new_dst);
    let src = ip.src_addr();
    let dst = ip.dst_addr();
    match ip.next_header() {
        IpProtocol::Tcp => {
            let mut tcp = TcpPacket::new_checked(ip.payload_mut()).ok()?;
            tcp.set_dst_port(new_port);
            tcp.fill_checksum(&src.into(), &dst.into());
        }
        IpProtocol::Udp => {
            let mut udp = UdpPacket::new_checked(ip.payload_mut()).ok()?;
            udp.set_dst_port(new_port);
            udp.fill_checksum(&src.into(), &dst.into());
        }
        _ => return None,
    }
    ip.fill_checksum();
    Some(raw)
}

/// Does this raw packet answer our exchange? If so, un-spoof it.
fn match_and_rewrite(raw: &[u8], m: &ReplyMatch) -> Option<Vec<u8>> {
    let (kind, src, src_port, _dst, dst_port) = inspect(raw)?;
    if kind != m.kind || src != m.peer || src_port != m.peer_port || dst_port != m.spoofed_port {
        return None;
    }
    rewrite_inbound(raw.to_vec(), m.original_src, m.original_src_port)
}

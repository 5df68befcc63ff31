use crate::config::ServerConfig;
use crate::dns::DNSPacket;
use crate::error::Result;
use crate::resolver::Resolver;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const UDP_RECV_BUF: usize = 4096;
/// Largest DNS message we accept over TCP
const TCP_MAX_MESSAGE: usize = 65535;

/// DNS front door: a UDP socket and, unless disabled, a TCP listener on the
/// same address, both feeding the resolver.
pub struct DnsServer {
    config: Arc<ServerConfig>,
    resolver: Arc<Resolver>,
}

impl DnsServer {
    pub fn new(config: Arc<ServerConfig>, resolver: Arc<Resolver>) -> Self {
        Self { config, resolver }
    }

    pub async fn run(&self) -> Result<()> {
        let udp = Arc::new(UdpSocket::bind(self.config.bind_addr).await?);
        info!("UDP DNS server listening on {}", self.config.bind_addr);

        if self.config.enable_tcp {
            let tcp = TcpListener::bind(self.config.bind_addr).await?;
            info!("TCP DNS server listening on {}", self.config.bind_addr);
            tokio::try_join!(
                run_udp(udp, Arc::clone(&self.resolver)),
                run_tcp(tcp, Arc::clone(&self.config), Arc::clone(&self.resolver)),
            )?;
        } else {
            run_udp(udp, Arc::clone(&self.resolver)).await?;
        }
        Ok(())
    }
}

async fn run_udp(socket: Arc<UdpSocket>, resolver: Arc<Resolver>) -> Result<()> {
    let mut buf = vec![0u8; UDP_RECV_BUF];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => {
                let data = buf[..len].to_vec();
                let socket = Arc::clone(&socket);
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    if let Err(e) = handle_udp_query(data, addr, socket, resolver).await {
                        debug!("Failed to handle UDP query from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("UDP socket error: {}", e);
                return Err(e.into());
            }
        }
    }
}

async fn handle_udp_query(
    data: Vec<u8>,
    addr: SocketAddr,
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
) -> Result<()> {
    let query = match DNSPacket::parse(&data) {
        Ok(query) => query,
        Err(e) => {
            debug!("Dropping malformed query from {}: {}", addr, e);
            return Ok(());
        }
    };

    let response = resolver.resolve(&query);
    let max_payload = query.max_udp_payload_size() as usize;
    let mut bytes = response.serialize()?;
    if bytes.len() > max_payload {
        debug!(
            "Response too large for UDP ({} > {} bytes), sending truncated response",
            bytes.len(),
            max_payload
        );
        bytes = response.truncated().serialize()?;
    }
    socket.send_to(&bytes, addr).await?;
    Ok(())
}

async fn run_tcp(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    resolver: Arc<Resolver>,
) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let resolver = Arc::clone(&resolver);
                let idle_timeout = config.tcp_idle_timeout();
                tokio::spawn(async move {
                    if let Err(e) = handle_tcp_connection(stream, addr, resolver, idle_timeout).await
                    {
                        debug!("TCP connection from {} ended: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                warn!("TCP accept error: {}", e);
            }
        }
    }
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    resolver: Arc<Resolver>,
    idle_timeout: std::time::Duration,
) -> Result<()> {
    debug!("TCP connection from {}", addr);

    loop {
        // RFC 1035 framing: two length bytes, then the message
        let len = match timeout(idle_timeout, stream.read_u16()).await {
            Ok(Ok(len)) => len as usize,
            // Clean close or idle client; either way we are done
            Ok(Err(_)) | Err(_) => return Ok(()),
        };
        if len == 0 || len > TCP_MAX_MESSAGE {
            return Ok(());
        }

        let mut data = vec![0u8; len];
        match timeout(idle_timeout, stream.read_exact(&mut data)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(()),
        }

        let query = match DNSPacket::parse(&data) {
            Ok(query) => query,
            Err(e) => {
                debug!("Dropping malformed TCP query from {}: {}", addr, e);
                return Ok(());
            }
        };

        let response = resolver.resolve(&query);
        let bytes = response.serialize()?;
        if bytes.len() > TCP_MAX_MESSAGE {
            warn!("Response for {} exceeds TCP message limit, dropping", addr);
            return Ok(());
        }
        stream.write_u16(bytes.len() as u16).await?;
        stream.write_all(&bytes).await?;
    }
}

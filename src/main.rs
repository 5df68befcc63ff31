use bifrost::config::ServerConfig;
use bifrost::error::Result;
use bifrost::resolver::Resolver;
use bifrost::server::DnsServer;
use bifrost::session::{Forwarder, PortPool, RawSocketNetwork, SessionHandler};
use bifrost::zone::FixedZone;
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bifrost",
    about = "DNS tunnel endpoint: carries IP traffic for clients that can only reach a resolver"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (default: all interfaces)
    #[arg(short, long)]
    address: Option<IpAddr>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Authoritative zone suffix
    #[arg(short, long)]
    zone: Option<String>,

    /// Public IP written into spoofed source addresses
    #[arg(long)]
    public_ip: Option<Ipv4Addr>,

    /// Zone file with fixed records; may be repeated
    #[arg(long = "zone-file")]
    zone_files: Vec<String>,

    /// UDP server only (default: UDP and TCP)
    #[arg(long)]
    no_tcp: bool,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(address) = self.address {
            config.bind_addr.set_ip(address);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(zone) = self.zone {
            config.zone = zone;
        }
        if let Some(public_ip) = self.public_ip {
            config.public_ip = public_ip;
        }
        config.fixed_zone_files.extend(self.zone_files);
        if self.no_tcp {
            config.enable_tcp = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bifrost=info")),
        )
        .init();

    let config = Arc::new(Args::parse().into_config()?);
    info!(
        "Starting Bifrost for zone {} on {} [{}]",
        config.zone,
        config.bind_addr,
        if config.enable_tcp { "UDP/TCP" } else { "UDP" }
    );
    if config.public_ip.is_unspecified() {
        warn!("public_ip not configured; forwarded packets will carry an unusable source address");
    }

    let fixed = FixedZone::load_files(&config.fixed_zone_files)?;
    if !fixed.is_empty() {
        info!("Serving {} fixed records", fixed.len());
    }

    let ports = PortPool::new(config.port_range_start..config.port_range_end);
    let forwarder = Forwarder::new(
        config.public_ip,
        config.capture_window(),
        ports,
        Arc::new(RawSocketNetwork),
    );
    let sessions = Arc::new(SessionHandler::new(
        forwarder,
        config.max_pending_packets,
        config.max_response_bytes,
    ));
    let resolver = Arc::new(Resolver::new(&config, fixed, sessions));

    DnsServer::new(Arc::clone(&config), resolver).run().await
}

//! mDNS/Bonjour advertisement for LAN discovery of the Vision API.

use std::net::Ipv4Addr;

use log::{info, warn};
use mdns_sd::{ServiceDaemon, ServiceInfo};

const SERVICE_TYPE: &str = "_physical-mcp._tcp.local.";
const DEFAULT_INSTANCE: &str = "physical-mcp";
const DEFAULT_HOSTNAME: &str = "physical-mcp.local.";

/// Owns the mDNS daemon and the service registration; dropping or calling
/// `close` unregisters it.
pub struct MdnsPublisher {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsPublisher {
    pub fn close(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("mDNS unregister failed: {e}");
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!("mDNS shutdown failed: {e}");
        }
    }
}

/// Advertises the Vision API on the LAN. Returns `None` (rather than an
/// error) on any failure — mDNS is a convenience, never load-bearing for
/// the daemon to function.
pub fn publish_vision_api_mdns(port: u16, ip: Option<Ipv4Addr>) -> Option<MdnsPublisher> {
    let ip_addr = match ip.or_else(lan_ip) {
        Some(ip) => ip,
        None => {
            info!("mDNS: skipped (no LAN IP detected)");
            return None;
        }
    };

    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            warn!("mDNS: advertisement failed: {e}");
            return None;
        }
    };

    let mut properties = std::collections::HashMap::new();
    properties.insert("path".to_string(), "/dashboard".to_string());
    properties.insert("name".to_string(), "physical-mcp".to_string());

    let service_info = match ServiceInfo::new(
        SERVICE_TYPE,
        DEFAULT_INSTANCE,
        DEFAULT_HOSTNAME,
        ip_addr,
        port,
        Some(properties),
    ) {
        Ok(info) => info,
        Err(e) => {
            warn!("mDNS: advertisement failed: {e}");
            return None;
        }
    };

    let fullname = service_info.get_fullname().to_string();
    if let Err(e) = daemon.register(service_info) {
        warn!("mDNS: advertisement failed: {e}");
        return None;
    }

    info!(
        "mDNS: advertised {fullname} at http://{}:{port}",
        DEFAULT_HOSTNAME.trim_end_matches('.')
    );
    Some(MdnsPublisher { daemon, fullname })
}

/// Best-effort LAN IPv4 lookup: connect a UDP socket to a public address
/// (no packets sent) and read back the local address the OS chose.
pub fn lan_ip() -> Option<Ipv4Addr> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(v4) => Some(v4),
        std::net::IpAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_matches_spec_value() {
        assert_eq!(SERVICE_TYPE, "_physical-mcp._tcp.local.");
    }

    #[test]
    fn lan_ip_returns_a_private_or_loopback_looking_address_when_available() {
        // This is environment-dependent (no network in some sandboxes), so
        // we only assert it doesn't panic and returns *some* IPv4 when it
        // does return anything.
        if let Some(ip) = lan_ip() {
            assert!(!ip.is_unspecified());
        }
    }
}

//! Capture filter expression helpers
//!
//! The classifier only needs a resolved host and port; these helpers pull
//! them out of a BPF-style filter string or build one from them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;

static HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:src|dst)?\s*host\s+([^\s]+)").expect("host pattern"));
static PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:udp|tcp)?\s*port\s+(\d+)").expect("port pattern"));

/// First `[src|dst] host <ip>` clause that names a valid address
pub fn extract_host(filter: &str) -> Option<IpAddr> {
    let captures = HOST_RE.captures(filter)?;
    captures.get(1)?.as_str().trim().parse().ok()
}

/// First `[udp|tcp] port <n>` clause, if it fits a port number
pub fn extract_port(filter: &str) -> Option<u16> {
    let captures = PORT_RE.captures(filter)?;
    captures.get(1)?.as_str().parse::<u16>().ok().filter(|&port| port != 0)
}

/// Restrict a filter to `ip` unless it already names a host
pub fn inject_host(filter: &str, ip: IpAddr) -> String {
    if extract_host(filter).is_some() {
        return filter.to_string();
    }
    match filter.trim() {
        "" => format!("host {}", ip),
        trimmed => format!("host {} and ({})", ip, trimmed),
    }
}

/// Synthesize a filter for one host and optional port (0 for any)
pub fn build_filter(ip: IpAddr, port: u16) -> String {
    let prefix = if ip.is_ipv4() { "host" } else { "ip6 host" };
    if port > 0 {
        format!("{} {} and port {}", prefix, ip, port)
    } else {
        format!("{} {}", prefix, ip)
    }
}

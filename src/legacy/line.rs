//! Line-level classification for the legacy free-text format.
//!
//! The mandatory first line looks like:
//! `traceroute [(64.86.132.76:33461) -> (98.162.212.214:53849)], protocol icmp, algo exhaustive, duration 19 s`
//! where the first endpoint is the measurement server and the second is the
//! destination under test. Subsequent hop lines carry a TTL prefix and one
//! or more 4-field tuples.

use log::warn;

use crate::error::FormatError;
use crate::model::normalize_ip;

/// Probe protocol named by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Icmp,
    Udp,
    Tcp,
}

impl Protocol {
    pub fn parse(token: &str) -> Result<Self, FormatError> {
        match token {
            "icmp" => Ok(Protocol::Icmp),
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(FormatError::UnknownProtocol(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Icmp => "icmp",
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        }
    }
}

/// Parsed first line of a legacy test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub protocol: Protocol,
    pub destination_ip: String,
    pub server_ip: String,
}

/// Strip `[(`/`(` and `)]`/`)` from a bracketed endpoint, then split the
/// port off at the last colon so IPv6 literals survive.
fn endpoint_ip(segment: &str) -> Option<String> {
    let trimmed = segment
        .trim_start_matches('[')
        .trim_start_matches('(')
        .trim_end_matches(']')
        .trim_end_matches(')');
    let colon = trimmed.rfind(':')?;
    let ip = normalize_ip(&trimmed[..colon]);
    if ip.parse::<std::net::IpAddr>().is_ok() {
        Some(ip)
    } else {
        None
    }
}

/// Parse the mandatory first line.
pub fn parse_header(line: &str) -> Result<Header, FormatError> {
    let mut parts = line.split(',');
    let bracketed = parts.next().unwrap_or_default();
    let segments: Vec<&str> = bracketed.split_whitespace().collect();
    if segments.len() != 4 {
        return Err(FormatError::BadHeader(format!(
            "expected 4 segments before the first comma, got {}",
            segments.len()
        )));
    }
    let server_ip = endpoint_ip(segments[1])
        .ok_or_else(|| FormatError::BadHeader(format!("bad server endpoint: {}", segments[1])))?;
    let destination_ip = endpoint_ip(segments[3]).ok_or_else(|| {
        FormatError::BadHeader(format!("bad destination endpoint: {}", segments[3]))
    })?;

    let mut protocol = None;
    for part in parts {
        let mut words = part.trim().split_whitespace();
        match (words.next(), words.next()) {
            (Some("protocol"), Some(token)) => protocol = Some(Protocol::parse(token)?),
            (Some("algo"), Some(algo)) if algo != "exhaustive" => {
                warn!("unexpected traceroute algorithm: {}", algo);
            }
            _ => {}
        }
    }
    let protocol =
        protocol.ok_or_else(|| FormatError::BadHeader("missing protocol field".to_string()))?;

    Ok(Header {
        protocol,
        destination_ip,
        server_ip,
    })
}

/// Split one hop line into 4-field tuples, dropping the leading TTL and
/// probe-count fields (e.g. `1  P(6, 6)`). Returns `None` for lines that
/// are skipped outright: MPLS annotations and lines too short to carry a
/// tuple. A line that ends partway through a tuple is an error.
pub fn split_hop_line(line: &str) -> Result<Option<Vec<[&str; 4]>>, FormatError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 || parts[0] == "MPLS" {
        return Ok(None);
    }
    let mut tuples = Vec::new();
    let mut i = 3;
    while i < parts.len() {
        if i + 4 > parts.len() {
            return Err(FormatError::IncompleteHop);
        }
        tuples.push([parts[i], parts[i + 1], parts[i + 2], parts[i + 3]]);
        i += 4;
    }
    Ok(Some(tuples))
}

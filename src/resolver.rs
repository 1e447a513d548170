//! Heuristic destination extraction from the first read of an HTTP request.
//!
//! Only the `Host:` header is consulted (with a fallback to the CONNECT
//! request-target). When no port is given, the scheme is guessed from the
//! presence of `https` anywhere in the request text. Resolution fails closed:
//! a missing host is an error, never a default destination.

use crate::classifier::is_connect_request;
use crate::error::ProxyError;

/// A resolved destination. `host_port` is the canonical `host:port` key used
/// to decide whether an existing pairing can be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub host_port: String,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host_port = format!("{}:{}", host, port);
        Self { host, port, host_port }
    }
}

pub fn resolve(request: &str) -> Result<Destination, ProxyError> {
    let authority = match host_header(request) {
        Some(value) => value,
        None => connect_target(request).ok_or(ProxyError::UnresolvedHost)?,
    };

    if authority.is_empty() {
        return Err(ProxyError::UnresolvedHost);
    }

    if let Some((host, port)) = split_port(authority) {
        if host.is_empty() {
            return Err(ProxyError::UnresolvedHost);
        }
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ProxyError::BadPort(authority.to_string()))?;
        return Ok(Destination::new(host, port));
    }

    let port = if request.contains("https") { 443 } else { 80 };
    Ok(Destination::new(authority, port))
}

/// Value of the first header line starting with `Host:`, compared case-insensitively.
fn host_header(request: &str) -> Option<&str> {
    request
        .split('\n')
        .skip(1)
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("host").then(|| value.trim())
        })
}

/// Authority from a `CONNECT host:port HTTP/1.1` request line.
fn connect_target(request: &str) -> Option<&str> {
    if !is_connect_request(request) {
        return None;
    }
    request.trim_start().split_whitespace().nth(1)
}

/// Splits `host:port`, leaving bracketed IPv6 literals intact.
fn split_port(authority: &str) -> Option<(&str, &str)> {
    if authority.starts_with('[') {
        let end = authority.find(']')?;
        let rest = &authority[end + 1..];
        return rest
            .strip_prefix(':')
            .map(|port| (&authority[..=end], port));
    }
    authority.rsplit_once(':')
}

//! Address resolution used by `Line::connect_client` / `Line::bind_server`.
//!
//! Resolution itself goes through `std::net::ToSocketAddrs`, which performs
//! the platform's own `getaddrinfo` under the hood; this module's job is
//! everything the original did *before* handing off to that call: literal
//! detection, the `localhost` substitution, and IPv6 link-local zone
//! stripping.

use crate::line::Family;
use crate::{ip, LineError, Result};
use std::net::{SocketAddr, ToSocketAddrs};

/// Outcome of resolving a connect target: the address to connect to, plus
/// any zone-id that was stripped from a link-local literal so it can later
/// be reapplied when this crate's link-local scope-id support is completed
/// (see design notes — currently a documented gap).
pub(crate) struct ResolvedTarget {
    pub addr: SocketAddr,
    pub zone: Option<String>,
}

fn looks_like_ipv6_literal(host: &str) -> bool {
    host.contains(':')
}

/// Applies the `localhost` substitution and link-local zone stripping
/// described in steps 4-5 of the connect sequence, returning the host text
/// to hand to `ToSocketAddrs` plus any stripped zone.
fn prepare_host(host: &str, family: Family) -> Result<(String, Option<String>)> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(match family {
            Family::V4 => ("127.0.0.1".to_string(), None),
            Family::V6 => ("::1".to_string(), None),
        });
    }

    if family == Family::V6 && looks_like_ipv6_literal(host) {
        ip::validate_ipv6_literal(host)?;
        let normalized = ip::normalize_address(host);
        if ip::is_link_local(&normalized) {
            let (addr_part, zone) = match normalized.split_once('%') {
                Some((a, z)) => (a.to_string(), Some(z.to_string())),
                None => (normalized, None),
            };
            return Ok((addr_part, zone));
        }
        return Ok((normalized, None));
    }

    Ok((host.to_string(), None))
}

/// Resolves `(host, port)` to a concrete [`SocketAddr`] matching `family`.
pub(crate) fn resolve_connect(host: &str, port: u16, family: Family) -> Result<ResolvedTarget> {
    let (prepared_host, zone) = prepare_host(host, family)?;

    let candidates = (prepared_host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| LineError::ResolveError(e.to_string()))?;

    for addr in candidates {
        let matches = matches!(
            (family, &addr),
            (Family::V4, SocketAddr::V4(_)) | (Family::V6, SocketAddr::V6(_))
        );
        if matches {
            return Ok(ResolvedTarget { addr, zone });
        }
    }

    Err(LineError::ResolveError(format!(
        "no {family:?} address found for {host}:{port}"
    )))
}

/// Resolves a passive (bind) target: the wildcard address for `family` on
/// `port`.
pub(crate) fn resolve_bind(port: u16, family: Family) -> Result<SocketAddr> {
    let wildcard = match family {
        Family::V4 => "0.0.0.0",
        Family::V6 => "::",
    };
    (wildcard, port)
        .to_socket_addrs()
        .map_err(|e| LineError::ResolveError(e.to_string()))?
        .next()
        .ok_or_else(|| LineError::ResolveError(format!("could not resolve bind address for port {port}")))
}

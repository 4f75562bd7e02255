//! IP address utilities: IPv6 validation/normalisation, link-local detection,
//! broadcast detection, and printable-address extraction from a generic
//! socket-address value.
//!
//! Implementation is purely lexical where the contract calls for it (no name
//! resolution happens in this module) and leans on `std::net`'s own parsers
//! rather than hand-rolled digit scanning, since `Ipv4Addr`/`Ipv6Addr`
//! already implement the parsing and canonical-form rules this module needs
//! to expose under the crate's own names.

use crate::{LineError, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Split a textual address into its numeric part and an optional zone
/// (`%iface`) suffix. Does not validate either half.
fn split_zone(s: &str) -> (&str, Option<&str>) {
    match s.split_once('%') {
        Some((addr, zone)) => (addr, Some(zone)),
        None => (s, None),
    }
}

/// Returns true iff `s` is a syntactically valid textual IPv6 address,
/// including an optional zone-id suffix (`%iface`).
pub fn is_ipv6_valid_address(s: &str) -> bool {
    let (addr, zone) = split_zone(s);
    if let Some(zone) = zone {
        if zone.is_empty() || zone.contains('%') {
            return false;
        }
    }
    Ipv6Addr::from_str(addr).is_ok()
}

/// Canonicalises an IPv6 string: lowercases hex, collapses the longest
/// zero-group run into `::`, and removes leading zeros in each group.
/// Returns the input unchanged if it is not a valid IPv6 address.
pub fn normalize_address(s: &str) -> String {
    let (addr, zone) = split_zone(s);
    match Ipv6Addr::from_str(addr) {
        Ok(parsed) => match zone {
            Some(zone) => format!("{parsed}%{zone}"),
            None => parsed.to_string(),
        },
        Err(_) => s.to_string(),
    }
}

/// True iff the address falls in `fe80::/10`.
pub fn is_link_local(s: &str) -> bool {
    let (addr, _zone) = split_zone(s);
    match Ipv6Addr::from_str(addr) {
        Ok(parsed) => {
            let segments = parsed.segments();
            (segments[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

/// Given a generic socket-address value, produce the printable IP. Fails
/// with [`LineError::AddressError`] on a family this crate does not handle
/// (unreachable for `std::net::SocketAddr` today, but kept as the entry
/// point the readiness/accept paths funnel raw peer addresses through).
pub fn ip_from_storage(storage: &SocketAddr) -> Result<String> {
    match storage {
        SocketAddr::V4(v4) => Ok(v4.ip().to_string()),
        SocketAddr::V6(v6) => Ok(v6.ip().to_string()),
    }
}

/// True (IPv4 only) iff `s` equals `255.255.255.255`, `0.0.0.0`, or the
/// final octet is 255.
pub fn is_broadcast(s: &str) -> bool {
    match Ipv4Addr::from_str(s) {
        Ok(addr) => {
            let octets = addr.octets();
            addr == Ipv4Addr::new(255, 255, 255, 255)
                || addr == Ipv4Addr::UNSPECIFIED
                || octets[3] == 255
        }
        Err(_) => false,
    }
}

/// The any-address sentinel used to seed `peer_ip` for a UDP line, per
/// address family.
pub(crate) fn any_address_sentinel(family: crate::line::Family) -> &'static str {
    match family {
        crate::line::Family::V4 => "0.0.0.0",
        crate::line::Family::V6 => "::",
    }
}

fn address_error(what: impl Into<String>) -> LineError {
    LineError::AddressError(what.into())
}

/// Validates an IPv6 literal used as a connect/bind target, returning the
/// address (without zone) on success.
pub(crate) fn validate_ipv6_literal(s: &str) -> Result<()> {
    if is_ipv6_valid_address(s) {
        Ok(())
    } else {
        Err(address_error(format!("invalid IPv6 address: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ipv6_accepts_compressed_and_zone() {
        assert!(is_ipv6_valid_address("::1"));
        assert!(is_ipv6_valid_address("fe80::1"));
        assert!(is_ipv6_valid_address("fe80::1%eth0"));
        assert!(is_ipv6_valid_address("2001:db8::8a2e:370:7334"));
        assert!(!is_ipv6_valid_address("not-an-address"));
        assert!(!is_ipv6_valid_address("fe80::1%"));
        assert!(!is_ipv6_valid_address("192.168.1.1"));
    }

    #[test]
    fn normalize_collapses_zero_runs_and_lowercases() {
        assert_eq!(normalize_address("FE80::0001%eth0"), "fe80::1%eth0");
        assert_eq!(normalize_address("2001:0DB8:0000:0000:0000:0000:0000:0001"), "2001:db8::1");
        assert_eq!(normalize_address("192.168.1.1"), "192.168.1.1");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["FE80::0001%eth0", "2001:0DB8::1", "not-ipv6", "::"] {
            let once = normalize_address(s);
            let twice = normalize_address(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn validity_preserved_across_normalization() {
        for s in ["FE80::0001%eth0", "2001:0DB8::1", "not-ipv6", "192.168.1.1"] {
            assert_eq!(is_ipv6_valid_address(s), is_ipv6_valid_address(&normalize_address(s)));
        }
    }

    #[test]
    fn link_local_detection() {
        assert!(is_link_local("fe80::1"));
        assert!(is_link_local("FE80::0001%eth0"));
        assert!(!is_link_local("fe90::1"));
        assert!(!is_link_local("2001:db8::1"));
        assert!(!is_link_local("not-ipv6"));
    }

    #[test]
    fn broadcast_detection() {
        assert!(is_broadcast("255.255.255.255"));
        assert!(is_broadcast("192.168.1.255"));
        assert!(is_broadcast("0.0.0.0"));
        assert!(!is_broadcast("192.168.1.1"));
    }

    #[test]
    fn storage_extraction() {
        let v4: SocketAddr = "192.168.1.1:80".parse().unwrap();
        assert_eq!(ip_from_storage(&v4).unwrap(), "192.168.1.1");

        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        assert_eq!(ip_from_storage(&v6).unwrap(), "::1");
    }

    proptest::proptest! {
        #[test]
        fn normalize_idempotent_on_random_ipv6(
            a in 0u16..=0xffff, b in 0u16..=0xffff, c in 0u16..=0xffff, d in 0u16..=0xffff,
            e in 0u16..=0xffff, f in 0u16..=0xffff, g in 0u16..=0xffff, h in 0u16..=0xffff,
        ) {
            let s = Ipv6Addr::new(a, b, c, d, e, f, g, h).to_string();
            let once = normalize_address(&s);
            let twice = normalize_address(&once);
            proptest::prop_assert_eq!(once, twice);
            proptest::prop_assert!(is_ipv6_valid_address(&s));
        }
    }
}

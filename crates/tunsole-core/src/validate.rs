// ── Address validation ──
//
// Pure normalizers for everything an operator types: route destinations,
// gateways and proxy endpoints. Each returns the validated form or an
// `InvalidAddress` naming the field; nothing is silently dropped.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::CoreError;
use crate::model::{Cidr, Host, HostPort};

const MAX_DNS_NAME_LEN: usize = 253;
const MAX_DNS_LABEL_LEN: usize = 63;

/// Parse a route destination.
///
/// A bare address gets a host prefix (`/32`, or `/128` for IPv6). An
/// explicit prefix is kept exactly as given, host bits included.
pub fn normalize_cidr(input: &str) -> Result<Cidr, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid("cidr", input, "must not be empty"));
    }

    let Some((addr_part, prefix_part)) = trimmed.split_once('/') else {
        let addr = parse_ip("cidr", input, trimmed)?;
        let net = IpNet::new(addr, max_prefix(addr))
            .map_err(|e| CoreError::invalid("cidr", input, e.to_string()))?;
        return Ok(Cidr::new(net));
    };

    let addr = parse_ip("cidr", input, addr_part)?;

    if prefix_part.is_empty() || !prefix_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::invalid(
            "cidr",
            input,
            "prefix length must be a number",
        ));
    }
    // Otherwise "/08" would come back rendered as "/8".
    if prefix_part.len() > 1 && prefix_part.starts_with('0') {
        return Err(CoreError::invalid(
            "cidr",
            input,
            "prefix length must not have leading zeros",
        ));
    }
    let max = max_prefix(addr);
    let prefix = prefix_part
        .parse::<u8>()
        .ok()
        .filter(|p| *p <= max)
        .ok_or_else(|| {
            CoreError::invalid("cidr", input, format!("prefix length must be 0-{max}"))
        })?;

    let net =
        IpNet::new(addr, prefix).map_err(|e| CoreError::invalid("cidr", input, e.to_string()))?;
    Ok(Cidr::new(net))
}

/// Inline correction applied while editing: append `/32` to a non-empty
/// value that has no prefix yet. Anything else is returned untouched.
pub fn complete_cidr(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.contains('/') {
        input.to_owned()
    } else {
        format!("{trimmed}/32")
    }
}

/// Parse a gateway: a bare IP literal, no prefix.
pub fn normalize_gateway(input: &str) -> Result<IpAddr, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid("gateway", input, "must not be empty"));
    }
    parse_ip("gateway", input, trimmed)
}

/// Parse a proxy endpoint as `host:port`. IPv6 hosts must be bracketed.
pub fn normalize_host_port(input: &str) -> Result<HostPort, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid("address", input, "must not be empty"));
    }

    let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
        let (inner, after) = rest.split_once(']').ok_or_else(|| {
            CoreError::invalid("address", input, "unterminated '[' in IPv6 host")
        })?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| CoreError::invalid("address", input, "missing port"))?;
        let addr: std::net::Ipv6Addr = inner
            .parse()
            .map_err(|_| CoreError::invalid("address", input, "bracketed host must be IPv6"))?;
        (Host::Ip(IpAddr::V6(addr)), port)
    } else {
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| CoreError::invalid("address", input, "missing port"))?;
        if host.contains(':') {
            return Err(CoreError::invalid(
                "address",
                input,
                "IPv6 hosts must be written as [addr]:port",
            ));
        }
        (parse_host(input, host)?, port)
    };

    Ok(HostPort {
        host,
        port: parse_port(input, port)?,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────

fn max_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn parse_ip(field: &'static str, input: &str, candidate: &str) -> Result<IpAddr, CoreError> {
    candidate
        .parse()
        .map_err(|_| CoreError::invalid(field, input, format!("'{candidate}' is not an IP address")))
}

fn parse_port(input: &str, port: &str) -> Result<u16, CoreError> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::invalid("address", input, "port must be a number"));
    }
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| CoreError::invalid("address", input, "port must be 1-65535"))
}

fn parse_host(input: &str, host: &str) -> Result<Host, CoreError> {
    if host.is_empty() {
        return Err(CoreError::invalid("address", input, "missing host"));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Host::Ip(ip));
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.iter().all(|l| !l.is_empty() && l.bytes().all(|b| b.is_ascii_digit())) {
        return Err(CoreError::invalid(
            "address",
            input,
            format!("'{host}' is not a valid IPv4 address"),
        ));
    }

    let valid_label = |label: &&str| {
        !label.is_empty()
            && label.len() <= MAX_DNS_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    };
    if host.len() > MAX_DNS_NAME_LEN || !labels.iter().all(valid_label) {
        return Err(CoreError::invalid(
            "address",
            input,
            format!("'{host}' is not a valid host name"),
        ));
    }

    Ok(Host::Name(host.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::net::{Ipv4Addr, Ipv6Addr};

    use proptest::prelude::*;

    use super::*;

    fn reason(err: CoreError) -> (&'static str, String) {
        match err {
            CoreError::InvalidAddress { field, reason, .. } => (field, reason),
            other => panic!("expected InvalidAddress, got {other:?}"),
        }
    }

    // ── normalize_cidr ──────────────────────────────────────────────

    #[test]
    fn bare_ipv4_gets_host_prefix() {
        assert_eq!(normalize_cidr("192.168.1.5").unwrap().to_string(), "192.168.1.5/32");
        assert_eq!(normalize_cidr("  10.0.0.1 ").unwrap().to_string(), "10.0.0.1/32");
    }

    #[test]
    fn bare_ipv6_gets_128() {
        assert_eq!(normalize_cidr("fd00::1").unwrap().to_string(), "fd00::1/128");
    }

    #[test]
    fn explicit_prefix_preserves_host_bits() {
        assert_eq!(normalize_cidr("192.168.1.5/24").unwrap().to_string(), "192.168.1.5/24");
        assert_eq!(normalize_cidr("0.0.0.0/0").unwrap().to_string(), "0.0.0.0/0");
    }

    #[test]
    fn rejects_bad_cidrs() {
        for bad in ["", "   ", "300.1.1.1", "10.0.0.0/33", "10.0.0.0/", "10.0.0.0/+8", "fd00::/129", "example.com/8", "1.2.3.4/8/8"] {
            let (field, _) = reason(normalize_cidr(bad).unwrap_err());
            assert_eq!(field, "cidr", "input {bad:?}");
        }
    }

    #[test]
    fn leading_zero_prefix_is_rejected_not_rewritten() {
        for bad in ["10.0.0.0/08", "10.0.0.0/00", "fd00::/064"] {
            let (field, why) = reason(normalize_cidr(bad).unwrap_err());
            assert_eq!(field, "cidr");
            assert!(why.contains("leading zeros"), "{bad}: {why}");
        }
        assert_eq!(normalize_cidr("10.0.0.0/0").unwrap().to_string(), "10.0.0.0/0");
    }

    #[test]
    fn complete_cidr_only_touches_bare_values() {
        assert_eq!(complete_cidr("192.168.1.5"), "192.168.1.5/32");
        assert_eq!(complete_cidr("10.0.0.0/8"), "10.0.0.0/8");
        assert_eq!(complete_cidr(""), "");
    }

    // ── normalize_gateway ───────────────────────────────────────────

    #[test]
    fn gateway_is_bare_ip() {
        assert_eq!(
            normalize_gateway("198.18.0.1").unwrap(),
            IpAddr::V4(Ipv4Addr::new(198, 18, 0, 1))
        );
        assert_eq!(reason(normalize_gateway("198.18.0.1/15").unwrap_err()).0, "gateway");
    }

    // ── normalize_host_port ─────────────────────────────────────────

    #[test]
    fn host_port_accepts_ip_name_and_bracketed_v6() {
        let hp = normalize_host_port("127.0.0.1:7891").unwrap();
        assert_eq!(hp.port, 7891);
        assert_eq!(hp.to_string(), "127.0.0.1:7891");

        let hp = normalize_host_port("Proxy.LAN:3128").unwrap();
        assert_eq!(hp.host, Host::Name("proxy.lan".into()));

        let hp = normalize_host_port("[::1]:1080").unwrap();
        assert_eq!(hp.host, Host::Ip(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(hp.to_string(), "[::1]:1080");
    }

    #[test]
    fn host_port_rejections_name_the_problem() {
        let cases = [
            ("127.0.0.1", "missing port"),
            (":1080", "missing host"),
            ("host:0", "port must be 1-65535"),
            ("host:70000", "port must be 1-65535"),
            ("host:abc", "port must be a number"),
            ("::1:1080", "IPv6 hosts must be written as [addr]:port"),
            ("[127.0.0.1]:80", "bracketed host must be IPv6"),
        ];
        for (input, expected) in cases {
            let (field, why) = reason(normalize_host_port(input).unwrap_err());
            assert_eq!(field, "address");
            assert_eq!(why, expected, "input {input:?}");
        }
        let (_, why) = reason(normalize_host_port("999.1.1.1:80").unwrap_err());
        assert!(why.contains("not a valid IPv4 address"));
        let (_, why) = reason(normalize_host_port("bad_host:80").unwrap_err());
        assert!(why.contains("not a valid host name"));
    }

    // ── Properties ──────────────────────────────────────────────────

    proptest! {
        #[test]
        fn bare_v4_always_becomes_slash_32(octets in any::<[u8; 4]>()) {
            let addr = Ipv4Addr::from(octets);
            let cidr = normalize_cidr(&addr.to_string()).unwrap();
            prop_assert_eq!(cidr.to_string(), format!("{addr}/32"));
            prop_assert_eq!(cidr.prefix_len(), 32);
        }

        #[test]
        fn explicit_prefix_is_preserved(octets in any::<[u8; 4]>(), prefix in 0u8..=32) {
            let input = format!("{}/{prefix}", Ipv4Addr::from(octets));
            let cidr = normalize_cidr(&input).unwrap();
            prop_assert_eq!(cidr.to_string(), input);
        }

        #[test]
        fn valid_ports_round_trip(port in 1u16..=u16::MAX) {
            let hp = normalize_host_port(&format!("127.0.0.1:{port}")).unwrap();
            prop_assert_eq!(hp.port, port);
        }
    }
}

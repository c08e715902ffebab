//! Host address classification.

use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass {
    /// This machine
    Loopback,
    /// RFC 1918, link-local, unique-local, or a LAN-only hostname
    Private,
    Public,
}

impl HostClass {
    pub fn is_private_or_local(&self) -> bool {
        matches!(self, HostClass::Loopback | HostClass::Private)
    }
}

pub fn classify_host(host: &str) -> HostClass {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');

    if host.eq_ignore_ascii_case("localhost") {
        return HostClass::Loopback;
    }

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            if ip.is_loopback() {
                HostClass::Loopback
            } else if ip.is_private() || ip.is_link_local() {
                HostClass::Private
            } else {
                HostClass::Public
            }
        }
        Ok(IpAddr::V6(ip)) => {
            if ip.is_loopback() {
                HostClass::Loopback
            } else if (ip.segments()[0] & 0xfe00) == 0xfc00
                || (ip.segments()[0] & 0xffc0) == 0xfe80
            {
                // fc00::/7 unique local, fe80::/10 link local
                HostClass::Private
            } else {
                HostClass::Public
            }
        }
        Err(_) => {
            let lower = host.to_ascii_lowercase();
            if lower.ends_with(".local")
                || lower.ends_with(".lan")
                || lower.ends_with(".internal")
                || !lower.contains('.')
            {
                HostClass::Private
            } else {
                HostClass::Public
            }
        }
    }
}

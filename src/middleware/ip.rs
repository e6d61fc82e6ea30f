//! Client IP resolution and the IP allow-list.
//!
//! # Resolution Order
//!
//! 1. `X-Forwarded-For`: first comma-separated entry, trimmed
//! 2. `X-Real-IP`: trimmed
//! 3. The transport peer address (`ConnectInfo<SocketAddr>`)
//! 4. [`UNKNOWN_IP`]
//!
//! A header is skipped when it is blank or holds the literal `unknown`
//! (some proxies write that placeholder when they cannot see the client).
//!
//! # Security Warning: IP Spoofing Risk
//!
//! The forwarding headers are client-controlled unless a reverse proxy
//! overwrites them. When the allow-list is enabled, deploy behind a proxy
//! that sets both headers from the real peer address:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! # Allow-list Matching
//!
//! Matching is exact string membership. There is no CIDR support and IPv6
//! addresses are not normalised, so `::1` and `0:0:0:0:0:0:0:1` are
//! different entries.

use std::borrow::Cow;
use std::collections::HashSet;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::debug;

/// Fallback value when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Header set by proxies with the client and proxy chain.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Header set by some proxies with the single client address.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Where the resolved client IP came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedIp<'a> {
    /// First entry of X-Forwarded-For.
    FromXff(&'a str),
    /// X-Real-IP header.
    FromRealIp(&'a str),
    /// Transport-level peer address.
    FromPeer(SocketAddr),
    /// Nothing usable.
    NotFound,
}

/// A forwarding header value that names a real address.
#[inline]
fn usable(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && !value.eq_ignore_ascii_case(UNKNOWN_IP)).then_some(value)
}

#[inline]
fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

#[inline]
fn resolve<B>(req: &Request<B>) -> ResolvedIp<'_> {
    if let Some(first) = header_str(req, FORWARDED_FOR_HEADER)
        .and_then(|value| value.split(',').next())
        .and_then(usable)
    {
        return ResolvedIp::FromXff(first);
    }

    if let Some(real_ip) = header_str(req, REAL_IP_HEADER).and_then(usable) {
        return ResolvedIp::FromRealIp(real_ip);
    }

    if let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return ResolvedIp::FromPeer(*peer);
    }

    ResolvedIp::NotFound
}

/// Resolve the client IP for a request.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` when nothing is available, so the
/// common fallback does not allocate.
pub fn resolve_client_ip<B>(req: &Request<B>) -> Cow<'static, str> {
    match resolve(req) {
        ResolvedIp::FromXff(ip) | ResolvedIp::FromRealIp(ip) => Cow::Owned(ip.to_string()),
        ResolvedIp::FromPeer(peer) => Cow::Owned(peer.ip().to_string()),
        ResolvedIp::NotFound => {
            debug!("No forwarding headers or peer address, client IP unknown");
            Cow::Borrowed(UNKNOWN_IP)
        }
    }
}

/// Optional exact-match IP allow-list.
#[derive(Debug, Clone, Default)]
pub struct IpAllowList {
    enabled: bool,
    addresses: HashSet<String>,
}

impl IpAllowList {
    /// Build an allow-list. Entries are trimmed; blank entries are dropped.
    pub fn new<I, S>(enabled: bool, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .map(|ip| ip.as_ref().trim().to_string())
            .filter(|ip| !ip.is_empty())
            .collect();
        Self { enabled, addresses }
    }

    /// Whether the list actually restricts anything.
    ///
    /// An enabled but empty list admits every address.
    pub fn is_enforced(&self) -> bool {
        self.enabled && !self.addresses.is_empty()
    }

    /// Whether `client_ip` may proceed.
    pub fn is_allowed(&self, client_ip: &str) -> bool {
        !self.is_enforced() || self.addresses.contains(client_ip)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn peer(addr: &str) -> ConnectInfo<SocketAddr> {
        ConnectInfo(addr.parse().unwrap())
    }

    #[test]
    fn test_xff_first_entry_trimmed() {
        let req = Request::builder()
            .header("x-forwarded-for", "  192.168.1.1  , 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve_client_ip(&req), "192.168.1.1");
    }

    #[test]
    fn test_xff_priority_over_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "192.168.1.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve_client_ip(&req), "10.0.0.1");
    }

    #[test]
    fn test_unknown_xff_falls_back_to_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "unknown")
            .header("x-real-ip", " 192.168.1.7 ")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve_client_ip(&req), "192.168.1.7");
    }

    #[test]
    fn test_blank_headers_fall_back_to_peer() {
        let mut req = Request::builder()
            .header("x-forwarded-for", "   ")
            .header("x-real-ip", "UNKNOWN")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(peer("172.16.0.9:51234"));

        assert_eq!(resolve_client_ip(&req), "172.16.0.9");
    }

    #[test]
    fn test_ipv6_peer() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(peer("[::1]:8080"));

        assert_eq!(resolve_client_ip(&req), "::1");
    }

    #[test]
    fn test_nothing_available_is_borrowed_unknown() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let ip = resolve_client_ip(&req);
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_xff_with_port_passed_through() {
        let req = Request::builder()
            .header("x-forwarded-for", "192.168.1.1:8080, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve_client_ip(&req), "192.168.1.1:8080");
    }

    #[test]
    fn test_allow_list_disabled_admits_all() {
        let list = IpAllowList::new(false, ["10.0.0.1"]);
        assert!(!list.is_enforced());
        assert!(list.is_allowed("8.8.8.8"));
        assert!(IpAllowList::default().is_allowed(UNKNOWN_IP));
    }

    #[test]
    fn test_allow_list_enabled_but_empty_admits_all() {
        let list = IpAllowList::new(true, Vec::<String>::new());
        assert!(!list.is_enforced());
        assert!(list.is_allowed("8.8.8.8"));
    }

    #[test]
    fn test_allow_list_exact_match_only() {
        let list = IpAllowList::new(true, [" 10.0.0.1 ", "::1", ""]);
        assert!(list.is_enforced());
        assert!(list.is_allowed("10.0.0.1"));
        assert!(list.is_allowed("::1"));
        assert!(!list.is_allowed("10.0.0.2"));
        assert!(!list.is_allowed("10.0.0.1:443"));
        assert!(!list.is_allowed("0:0:0:0:0:0:0:1"));
        assert!(!list.is_allowed(UNKNOWN_IP));
    }
}

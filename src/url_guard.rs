//! Checks applied to externally hosted media URLs before they are stored.

use std::net::{IpAddr, Ipv4Addr};

use url::{Host, Url};

/// Returns true when `raw` is an http(s) URL that points at a public host.
///
/// Rejected:
/// - non-http schemes and URLs without a host
/// - loopback, private, link-local and unspecified addresses
/// - the cloud metadata endpoint (169.254.169.254)
/// - `localhost`, `*.localhost`, `*.local` and `*.internal` hostnames
///
/// Hostnames are checked by name only and never resolved, so a public name
/// whose DNS record points at a private address is accepted. The server
/// only stores and redirects to these URLs; it never fetches them.
#[must_use]
pub fn is_allowed_media_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return false;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    match parsed.host() {
        None => false,
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
            {
                return false;
            }
            domain.parse::<IpAddr>().map_or(true, is_public_ip)
        }
        Some(Host::Ipv4(ip)) => is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_public_ip(IpAddr::V6(ip)),
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            !v4.is_loopback()
                && !v4.is_private()
                && !v4.is_link_local()
                && !v4.is_unspecified()
                && !v4.is_broadcast()
                && v4 != Ipv4Addr::new(169, 254, 169, 254)
                // 100.64.0.0/10
                && !(octets[0] == 100 && (octets[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(mapped));
            }
            !v6.is_loopback()
                && !v6.is_unspecified()
                && (v6.segments()[0] & 0xfe00) != 0xfc00
                && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    }
}

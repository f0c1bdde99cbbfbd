//! Checks on webhook target URLs. Hosts are judged by their literal form;
//! no DNS lookups happen here.

use std::net::{IpAddr, Ipv6Addr};

use url::{Host, Url};

pub const MAX_TARGET_URL_LEN: usize = 2048;

/// Hostnames that always point inside the deployment.
const INTERNAL_HOSTNAMES: &[&str] = &["localhost", "metadata.google.internal"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetUrlError {
    #[error("url is required")]
    Empty,

    #[error("url must be at most {MAX_TARGET_URL_LEN} characters")]
    TooLong,

    #[error("invalid url: {0}")]
    Malformed(String),

    #[error("url scheme must be http or https, got {0}")]
    Scheme(String),

    #[error("url must have a host")]
    MissingHost,

    #[error("url must not target internal host {0}")]
    InternalHost(String),
}

/// Parse and check a target URL. Private, loopback and link-local targets
/// are refused unless `allow_private_hosts` is set.
pub fn check_target_url(raw: &str, allow_private_hosts: bool) -> Result<Url, TargetUrlError> {
    if raw.is_empty() {
        return Err(TargetUrlError::Empty);
    }
    if raw.len() > MAX_TARGET_URL_LEN {
        return Err(TargetUrlError::TooLong);
    }

    let url = Url::parse(raw).map_err(|e| TargetUrlError::Malformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TargetUrlError::Scheme(url.scheme().to_owned()));
    }
    let host = url.host().ok_or(TargetUrlError::MissingHost)?;

    if !allow_private_hosts && is_internal_host(&host) {
        return Err(TargetUrlError::InternalHost(host.to_string()));
    }
    Ok(url)
}

fn is_internal_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            INTERNAL_HOSTNAMES.contains(&name.as_str()) || name.ends_with(".localhost")
        }
        Host::Ipv4(v4) => is_private_ip(IpAddr::V4(*v4)),
        Host::Ipv6(v6) => is_private_ip(IpAddr::V6(*v6)),
    }
}

/// Loopback, private, link-local, unspecified and broadcast ranges, plus
/// IPv4-mapped IPv6 forms of them.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_ip(IpAddr::V4(v4)),
            None => v6.is_loopback() || v6.is_unspecified() || is_local_v6(v6),
        },
    }
}

/// `fc00::/7` unique-local or `fe80::/10` link-local.
fn is_local_v6(v6: Ipv6Addr) -> bool {
    let first = v6.segments()[0];
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

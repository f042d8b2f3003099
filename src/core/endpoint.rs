use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// Default port for a scheme when the URL carries none.
///
/// `http` resolves to 80, `https` to 443, anything else to 0.
pub fn resolve_port(scheme: &str, port: Option<u16>) -> u16 {
    match port {
        Some(port) if port != 0 => port,
        _ => match scheme {
            "http" => 80,
            "https" => 443,
            _ => 0,
        },
    }
}

/// Whether the authority of `raw` spells out a port
fn has_explicit_port(raw: &str) -> bool {
    let Some((_, rest)) = raw.trim().split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let after_host = host_port.rsplit_once(']').map_or(host_port, |(_, tail)| tail);
    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty())
}

/// A parsed `scheme://host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: String,
    /// Host name or IP literal, IPv6 without brackets
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse a URL into a host and a port, applying the scheme default port.
    ///
    /// Fails when the URL does not parse, has no host, or has neither an explicit port
    /// nor a scheme with a known default.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => String::new(),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        // `Url::port` hides a port equal to the scheme default, so the default is read back
        // for http(s) and for ports written out; other schemes get no default
        let scheme = url.scheme().to_string();
        let port = if matches!(scheme.as_str(), "http" | "https") || has_explicit_port(raw) {
            url.port_or_known_default()
        } else {
            None
        };
        let port = resolve_port(&scheme, port);
        if port == 0 {
            return Err(invalid("missing port for scheme without a default port"));
        }

        Ok(Self { scheme, host, port })
    }

    /// Host formatted for use inside a URL authority
    pub fn authority_host(&self) -> String {
        format_host(&self.host)
    }

    /// Base URL for plain HTTP access; any scheme other than `https` maps to `http`
    pub fn http_base(&self) -> String {
        let scheme = if self.scheme == "https" {
            "https"
        } else {
            "http"
        };
        format!("{}://{}:{}", scheme, self.authority_host(), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.authority_host(), self.port)
    }
}

/// Wrap IPv6 literals in brackets
pub(crate) fn format_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

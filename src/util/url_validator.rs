use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Why a feed source URL was refused.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Only http and https sources are fetched.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, private, link-local or unspecified address.
    #[error("Refusing to fetch from internal address: {0}")]
    InternalAddress(String),
}

/// Checks that a feed source URL points at a public http(s) host.
///
/// `localhost`, loopback, RFC 1918, link-local, unique-local IPv6 and
/// unspecified addresses are refused. Host names other than `localhost` are
/// not resolved, so this is a guard against typos and obvious SSRF targets,
/// not against DNS rebinding.
///
/// # Examples
///
/// ```
/// use feedmend::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed").is_err());
/// assert!(validate_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(source: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(source)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }

    let internal = match url.host().ok_or(UrlValidationError::MissingHost)? {
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost").then(|| name.to_owned()),
        Host::Ipv4(ip) => is_internal(IpAddr::V4(ip)).then(|| ip.to_string()),
        Host::Ipv6(ip) => is_internal(IpAddr::V6(ip)).then(|| ip.to_string()),
    };

    match internal {
        Some(host) => Err(UrlValidationError::InternalAddress(host)),
        None => Ok(url),
    }
}

fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://news.example.org").is_ok());
        assert!(validate_url("https://example.com:443/rss").is_ok());
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_url("ftp://example.com/feed").is_err());
    }

    #[test]
    fn test_relative_path_is_invalid() {
        assert!(matches!(
            validate_url("feeds/local.xml"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_internal_hosts_rejected() {
        for url in [
            "http://localhost/feed",
            "http://LOCALHOST:8080/feed",
            "http://127.0.0.1/feed",
            "http://10.0.0.1:3000/feed",
            "http://172.16.0.1/feed",
            "http://192.168.1.1/feed",
            "http://169.254.1.1/feed",
            "http://0.0.0.0/feed",
            "http://[::1]/feed",
            "http://[fe80::1]/feed",
            "http://[fd00::1]/feed",
        ] {
            assert!(
                matches!(validate_url(url), Err(UrlValidationError::InternalAddress(_))),
                "{url} should be refused"
            );
        }
    }
}

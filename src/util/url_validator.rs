use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// Parsing and scheme failures are the baseline contract; the host checks
/// are an opt-in SSRF guard applied by the engine when configured.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a raw request URL.
///
/// The string must parse as an absolute URL and its scheme must be exactly
/// `http` or `https`. No normalization is applied to the caller's string;
/// the returned [`Url`] is only used for resolution and fetching.
///
/// # Errors
///
/// - [`UrlValidationError::InvalidUrl`] if the string is not an absolute URL
/// - [`UrlValidationError::UnsupportedScheme`] for any other scheme
///
/// # Examples
///
/// ```
/// use feedscout::util::validate_url;
///
/// let url = validate_url("https://example.com/news").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("ftp://example.com").is_err());
/// assert!(validate_url("/relative/path").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Rejects URLs whose host is localhost or a private/internal IP literal.
///
/// Used as an SSRF guard before the server fetches anything on behalf of a
/// caller. Hostnames are not resolved; only literal addresses are checked.
///
/// # Errors
///
/// - [`UrlValidationError::Localhost`] for `localhost` and loopback addresses
/// - [`UrlValidationError::PrivateIp`] for RFC 1918, link-local, unique local
///   and unspecified addresses
pub fn reject_private_host(url: &Url) -> Result<(), UrlValidationError> {
    let Some(host) = url.host_str() else {
        return Ok(());
    };

    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

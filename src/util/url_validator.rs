use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating an API base URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a remote host would leak the bearer token.
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    Insecure,
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates the base URL of an authenticated API (TMDB, Discord).
///
/// Tokens are attached to every request made against the base, so plain
/// `http://` is only accepted for loopback hosts, which is what the HTTP
/// mocks in tests bind to. A trailing slash is appended when missing so that
/// relative joins keep the base path (`https://api.themoviedb.org/3/`).
///
/// # Examples
///
/// ```
/// use episodic::util::validate_api_base;
///
/// let url = validate_api_base("https://api.themoviedb.org/3").unwrap();
/// assert_eq!(url.as_str(), "https://api.themoviedb.org/3/");
///
/// assert!(validate_api_base("http://127.0.0.1:8080").is_ok());
/// assert!(validate_api_base("http://api.example.com").is_err());
/// assert!(validate_api_base("file:///etc/passwd").is_err());
/// ```
pub fn validate_api_base(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => {}
        "http" => {
            let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
            if !is_loopback_host(host) {
                return Err(UrlValidationError::Insecure);
            }
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host_for_parse
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        let url = validate_api_base("https://discord.com/api/v10").unwrap();
        assert_eq!(url.as_str(), "https://discord.com/api/v10/");
    }

    #[test]
    fn test_trailing_slash_preserved() {
        let url = validate_api_base("https://api.themoviedb.org/3/").unwrap();
        assert_eq!(url.as_str(), "https://api.themoviedb.org/3/");
        assert_eq!(
            url.join("tv/1399").unwrap().as_str(),
            "https://api.themoviedb.org/3/tv/1399"
        );
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_api_base("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_api_base("ftp://example.com").is_err());
    }

    #[test]
    fn test_plain_http_rejected_for_remote_hosts() {
        assert!(matches!(
            validate_api_base("http://api.themoviedb.org/3"),
            Err(UrlValidationError::Insecure)
        ));
        assert!(matches!(
            validate_api_base("http://192.168.1.1:8080"),
            Err(UrlValidationError::Insecure)
        ));
    }

    #[test]
    fn test_plain_http_allowed_for_loopback() {
        assert!(validate_api_base("http://localhost:3000").is_ok());
        assert!(validate_api_base("http://127.0.0.1:3000").is_ok());
        assert!(validate_api_base("http://[::1]:3000").is_ok());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_api_base("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}

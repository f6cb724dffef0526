//! Request target URI (`htu`) construction and comparison.

use axum::http::{HeaderMap, Uri, header};
use url::Url;

/// Absolute URI of the current request, as a client would have addressed it.
///
/// `public_base_url` wins when configured. Otherwise the proxy headers
/// (`X-Forwarded-Proto`, `X-Forwarded-Host`) and then `Host` are used.
pub fn expected_htu(public_base_url: Option<&str>, headers: &HeaderMap, uri: &Uri) -> String {
    if let Some(base) = public_base_url {
        if let Ok(url) = htu_from_base(base, uri) {
            return url;
        }
        tracing::warn!(base, "PUBLIC_BASE_URL is not an absolute URL, using request headers");
    }
    htu_from_forwarded(headers, uri)
}

fn htu_from_base(base: &str, uri: &Uri) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    if url.cannot_be_a_base() {
        return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
    }

    // Keep a path prefix from the base (e.g. https://host/auth) in front of the request path.
    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}{}", uri.path()));
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

fn htu_from_forwarded(headers: &HeaderMap, uri: &Uri) -> String {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            // Proxies append; the left-most value is the client-facing one.
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = first("x-forwarded-proto").unwrap_or("http");
    let host = first("x-forwarded-host")
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        })
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    format!("{scheme}://{host}{}", uri.path())
}

/// Canonical form used only for equality comparison of `htu` values.
///
/// Lower-cases scheme and host, drops default ports, turns an empty path
/// into `/` and removes query and fragment. `None` if `htu` is not an
/// absolute http(s) URI.
pub fn normalize_htu(htu: &str) -> Option<String> {
    let url = Url::parse(htu).ok()?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();

    // `Url` already lower-cases the scheme and strips the scheme's default port.
    let mut out = format!("{scheme}://{host}");
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path();
    out.push_str(if path.is_empty() { "/" } else { path });

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_public_base_url_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:4000"));

        assert_eq!(
            expected_htu(
                Some("https://auth.example.com"),
                &headers,
                &uri("/api/v1/token?x=1")
            ),
            "https://auth.example.com/api/v1/token"
        );
    }

    #[test]
    fn test_public_base_url_path_prefix_is_kept() {
        assert_eq!(
            expected_htu(
                Some("https://example.com/auth/"),
                &HeaderMap::new(),
                &uri("/api/v1/token")
            ),
            "https://example.com/auth/api/v1/token"
        );
    }

    #[test]
    fn test_invalid_base_falls_back_to_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:4000"));

        assert_eq!(
            expected_htu(Some("not a url"), &headers, &uri("/api/v1/token")),
            "http://localhost:4000/api/v1/token"
        );
    }

    #[test]
    fn test_forwarded_headers_take_precedence_over_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:4000"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert(
            "x-forwarded-host",
            HeaderValue::from_static("auth.example.com, proxy.internal"),
        );

        assert_eq!(
            expected_htu(None, &headers, &uri("/api/v1/token")),
            "https://auth.example.com/api/v1/token"
        );
    }

    #[test]
    fn test_missing_host_uses_localhost() {
        assert_eq!(
            expected_htu(None, &HeaderMap::new(), &uri("/token")),
            "http://localhost/token"
        );
    }

    #[test]
    fn test_normalize_strips_query_fragment_and_default_port() {
        assert_eq!(
            normalize_htu("HTTPS://Server.Example.COM:443/token?a=b#frag").as_deref(),
            Some("https://server.example.com/token")
        );
        assert_eq!(
            normalize_htu("http://example.com:80").as_deref(),
            Some("http://example.com/")
        );
        assert_eq!(
            normalize_htu("http://example.com:8080/token").as_deref(),
            Some("http://example.com:8080/token")
        );
    }

    #[test]
    fn test_normalize_keeps_path_case() {
        assert_ne!(normalize_htu("https://a.example/Token"), normalize_htu("https://a.example/token"));
    }

    #[test]
    fn test_normalize_rejects_non_http_and_relative() {
        assert_eq!(normalize_htu("/api/v1/token"), None);
        assert_eq!(normalize_htu("mailto:someone@example.com"), None);
        assert_eq!(normalize_htu("ftp://example.com/token"), None);
        assert_eq!(normalize_htu(""), None);
    }
}

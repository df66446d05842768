//! Cache key derivation and Vary-based variant matching.

use std::collections::HashMap;

use http::HeaderMap;
use url::Url;

use crate::error::BadRequest;

/// Normalizes a request URL into the string used as the primary store key:
/// lowercased scheme and authority, `/` for an empty path, query preserved
/// verbatim, fragment discarded.
pub fn cache_key(url: &str) -> Result<String, BadRequest> {
    let parsed = Url::parse(url).map_err(|e| BadRequest(e.to_string()))?;
    if !parsed.has_authority() {
        return Err(BadRequest(format!("url has no authority: {url}")));
    }
    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str().ok_or_else(|| BadRequest(format!("url has no host: {url}")))?;
    let authority = match parsed.port() {
        Some(p) => format!("{}:{}", host.to_ascii_lowercase(), p),
        None => host.to_ascii_lowercase(),
    };
    let mut path = parsed.path().to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    let mut key = format!("{scheme}://{authority}{path}");
    if let Some(q) = parsed.query() {
        key.push('?');
        key.push_str(q);
    }
    Ok(key)
}

/// Snapshot of the request headers named by a stored response's `Vary`
/// header, taken at write time. An empty map means the response had no
/// `Vary` header and matches any request.
pub type VaryMap = HashMap<String, String>;

/// Builds a [`VaryMap`] from a response's `Vary` header value and the
/// request headers that produced the cached response. Returns `None` if the
/// response varies on `*`, which the caller must treat as unsatisfiable and
/// never store.
pub fn build_vary_map(vary_header: Option<&str>, request_headers: &HeaderMap) -> Option<VaryMap> {
    let Some(vary) = vary_header else {
        return Some(VaryMap::new());
    };
    let mut map = VaryMap::new();
    for name in vary.split(',').map(|s| s.trim()) {
        if name.is_empty() {
            continue;
        }
        if name == "*" {
            return None;
        }
        let value = request_headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        map.insert(name.to_ascii_lowercase(), value);
    }
    Some(map)
}

/// Returns true if `request_headers` matches every entry recorded in
/// `vary_map` (I2). An empty map always matches.
pub fn vary_matches(vary_map: &VaryMap, request_headers: &HeaderMap) -> bool {
    vary_map.iter().all(|(name, expected)| {
        let actual = request_headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        actual == expected
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn normalizes_scheme_and_authority_case() {
        assert_eq!(
            cache_key("HTTP://Example.com").unwrap(),
            cache_key("http://example.com/").unwrap()
        );
    }

    #[test]
    fn different_hosts_yield_different_keys() {
        assert_ne!(cache_key("http://a/").unwrap(), cache_key("http://b/").unwrap());
    }

    #[test]
    fn preserves_query_string() {
        assert_eq!(cache_key("http://a/p?x=1").unwrap(), "http://a/p?x=1");
    }

    #[test]
    fn rejects_relative_url() {
        assert!(cache_key("/just/a/path").is_err());
    }

    #[test]
    fn vary_star_is_none() {
        let req = HeaderMap::new();
        assert!(build_vary_map(Some("*"), &req).is_none());
    }

    #[test]
    fn vary_mismatch_fails_match() {
        let mut req = HeaderMap::new();
        req.insert("accept", HeaderValue::from_static("application/json"));
        let map = build_vary_map(Some("Accept"), &req).unwrap();

        let mut other = HeaderMap::new();
        other.insert("accept", HeaderValue::from_static("text/html"));
        assert!(!vary_matches(&map, &other));
        assert!(vary_matches(&map, &req));
    }
}

//! Pure RFC 7234 decision functions. No I/O, no mutable state: every function
//! takes the inputs it needs and returns a decision.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use http::{HeaderMap, Method, StatusCode};

use crate::directive::Directives;

/// Tunable policy knobs, owned by the controller and passed to every call.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub cacheable_methods: HashSet<Method>,
    pub cacheable_status_codes: HashSet<u16>,
    /// Fraction of (Date - Last-Modified) used as heuristic lifetime.
    pub heuristic_fraction: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            cacheable_methods: [Method::GET].into_iter().collect(),
            cacheable_status_codes: [200, 203, 300, 301, 308].into_iter().collect(),
            heuristic_fraction: 0.1,
        }
    }
}

fn cache_control(headers: &HeaderMap) -> Directives {
    headers
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(Directives::parse)
        .unwrap_or_default()
}

fn pragma(headers: &HeaderMap) -> Directives {
    headers
        .get(http::header::PRAGMA)
        .and_then(|v| v.to_str().ok())
        .map(Directives::parse)
        .unwrap_or_default()
}

fn parse_http_date(headers: &HeaderMap, name: http::header::HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| httpdate::parse_http_date(s).ok())
}

/// §4.4 `use_cache_for_request`.
pub fn use_cache_for_request(
    method: &Method,
    req_headers: &HeaderMap,
    opts: &CacheOptions,
) -> bool {
    if !opts.cacheable_methods.contains(method) {
        return false;
    }
    if cache_control(req_headers).contains("no-store") {
        return false;
    }
    if req_headers.contains_key(http::header::AUTHORIZATION) {
        return false;
    }
    true
}

/// Returns true if `headers` carries an explicit freshness hint (`max-age`
/// on `Cache-Control`, or `Expires`) that a heuristic must not override.
pub fn has_explicit_freshness(headers: &HeaderMap) -> bool {
    cache_control(headers).get_u64("max-age").is_some() || headers.contains_key(http::header::EXPIRES)
}

/// Returns true if `headers` carries `Cache-Control: no-store`.
pub fn is_no_store(headers: &HeaderMap) -> bool {
    cache_control(headers).contains("no-store")
}

/// §4.4 `response_expiration`. `max_age_override` is the request's own
/// `max-age`, which takes priority over the response's freshness hints.
/// `heuristic_fraction` is the fraction of `Date - Last-Modified` used as a
/// heuristic lifetime when no explicit freshness hint is present.
pub fn response_expiration(
    resp_headers: &HeaderMap,
    now: SystemTime,
    max_age_override: Option<u64>,
    heuristic_fraction: f64,
) -> Option<SystemTime> {
    let mut t0 = parse_http_date(resp_headers, http::header::DATE).unwrap_or(now);
    if let Some(age) = resp_headers
        .get(http::header::AGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        t0 = t0 + Duration::from_secs(age);
    }

    let resp_cc = cache_control(resp_headers);

    let lifetime: Option<Duration> = if let Some(max_age) = max_age_override {
        Some(Duration::from_secs(max_age))
    } else if let Some(max_age) = resp_cc.get_u64("max-age") {
        Some(Duration::from_secs(max_age))
    } else if let Some(expires) = parse_http_date(resp_headers, http::header::EXPIRES) {
        Some(expires.duration_since(t0).unwrap_or(Duration::ZERO))
    } else if let Some(last_modified) = parse_http_date(resp_headers, http::header::LAST_MODIFIED) {
        let age = t0.duration_since(last_modified).unwrap_or(Duration::ZERO);
        Some(age.mul_f64(heuristic_fraction))
    } else {
        None
    };

    lifetime.map(|l| t0 + l)
}

/// §4.4 `can_cache_response`.
pub fn can_cache_response(
    status: StatusCode,
    resp_headers: &HeaderMap,
    now: SystemTime,
    opts: &CacheOptions,
) -> bool {
    if !opts.cacheable_status_codes.contains(&status.as_u16()) {
        return false;
    }
    let resp_cc = cache_control(resp_headers);
    if resp_cc.contains("no-store") || resp_cc.contains("private") {
        return false;
    }
    if let Some(vary) = resp_headers
        .get(http::header::VARY)
        .and_then(|v| v.to_str().ok())
    {
        if vary.split(',').any(|v| v.trim() == "*") {
            return false;
        }
    }
    if status == StatusCode::MOVED_PERMANENTLY || status.as_u16() == 308 {
        return true;
    }
    match response_expiration(resp_headers, now, None, opts.heuristic_fraction) {
        Some(expiration) => now <= expiration,
        None => false,
    }
}

/// §4.4 `is_response_fresh`.
pub fn is_response_fresh(
    req_headers: &HeaderMap,
    resp_headers: &HeaderMap,
    status: StatusCode,
    now: SystemTime,
    opts: &CacheOptions,
) -> bool {
    let req_cc = cache_control(req_headers);
    if req_cc.contains("no-cache") {
        return false;
    }
    if !req_headers.contains_key(http::header::CACHE_CONTROL) && pragma(req_headers).contains("no-cache") {
        return false;
    }
    let resp_cc = cache_control(resp_headers);
    if resp_cc.contains("no-cache") || resp_cc.contains("must-revalidate") {
        return false;
    }
    if req_cc.get_u64("max-age") == Some(0) {
        return false;
    }
    if status == StatusCode::MOVED_PERMANENTLY || status.as_u16() == 308 {
        return true;
    }

    let expiration = match response_expiration(resp_headers, now, req_cc.get_u64("max-age"), opts.heuristic_fraction) {
        Some(e) => e,
        None => return false,
    };
    let expiration = match req_cc.get_u64("max-stale") {
        Some(stale) => expiration + Duration::from_secs(stale),
        None => expiration,
    };
    let horizon = match req_cc.get_u64("min-fresh") {
        Some(min_fresh) => now + Duration::from_secs(min_fresh),
        None => now,
    };
    horizon <= expiration
}

/// §4.4 `is_invalidating`: an unsafe method with a non-error response
/// invalidates whatever is stored at the same key.
pub fn is_invalidating(method: &Method, status: StatusCode) -> bool {
    let safe = method == Method::GET || method == Method::HEAD;
    !safe && status.as_u16() < 400
}

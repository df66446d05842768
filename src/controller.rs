//! The cache's top-level state machine: lookup, conditional-header
//! injection, 304 merging, invalidation, and write-back. Owns neither the
//! transport nor the store -- both are injected.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::body::BodyTap;
use crate::error::BoxError;
use crate::heuristic::{Heuristic, NoHeuristic};
use crate::key::cache_key;
use crate::policy::{self, CacheOptions};
use crate::serialize::{self, CachedEntry, ResponseMetadata};
use crate::store::CacheStore;

/// A response as handed back to the caller: an ordinary `http::Response`
/// plus a flag recording whether it came from the store.
pub struct CacheOutcome {
    pub response: Response<BoxBody<Bytes, BoxError>>,
    pub from_cache: bool,
}

impl std::fmt::Debug for CacheOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOutcome")
            .field("response", &self.response)
            .field("from_cache", &self.from_cache)
            .finish()
    }
}

/// The transport collaborator: sends a request and returns a response whose
/// body may still be in flight.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<BoxBody<Bytes, BoxError>>, BoxError>;
}

fn box_body<B>(body: B) -> BoxBody<Bytes, BoxError>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}

/// Headers that describe hop-by-hop framing, not content, and must not be
/// re-served from a cached entry whose body is already fully decoded and
/// un-chunked. `Content-Encoding` is deliberately excluded: this crate never
/// decompresses bodies, so the encoding still applies to the stored bytes
/// and must be preserved for a caller to interpret correctly.
const FRAMING_HEADERS: [http::header::HeaderName; 1] = [http::header::TRANSFER_ENCODING];

pub struct Controller<S> {
    store: Arc<S>,
    heuristic: Arc<dyn Heuristic>,
    opts: CacheOptions,
}

impl<S> std::fmt::Debug for Controller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("opts", &self.opts).finish_non_exhaustive()
    }
}

impl<S: CacheStore + 'static> Controller<S> {
    pub fn new(store: Arc<S>) -> Self {
        Controller { store, heuristic: Arc::new(NoHeuristic), opts: CacheOptions::default() }
    }

    pub fn with_options(store: Arc<S>, opts: CacheOptions) -> Self {
        Controller { store, heuristic: Arc::new(NoHeuristic), opts }
    }

    pub fn with_heuristic(mut self, heuristic: Arc<dyn Heuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    /// Releases the underlying store's resources.
    pub async fn close(&self) -> Result<(), BoxError> {
        self.store.close().await
    }

    async fn load(&self, key: &str, req_headers: &HeaderMap) -> Option<CachedEntry> {
        let bytes = match self.store.get(key).await {
            Ok(Some(b)) => b,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("cache store get({key}) failed: {e}");
                return None;
            }
        };
        let entry = serialize::decode(&bytes, req_headers);
        if entry.is_none() {
            log::warn!("cache entry deserialization failed for {key}, entry ignored");
        }
        entry
    }

    /// Advisory freshness-lifetime hint passed to the store, derived the same
    /// way cacheability itself is: `None` if the response carries no
    /// freshness information at all.
    fn expires_hint(&self, headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
        policy::response_expiration(headers, now, None, self.opts.heuristic_fraction)
            .map(|expiration| expiration.duration_since(now).unwrap_or(Duration::ZERO))
    }

    fn add_conditional_headers(&self, headers: &mut HeaderMap, entry: &CachedEntry) {
        let stored = entry.metadata.to_header_map();
        if let Some(etag) = stored.get(http::header::ETAG) {
            headers.insert(http::header::IF_NONE_MATCH, etag.clone());
        }
        if let Some(last_modified) = stored.get(http::header::LAST_MODIFIED) {
            headers.insert(http::header::IF_MODIFIED_SINCE, last_modified.clone());
        }
    }

    fn entry_response(&self, entry: CachedEntry, from_cache: bool) -> CacheOutcome {
        let status = StatusCode::from_u16(entry.metadata.status).unwrap_or(StatusCode::OK);
        let version = match serialize::version_from_u16(entry.metadata.version) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("stored entry has an unrecognized HTTP version: {e}");
                http::Version::HTTP_11
            }
        };
        let headers = entry.metadata.to_header_map();
        let mut builder = Response::builder().status(status).version(version);
        *builder.headers_mut().unwrap() = headers;
        let body = box_body(Full::new(Bytes::from(entry.body)));
        CacheOutcome { response: builder.body(body).expect("valid response"), from_cache }
    }

    /// Runs the full lookup -> transport -> write-back cycle for one request.
    pub async fn run(
        &self,
        mut request: Request<Bytes>,
        transport: &dyn Transport,
    ) -> Result<CacheOutcome, BoxError> {
        let now = SystemTime::now();
        let key = cache_key(&request.uri().to_string())?;
        let method = request.method().clone();

        let usable = policy::use_cache_for_request(&method, request.headers(), &self.opts);
        let stored = if usable { self.load(&key, request.headers()).await } else { None };

        if let Some(entry) = &stored {
            let stored_headers = entry.metadata.to_header_map();
            let status = StatusCode::from_u16(entry.metadata.status).unwrap_or(StatusCode::OK);
            if policy::is_response_fresh(request.headers(), &stored_headers, status, now, &self.opts) {
                log::debug!("fresh cache hit for {key}");
                return Ok(self.entry_response(stored.unwrap(), true));
            }
            log::debug!("stale cache entry for {key}, revalidating");
            self.add_conditional_headers(request.headers_mut(), entry);
        }

        let req_headers_snapshot = request.headers().clone();
        let response = transport.send(request).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return self.merge_not_modified(&key, stored, response, now).await;
        }

        if policy::is_invalidating(&method, response.status()) {
            log::debug!("invalidating {key} after {} {}", method, response.status());
            if let Err(e) = self.store.delete(&key).await {
                log::debug!("cache store delete({key}) failed: {e}");
            }
        }

        if usable && self.opts.cacheable_methods.contains(&method) {
            return Ok(self.wrap_for_capture(key, req_headers_snapshot, response, now));
        }

        Ok(CacheOutcome { response, from_cache: false })
    }

    async fn merge_not_modified(
        &self,
        key: &str,
        stored: Option<CachedEntry>,
        response: Response<BoxBody<Bytes, BoxError>>,
        now: SystemTime,
    ) -> Result<CacheOutcome, BoxError> {
        let (parts, body) = response.into_parts();
        // A 304 must not carry a semantically meaningful body; drain it so the
        // connection can be released, but discard it.
        let _ = body.collect().await;

        let mut entry = match stored {
            Some(e) => e,
            None => {
                // Nothing to merge into: hand back the bare 304.
                let body = box_body(Empty::new());
                return Ok(CacheOutcome {
                    response: Response::from_parts(parts, body),
                    from_cache: false,
                });
            }
        };

        for (name, value) in parts.headers.iter() {
            if *name == http::header::CONTENT_LENGTH {
                continue;
            }
            entry.metadata.headers.retain(|h| h.name.to_ascii_lowercase() != name.as_str());
            entry.metadata.headers.push(crate::serialize::StoredHeader {
                name: name.as_str().to_string(),
                value: value.as_bytes().to_vec(),
            });
        }
        entry.metadata.status = StatusCode::OK.as_u16();
        entry.metadata.reason = StatusCode::OK.canonical_reason().map(|s| s.to_string());

        let merged_headers = entry.metadata.to_header_map();
        let expires = self.expires_hint(&merged_headers, now);
        match serialize::encode(&entry) {
            Ok(encoded) => {
                if let Err(e) = self.store.set(key, encoded, expires).await {
                    log::debug!("cache store set({key}) failed after 304 merge: {e}");
                }
            }
            Err(e) => log::debug!("failed to encode cache entry for {key} after 304 merge: {e}"),
        }

        Ok(self.entry_response(entry, true))
    }

    fn wrap_for_capture(
        &self,
        key: String,
        request_headers: HeaderMap,
        response: Response<BoxBody<Bytes, BoxError>>,
        now: SystemTime,
    ) -> CacheOutcome {
        let (mut parts, body) = response.into_parts();
        if !policy::has_explicit_freshness(&parts.headers) {
            self.heuristic.apply(&mut parts.headers);
        }

        if !policy::can_cache_response(parts.status, &parts.headers, now, &self.opts) {
            if policy::is_no_store(&parts.headers) {
                let store = self.store.clone();
                let delete_key = key.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.delete(&delete_key).await {
                        log::debug!("cache store delete({delete_key}) failed after no-store response: {e}");
                    }
                });
            }
            return CacheOutcome { response: Response::from_parts(parts, body), from_cache: false };
        }

        let vary_map = match crate::key::build_vary_map(
            parts.headers.get(http::header::VARY).and_then(|v| v.to_str().ok()),
            &request_headers,
        ) {
            Some(m) => m,
            None => return CacheOutcome { response: Response::from_parts(parts, body), from_cache: false },
        };

        let content_length = parts
            .headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());

        let mut stored_headers = parts.headers.clone();
        for name in FRAMING_HEADERS.iter() {
            stored_headers.remove(name);
        }
        let decode_content = stored_headers.contains_key(http::header::CONTENT_ENCODING);
        let metadata = ResponseMetadata::from_parts(parts.status, parts.version, decode_content, &stored_headers);
        let expires = self.expires_hint(&parts.headers, now);

        let store = self.store.clone();
        let commit = move |captured: Bytes| {
            if let Some(expected) = content_length {
                if captured.len() != expected {
                    log::debug!("body length mismatch for {key}: expected {expected}, got {}", captured.len());
                    return;
                }
            }
            let entry = CachedEntry { metadata, vary_map, body: captured.to_vec() };
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                match serialize::encode(&entry) {
                    Ok(encoded) => {
                        if let Err(e) = store.set(&key, encoded, expires).await {
                            log::debug!("cache store set({key}) failed: {e}");
                        }
                    }
                    Err(e) => log::debug!("failed to encode cache entry for {key}: {e}"),
                }
            });
        };

        let tap = BodyTap::new(body, commit);
        CacheOutcome { response: Response::from_parts(parts, box_body(tap)), from_cache: false }
    }
}

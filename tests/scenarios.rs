//! End-to-end scenarios against an in-memory store and a scripted transport,
//! one test per documented scenario.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body::{Body, Frame};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use private_http_cache::controller::{CacheOutcome, Controller, Transport};
use private_http_cache::error::BoxError;
use private_http_cache::store::MemoryStore;
use tokio::sync::Mutex;

fn get(uri: &str) -> Request<Bytes> {
    Request::builder().method("GET").uri(uri).body(Bytes::new()).unwrap()
}

fn method(m: &str, uri: &str) -> Request<Bytes> {
    Request::builder().method(m).uri(uri).body(Bytes::new()).unwrap()
}

fn box_full(status: StatusCode, headers: &[(&str, &str)], body: &'static [u8]) -> Response<BoxBody<Bytes, BoxError>> {
    let mut builder = Response::builder().status(status);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Full::new(Bytes::from_static(body)).map_err(|e| -> BoxError { match e {} }).boxed()).unwrap()
}

struct ChunkedBody {
    chunks: Vec<Bytes>,
    index: usize,
}

impl Body for ChunkedBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.index >= self.chunks.len() {
            return Poll::Ready(None);
        }
        let chunk = self.chunks[self.index].clone();
        self.index += 1;
        Poll::Ready(Some(Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.index >= self.chunks.len()
    }
}

fn box_chunked(status: StatusCode, headers: &[(&str, &str)], chunks: &[&'static [u8]]) -> Response<BoxBody<Bytes, BoxError>> {
    let mut builder = Response::builder().status(status);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    let body = ChunkedBody { chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(), index: 0 };
    builder.body(body.boxed()).unwrap()
}

struct ScriptedTransport {
    responses: Mutex<Vec<Response<BoxBody<Bytes, BoxError>>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn new(responses: Vec<Response<BoxBody<Bytes, BoxError>>>) -> Self {
        ScriptedTransport { responses: Mutex::new(responses), calls: AtomicUsize::new(0) }
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: Request<Bytes>) -> Result<Response<BoxBody<Bytes, BoxError>>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.lock().await.remove(0))
    }
}

async fn body_bytes(outcome: CacheOutcome) -> Bytes {
    outcome.response.into_body().collect().await.unwrap().to_bytes()
}

async fn settle() {
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn fresh_hit() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    let date = httpdate::fmt_http_date(SystemTime::now());
    let transport = ScriptedTransport::new(vec![box_full(
        StatusCode::OK,
        &[("date", &date), ("cache-control", "max-age=3600")],
        b"hello",
    )]);

    let first = controller.run(get("http://example.test/1"), &transport).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(body_bytes(first).await, Bytes::from_static(b"hello"));
    settle().await;

    let second = controller.run(get("http://example.test/1"), &transport).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(body_bytes(second).await, Bytes::from_static(b"hello"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_revalidation_with_etag_merges_304() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    let t0 = SystemTime::now();
    let transport = ScriptedTransport::new(vec![
        box_full(
            StatusCode::OK,
            &[("etag", "\"v1\""), ("date", &httpdate::fmt_http_date(t0)), ("cache-control", "max-age=0")],
            b"payload",
        ),
        box_full(StatusCode::NOT_MODIFIED, &[("etag", "\"v1\""), ("cache-control", "max-age=60")], b""),
    ]);

    let first = controller.run(get("http://example.test/2"), &transport).await.unwrap();
    assert!(!first.from_cache);
    let _ = body_bytes(first).await;
    settle().await;

    let second = controller.run(get("http://example.test/2"), &transport).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.response.status(), StatusCode::OK);
    assert_eq!(body_bytes(second).await, Bytes::from_static(b"payload"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn vary_discrimination() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    let date = httpdate::fmt_http_date(SystemTime::now());
    let transport = ScriptedTransport::new(vec![
        box_full(StatusCode::OK, &[("date", &date), ("cache-control", "max-age=3600"), ("vary", "accept")], b"json"),
        box_full(StatusCode::OK, &[("date", &date), ("cache-control", "max-age=3600"), ("vary", "accept")], b"html"),
    ]);

    let mut json_req = get("http://example.test/3");
    json_req.headers_mut().insert("accept", "application/json".parse().unwrap());
    let first = controller.run(json_req, &transport).await.unwrap();
    assert!(!first.from_cache);
    let _ = body_bytes(first).await;
    settle().await;

    let mut html_req = get("http://example.test/3");
    html_req.headers_mut().insert("accept", "text/html".parse().unwrap());
    let second = controller.run(html_req, &transport).await.unwrap();
    assert!(!second.from_cache);
    assert_eq!(body_bytes(second).await, Bytes::from_static(b"html"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn put_invalidates() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    let date = httpdate::fmt_http_date(SystemTime::now());
    let transport = ScriptedTransport::new(vec![
        box_full(StatusCode::OK, &[("date", &date), ("cache-control", "max-age=3600")], b"before"),
        box_full(StatusCode::NO_CONTENT, &[], b""),
        box_full(StatusCode::OK, &[("date", &date), ("cache-control", "max-age=3600")], b"after"),
    ]);

    let first = controller.run(get("http://example.test/4"), &transport).await.unwrap();
    let _ = body_bytes(first).await;
    settle().await;

    let put = controller.run(method("PUT", "http://example.test/4"), &transport).await.unwrap();
    assert!(!put.from_cache);
    let _ = body_bytes(put).await;

    let third = controller.run(get("http://example.test/4"), &transport).await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(body_bytes(third).await, Bytes::from_static(b"after"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn no_store_is_never_cached() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    let transport = ScriptedTransport::new(vec![
        box_full(StatusCode::OK, &[("cache-control", "no-store, max-age=3600")], b"secret"),
        box_full(StatusCode::OK, &[("cache-control", "no-store, max-age=3600")], b"secret"),
    ]);

    for _ in 0..2 {
        let outcome = controller.run(get("http://example.test/5"), &transport).await.unwrap();
        assert!(!outcome.from_cache);
        let _ = body_bytes(outcome).await;
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_store_response_evicts_a_previously_cached_entry() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    // Already stale by the time it's written, so the next request revalidates
    // against the transport rather than being served straight from cache.
    let stale_date = httpdate::fmt_http_date(SystemTime::now() - Duration::from_secs(10_000));
    let transport = ScriptedTransport::new(vec![
        box_full(StatusCode::OK, &[("date", &stale_date), ("cache-control", "max-age=1")], b"cached"),
        box_full(StatusCode::OK, &[("cache-control", "no-store")], b"secret"),
        box_full(StatusCode::OK, &[("cache-control", "no-store")], b"fresh-again"),
    ]);

    let first = controller.run(get("http://example.test/6"), &transport).await.unwrap();
    assert!(!first.from_cache);
    let _ = body_bytes(first).await;
    settle().await;

    let second = controller.run(get("http://example.test/6"), &transport).await.unwrap();
    assert!(!second.from_cache);
    assert_eq!(body_bytes(second).await, Bytes::from_static(b"secret"));
    settle().await;

    // The entry written by the first response must be gone: the third request
    // revalidates against the transport again instead of serving "cached".
    let third = controller.run(get("http://example.test/6"), &transport).await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(body_bytes(third).await, Bytes::from_static(b"fresh-again"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn chunked_body_is_captured() {
    let store = Arc::new(MemoryStore::new());
    let controller = Controller::new(store);
    let date = httpdate::fmt_http_date(SystemTime::now());
    let transport = ScriptedTransport::new(vec![box_chunked(
        StatusCode::OK,
        &[("date", &date), ("cache-control", "max-age=5000"), ("transfer-encoding", "chunked")],
        &[b"one-", b"two-", b"three"],
    )]);

    let first = controller.run(get("http://example.test/6"), &transport).await.unwrap();
    assert_eq!(body_bytes(first).await, Bytes::from_static(b"one-two-three"));
    settle().await;

    let second = controller.run(get("http://example.test/6"), &transport).await.unwrap();
    assert!(second.from_cache);
    assert!(second.response.headers().get("transfer-encoding").is_none());
    assert_eq!(body_bytes(second).await, Bytes::from_static(b"one-two-three"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

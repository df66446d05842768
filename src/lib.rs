#![forbid(unsafe_code, future_incompatible)]
#![deny(missing_debug_implementations, nonstandard_style, unused_import_braces, unused_extern_crates)]
//! A private HTTP/1.1 response cache implementing RFC 7234 caching semantics.
//!
//! This crate does not open sockets or choose a storage layout: callers
//! inject a [`controller::Transport`] and a [`store::CacheStore`], and this
//! crate provides the parsing, key derivation, freshness/cacheability
//! policy, body capture, and state-machine orchestration in between.
//!
//! ## Basic usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use private_http_cache::controller::Controller;
//! use private_http_cache::store::MemoryStore;
//!
//! # async fn run(transport: &dyn private_http_cache::controller::Transport) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let controller = Controller::new(Arc::new(MemoryStore::new()));
//! let request = http::Request::builder()
//!     .method("GET")
//!     .uri("https://example.test/resource")
//!     .body(bytes::Bytes::new())?;
//! let outcome = controller.run(request, transport).await?;
//! println!("served from cache: {}", outcome.from_cache);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod body;
pub mod controller;
pub mod directive;
pub mod error;
pub mod heuristic;
pub mod key;
pub mod policy;
pub mod serialize;
pub mod store;

pub use adapter::Adapter;
pub use body::BodyTap;
pub use controller::{CacheOutcome, Controller, Transport};
pub use directive::Directives;
pub use error::{BadHeader, BadRequest, BadVersion, BoxError, HttpCacheError, StreamingError};
pub use heuristic::{Heuristic, NoHeuristic};
pub use key::cache_key;
pub use policy::CacheOptions;
pub use store::{CacheStore, FileStore, MemoryStore};

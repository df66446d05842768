//! Thin transport boundary: the single entry point a caller wires into its
//! HTTP client. Delegates the lookup/conditional/merge/capture decisions
//! entirely to [`Controller`]; its own job is just to own the pair of
//! collaborators and expose one call.

use bytes::Bytes;
use http::Request;

use crate::controller::{CacheOutcome, Controller, Transport};
use crate::error::HttpCacheError;
use crate::store::CacheStore;

/// Pairs a [`Controller`] with the [`Transport`] it should call on a miss or
/// a revalidation, so a caller has exactly one method to invoke per request.
pub struct Adapter<S, T> {
    controller: Controller<S>,
    transport: T,
}

impl<S, T> std::fmt::Debug for Adapter<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter").field("controller", &self.controller).finish_non_exhaustive()
    }
}

impl<S, T> Adapter<S, T>
where
    S: CacheStore + 'static,
    T: Transport,
{
    pub fn new(controller: Controller<S>, transport: T) -> Self {
        Adapter { controller, transport }
    }

    /// Sends `request`, serving it from cache when possible and otherwise
    /// forwarding it through the wrapped transport. Errors are reported as
    /// [`HttpCacheError`], distinguishing a rejected request (bad key) from a
    /// transport failure the way the tower-grounded middleware shim does.
    pub async fn send(&self, request: Request<Bytes>) -> Result<CacheOutcome, HttpCacheError> {
        self.controller.run(request, &self.transport).await.map_err(HttpCacheError::from)
    }

    /// Releases the underlying store's resources.
    pub async fn close(&self) -> Result<(), HttpCacheError> {
        self.controller.close().await.map_err(HttpCacheError::from)
    }
}

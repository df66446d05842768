//! Extension point for servers that omit explicit freshness hints. The core
//! ships the trait and the call site in the controller; it does not ship a
//! concrete heuristic.

use http::HeaderMap;

/// Applied to a response that lacks both `Cache-Control: max-age` and
/// `Expires`, before cacheability is evaluated. Implementations may mutate
/// the response's headers (e.g. to add a synthetic `Expires` and a `Warning`
/// header indicating heuristic expiration was used).
pub trait Heuristic: Send + Sync {
    fn apply(&self, headers: &mut HeaderMap);
}

/// No-op [`Heuristic`], so callers aren't forced to write one just to use
/// the controller without heuristic freshness.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHeuristic;

impl Heuristic for NoHeuristic {
    fn apply(&self, _headers: &mut HeaderMap) {}
}

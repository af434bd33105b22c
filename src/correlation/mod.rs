//! Request correlation
//!
//! Every inbound request gets a [`RequestContext`] carrying a random
//! [`RequestId`]. The context is handed explicitly to the upload, download and
//! mirror services so their log lines can be tagged with the same id.
//!
//! Two log lines bracket every request:
//!
//! ```text
//! [ 123456789] POST /upload
//! [ 123456789] POST /upload 200 OK 1.2ms
//! ```

use hyper::{Method, StatusCode};
use rand::Rng;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::Span;

/// Exclusive upper bound for generated ids
const REQUEST_ID_RANGE: u32 = 1_000_000_000;

/// Per-request identifier used for log correlation only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u32);

impl RequestId {
    /// Draw a new id from the calling thread's RNG
    pub fn generate() -> Self {
        Self(rand::rng().random_range(0..REQUEST_ID_RANGE))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for RequestId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10}", self.0)
    }
}

/// State attached to a single request for its whole lifetime
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: RequestId,
    method: Method,
    path: String,
    started: Instant,
    span: Span,
}

impl RequestContext {
    /// Start tracking a request and emit the entry log line.
    ///
    /// `target` is the full request target including the query string; the
    /// path component is kept for the exit line.
    pub fn begin(method: &Method, target: &str) -> Self {
        Self::with_id(RequestId::generate(), method, target)
    }

    /// Like [`RequestContext::begin`] with a caller-chosen id
    pub fn with_id(id: RequestId, method: &Method, target: &str) -> Self {
        let path = target.split('?').next().unwrap_or_default().to_string();
        let span = tracing::info_span!(
            "request",
            request_id = id.value(),
            http.method = %method,
            http.target = %target,
        );

        span.in_scope(|| tracing::info!("[{}] {} {}", id, method, target));

        Self {
            id,
            method: method.clone(),
            path,
            started: Instant::now(),
            span,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Span carrying the request id; enter it to tag nested log lines
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Emit the exit log line and return the total elapsed time
    pub fn finish(self, status: StatusCode) -> Duration {
        let elapsed = self.elapsed();
        self.span.in_scope(|| {
            tracing::info!(
                http.status_code = status.as_u16(),
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "[{}] {} {} {} {:?}",
                self.id,
                self.method,
                self.path,
                status,
                elapsed
            )
        });
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_in_range() {
        for _ in 0..1000 {
            assert!(RequestId::generate().value() < REQUEST_ID_RANGE);
        }
    }

    #[test]
    fn test_request_id_padded() {
        assert_eq!(RequestId::from(42).to_string(), "        42");
        assert_eq!(RequestId::from(999_999_999).to_string(), " 999999999");
    }

    #[test]
    fn test_context_strips_query_from_path() {
        let ctx = RequestContext::begin(&Method::GET, "/download?filePath=1/a.txt");
        assert_eq!(ctx.path(), "/download");
        assert_eq!(ctx.method(), &Method::GET);
    }

    #[test]
    fn test_concurrent_ids_differ() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| RequestId::generate()))
            .collect();
        let ids: std::collections::HashSet<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        // Collisions in 8 draws from 1e9 are vanishingly unlikely.
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_finish_reports_elapsed() {
        let ctx = RequestContext::with_id(RequestId::from(7), &Method::POST, "/upload");
        std::thread::sleep(Duration::from_millis(2));
        assert!(ctx.finish(StatusCode::OK) >= Duration::from_millis(2));
    }
}

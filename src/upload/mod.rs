//! Upload service
//!
//! Accepts a request body and a filename hint, allocates a fresh directory
//! under the upload root and writes the body there.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use fileferry::correlation::RequestContext;
//! use fileferry::upload::UploadService;
//! use http_body_util::Full;
//! use hyper::{HeaderMap, Method};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = UploadService::new("local-storage");
//! let ctx = RequestContext::begin(&Method::POST, "/upload");
//! let reference = service
//!     .upload(&ctx, &Method::POST, &HeaderMap::new(), Full::new(Bytes::from("hello")))
//!     .await?;
//! println!("stored at {}", reference);
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{HeaderMap, Method, StatusCode};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use crate::correlation::RequestContext;
use crate::metrics;
use crate::storage::{Allocation, StorageReference};

pub mod filename;

pub use filename::filename_from_headers;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Storage(#[from] std::io::Error),
}

impl UploadError {
    /// HTTP status reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            UploadError::BadRequest(_) => StatusCode::BAD_REQUEST,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used in the errors metric
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::MethodNotAllowed => "method_not_allowed",
            UploadError::BadRequest(_) => "bad_request",
            UploadError::Storage(_) => "storage",
        }
    }
}

/// Writes uploads below a fixed root
#[derive(Debug, Clone)]
pub struct UploadService {
    root: PathBuf,
}

impl UploadService {
    /// Only this method is accepted on the upload endpoint
    pub const METHOD: Method = Method::POST;

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `body` under a fresh allocation and return its reference.
    ///
    /// The method is checked before the body is read, so a rejected request
    /// has no filesystem side effect.
    pub async fn upload<B>(
        &self,
        ctx: &RequestContext,
        method: &Method,
        headers: &HeaderMap,
        body: B,
    ) -> Result<StorageReference, UploadError>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let start = Instant::now();
        let result = self
            .store(method, headers, body)
            .instrument(ctx.span().clone())
            .await;
        let duration = start.elapsed();

        ctx.span().in_scope(|| match &result {
            Ok((reference, bytes)) => {
                metrics::record_transfer_success("upload", *bytes, duration.as_secs_f64());
                tracing::info!(
                    file_path = %reference,
                    bytes = *bytes,
                    duration_ms = duration.as_millis() as u64,
                    "[{}] Upload: {}",
                    ctx.id(),
                    reference
                );
            }
            Err(e @ UploadError::Storage(_)) => {
                metrics::record_transfer_failure("upload", e.kind());
                tracing::error!(error = %e, "[{}] Upload failed", ctx.id());
            }
            Err(e) => {
                metrics::record_transfer_failure("upload", e.kind());
                tracing::warn!(error = %e, "[{}] Upload rejected", ctx.id());
            }
        });

        result.map(|(reference, _)| reference)
    }

    async fn store<B>(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: B,
    ) -> Result<(StorageReference, u64), UploadError>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        if method != Self::METHOD {
            return Err(UploadError::MethodNotAllowed);
        }

        let filename = filename_from_headers(headers);

        let bytes = body
            .collect()
            .await
            .map_err(|e| UploadError::BadRequest(e.to_string()))?
            .to_bytes();

        let allocation = Allocation::create(&self.root).await?;
        let path = allocation.dir().join(&filename);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(path = %path.display(), "Upload persisted");

        Ok((
            StorageReference::new(allocation.segment(), filename),
            bytes.len() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use http_body_util::{Full, StreamBody};
    use hyper::body::Frame;
    use hyper::header::{HeaderValue, CONTENT_DISPOSITION};

    fn ctx() -> RequestContext {
        RequestContext::begin(&Method::POST, "/upload")
    }

    #[tokio::test]
    async fn test_upload_writes_body() {
        let tmp = tempfile::tempdir().unwrap();
        let service = UploadService::new(tmp.path());

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(r#"attachment; filename="a.txt""#),
        );

        let reference = service
            .upload(&ctx(), &Method::POST, &headers, Full::new(Bytes::from("hello")))
            .await
            .unwrap();

        assert_eq!(reference.filename(), "a.txt");
        let stored = std::fs::read(reference.path_under(tmp.path())).unwrap();
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn test_wrong_method_has_no_side_effect() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("uploads");
        let service = UploadService::new(&root);

        let err = service
            .upload(&ctx(), &Method::GET, &HeaderMap::new(), Full::new(Bytes::from("x")))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::MethodNotAllowed));
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_empty_body_is_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let service = UploadService::new(tmp.path());

        let reference = service
            .upload(&ctx(), &Method::POST, &HeaderMap::new(), Full::new(Bytes::new()))
            .await
            .unwrap();

        let stored = std::fs::read(reference.path_under(tmp.path())).unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_storage_error_when_root_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("not-a-dir");
        std::fs::write(&root, b"occupied").unwrap();
        let service = UploadService::new(&root);

        let err = service
            .upload(&ctx(), &Method::POST, &HeaderMap::new(), Full::new(Bytes::from("x")))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Storage(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_body_read_failure_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("uploads");
        let service = UploadService::new(&root);

        let body = StreamBody::new(stream::iter(vec![
            Ok(Frame::data(Bytes::from("partial"))),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        ]));

        let err = service
            .upload(&ctx(), &Method::POST, &HeaderMap::new(), body)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::BadRequest(ref msg) if msg.contains("reset")));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!root.exists());
    }
}

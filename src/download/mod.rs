//! Download service
//!
//! Resolves a caller-supplied storage reference under the download root and
//! opens the file for streaming. Every failure to find a regular file inside
//! the root is reported as [`DownloadError::NotFound`], whether the entry is
//! missing, a directory, or outside the root.

use hyper::header::HeaderValue;
use hyper::{Method, StatusCode};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::fs::File;

use crate::correlation::RequestContext;
use crate::metrics;
use crate::storage::resolve_within;

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("File not exist")]
    NotFound,

    #[error("{0}")]
    Storage(#[from] std::io::Error),
}

impl DownloadError {
    /// HTTP status reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            DownloadError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DownloadError::NotFound => StatusCode::NOT_FOUND,
            DownloadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used in the errors metric
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::MethodNotAllowed => "method_not_allowed",
            DownloadError::NotFound => "not_found",
            DownloadError::Storage(_) => "storage",
        }
    }
}

/// An opened file ready to be streamed back
#[derive(Debug)]
pub struct Download {
    pub file: File,
    pub file_name: String,
    pub len: u64,
}

impl Download {
    /// `attachment; filename="<base>"` with the base name quoted
    pub fn content_disposition(&self) -> HeaderValue {
        content_disposition(&self.file_name)
    }
}

/// Build an attachment disposition for `file_name`
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let value = format!("attachment; filename={}", quote_filename(file_name));
    HeaderValue::from_bytes(value.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Quote `name` as a double-quoted string with backslash escapes.
///
/// Quotes, backslashes and control characters are escaped, so the result can
/// neither terminate the parameter early nor inject header lines.
pub fn quote_filename(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x80 => {
                let _ = write!(quoted, "\\x{:02x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(quoted, "\\u{:04x}", c as u32);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Serves files below a fixed root
#[derive(Debug, Clone)]
pub struct DownloadService {
    root: PathBuf,
}

impl DownloadService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `method` may read from this service. `HEAD` is served like
    /// `GET` without a body.
    pub fn accepts(method: &Method) -> bool {
        method == Method::GET || method == Method::HEAD
    }

    /// Resolve `file_path` and open it.
    ///
    /// A missing `file_path` behaves like an empty one, which resolves to the
    /// root directory and therefore to `NotFound`.
    pub async fn download(
        &self,
        ctx: &RequestContext,
        method: &Method,
        file_path: Option<&str>,
    ) -> Result<Download, DownloadError> {
        let start = Instant::now();
        let file_path = file_path.unwrap_or_default();
        let result = self.open(method, file_path).await;
        let duration = start.elapsed();

        ctx.span().in_scope(|| match &result {
            Ok(download) => {
                metrics::record_transfer_success("download", download.len, duration.as_secs_f64());
                tracing::info!(
                    bytes = download.len,
                    "[{}] Download: {}",
                    ctx.id(),
                    file_path
                );
            }
            Err(e @ DownloadError::Storage(_)) => {
                metrics::record_transfer_failure("download", e.kind());
                tracing::error!(
                    error = %e,
                    file_path = %file_path,
                    "[{}] Download failed",
                    ctx.id()
                );
            }
            Err(e) => {
                metrics::record_transfer_failure("download", e.kind());
                tracing::warn!(
                    error = %e,
                    file_path = %file_path,
                    "[{}] Download rejected",
                    ctx.id()
                );
            }
        });

        result
    }

    async fn open(&self, method: &Method, file_path: &str) -> Result<Download, DownloadError> {
        if !Self::accepts(method) {
            return Err(DownloadError::MethodNotAllowed);
        }

        let resolved = resolve_within(&self.root, file_path)
            .await
            .map_err(|_| DownloadError::NotFound)?;

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| DownloadError::NotFound)?;
        if !metadata.is_file() {
            return Err(DownloadError::NotFound);
        }

        let file = File::open(&resolved).await?;
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Download {
            file,
            file_name,
            len: metadata.len(),
        })
    }
}

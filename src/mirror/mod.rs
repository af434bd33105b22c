//! Static mirrors of the storage roots
//!
//! `/files/in/` exposes the download root and `/files/out/` the upload root as
//! plain read-only file trees with HTML directory listings. Paths go through
//! the same containment check as downloads, so a mirror can never reach
//! outside its root.

use hyper::{Method, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;

use crate::correlation::RequestContext;
use crate::download::DownloadService;
use crate::metrics;
use crate::router::MirrorRoot;
use crate::storage::resolve_within;

/// Characters left unescaped in listing links
const HREF_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const LISTING_HEADER: &str =
    "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n";

/// Mirror errors
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("404 page not found")]
    NotFound,

    #[error("{0}")]
    Storage(#[from] std::io::Error),
}

impl MirrorError {
    /// HTTP status reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            MirrorError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            MirrorError::NotFound => StatusCode::NOT_FOUND,
            MirrorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used in the errors metric
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::MethodNotAllowed => "method_not_allowed",
            MirrorError::NotFound => "mirror_not_found",
            MirrorError::Storage(_) => "storage",
        }
    }
}

/// What a mirror request resolved to
#[derive(Debug)]
pub enum MirrorEntry {
    File {
        file: File,
        len: u64,
        content_type: String,
    },
    Listing(String),
    /// Directory requested without a trailing slash
    Redirect(String),
}

/// Read-only views of the upload and download roots
#[derive(Debug, Clone)]
pub struct MirrorService {
    download_root: PathBuf,
    upload_root: PathBuf,
}

impl MirrorService {
    pub fn new(download_root: impl Into<PathBuf>, upload_root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            upload_root: upload_root.into(),
        }
    }

    fn root(&self, root: MirrorRoot) -> &Path {
        match root {
            MirrorRoot::Download => &self.download_root,
            MirrorRoot::Upload => &self.upload_root,
        }
    }

    /// Serve `path` (decoded, relative to the mirror prefix).
    ///
    /// `request_path` is the raw URL path, used to decide on the trailing
    /// slash redirect for directories.
    pub async fn serve(
        &self,
        ctx: &RequestContext,
        method: &Method,
        root: MirrorRoot,
        path: &str,
        request_path: &str,
    ) -> Result<MirrorEntry, MirrorError> {
        let result = self.lookup(method, root, path, request_path).await;

        ctx.span().in_scope(|| match &result {
            Ok(MirrorEntry::File { len, .. }) => {
                metrics::record_transfer_success("mirror", *len, ctx.elapsed().as_secs_f64());
                tracing::debug!(mirror = root.prefix(), path = %path, "Mirror file served");
            }
            Ok(_) => {}
            Err(e) => {
                metrics::record_transfer_failure("mirror", e.kind());
                tracing::warn!(
                    error = %e,
                    mirror = root.prefix(),
                    path = %path,
                    "[{}] Mirror rejected",
                    ctx.id()
                );
            }
        });

        result
    }

    async fn lookup(
        &self,
        method: &Method,
        root: MirrorRoot,
        path: &str,
        request_path: &str,
    ) -> Result<MirrorEntry, MirrorError> {
        if !DownloadService::accepts(method) {
            return Err(MirrorError::MethodNotAllowed);
        }

        let resolved = resolve_within(self.root(root), path)
            .await
            .map_err(|_| MirrorError::NotFound)?;
        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| MirrorError::NotFound)?;

        if metadata.is_dir() {
            if !request_path.ends_with('/') {
                return Ok(MirrorEntry::Redirect(format!("{}/", request_path)));
            }
            return Ok(MirrorEntry::Listing(render_listing(&resolved).await?));
        }

        if !metadata.is_file() {
            return Err(MirrorError::NotFound);
        }

        let content_type = mime_guess::from_path(&resolved)
            .first_or_octet_stream()
            .to_string();
        let file = File::open(&resolved).await?;

        Ok(MirrorEntry::File {
            file,
            len: metadata.len(),
            content_type,
        })
    }
}

/// Render a `<pre>` listing of `dir`, directories suffixed with `/`
async fn render_listing(dir: &Path) -> std::io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut html = String::from(LISTING_HEADER);
    for name in &names {
        let (stem, slash) = match name.strip_suffix('/') {
            Some(stem) => (stem, "/"),
            None => (name.as_str(), ""),
        };
        html.push_str(&format!(
            "<a href=\"{}{}\">{}</a>\n",
            utf8_percent_encode(stem, HREF_SAFE),
            slash,
            escape_html(name)
        ));
    }
    html.push_str("</pre>\n");
    Ok(html)
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::begin(&Method::GET, "/files/in/")
    }

    fn fixture() -> (tempfile::TempDir, tempfile::TempDir, MirrorService) {
        let down = tempfile::tempdir().unwrap();
        let up = tempfile::tempdir().unwrap();
        std::fs::create_dir(down.path().join("sub")).unwrap();
        std::fs::write(down.path().join("sub/page.html"), b"<p>hi</p>").unwrap();
        std::fs::write(down.path().join("a&b.txt"), b"amp").unwrap();
        std::fs::write(up.path().join("out.bin"), b"out").unwrap();
        let service = MirrorService::new(down.path(), up.path());
        (down, up, service)
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&#34;x&#34;&gt;&amp;&lt;/a&gt;");
    }

    #[tokio::test]
    async fn test_serves_file_with_guessed_type() {
        let (_down, _up, service) = fixture();
        let entry = service
            .serve(
                &ctx(),
                &Method::GET,
                MirrorRoot::Download,
                "sub/page.html",
                "/files/in/sub/page.html",
            )
            .await
            .unwrap();

        match entry {
            MirrorEntry::File { len, content_type, .. } => {
                assert_eq!(len, 9);
                assert_eq!(content_type, "text/html");
            }
            other => panic!("Expected file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listing_and_redirect() {
        let (_down, _up, service) = fixture();

        let entry = service
            .serve(&ctx(), &Method::GET, MirrorRoot::Download, "", "/files/in")
            .await
            .unwrap();
        assert!(matches!(entry, MirrorEntry::Redirect(ref loc) if loc == "/files/in/"));

        let entry = service
            .serve(&ctx(), &Method::GET, MirrorRoot::Download, "", "/files/in/")
            .await
            .unwrap();
        match entry {
            MirrorEntry::Listing(html) => {
                assert!(html.contains("<a href=\"sub/\">sub/</a>"));
                assert!(html.contains("<a href=\"a%26b.txt\">a&amp;b.txt</a>"));
            }
            other => panic!("Expected listing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_root_mirror() {
        let (_down, _up, service) = fixture();
        let entry = service
            .serve(&ctx(), &Method::GET, MirrorRoot::Upload, "out.bin", "/files/out/out.bin")
            .await
            .unwrap();
        assert!(matches!(entry, MirrorEntry::File { len: 3, .. }));
    }

    #[tokio::test]
    async fn test_rejects_traversal_and_writes() {
        let (_down, _up, service) = fixture();

        let err = service
            .serve(
                &ctx(),
                &Method::GET,
                MirrorRoot::Download,
                "../../etc/passwd",
                "/files/in/../../etc/passwd",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::NotFound));

        let err = service
            .serve(&ctx(), &Method::PUT, MirrorRoot::Download, "a&b.txt", "/files/in/a&b.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::MethodNotAllowed));
    }

    #[tokio::test]
    async fn test_missing_entry_message() {
        let (_down, _up, service) = fixture();

        let err = service
            .serve(&ctx(), &Method::GET, MirrorRoot::Download, "nope.txt", "/files/in/nope.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::NotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "404 page not found");
    }
}

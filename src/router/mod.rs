//! Request router
//!
//! Maps an incoming path and query to a [`Route`]. Method checks belong to the
//! services so that a wrong verb on a known endpoint yields `405`, not `404`.

use hyper::Method;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Upload endpoint
pub const UPLOAD_PATH: &str = "/upload";
/// Download endpoint
pub const DOWNLOAD_PATH: &str = "/download";
/// Liveness endpoint
pub const HEALTH_PATH: &str = "/health";
/// Query parameter carrying the storage reference on downloads
pub const FILE_PATH_PARAM: &str = "filePath";

/// Which storage root a mirror request reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorRoot {
    /// `/files/in/`: the download root
    Download,
    /// `/files/out/`: the upload root
    Upload,
}

impl MirrorRoot {
    /// URL prefix, without trailing slash
    pub fn prefix(&self) -> &'static str {
        match self {
            MirrorRoot::Download => "/files/in",
            MirrorRoot::Upload => "/files/out",
        }
    }
}

/// Resolved route for a request
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// GET /health
    Health,
    /// /upload
    Upload,
    /// /download?filePath=...
    Download { file_path: Option<String> },
    /// /files/in/... or /files/out/...; `path` is percent-decoded and relative
    Mirror { root: MirrorRoot, path: String },
    NotFound,
}

impl Route {
    /// Parse a request into a route
    pub fn parse(method: &Method, path: &str, query: Option<&str>) -> Route {
        match path {
            HEALTH_PATH if method == Method::GET => Route::Health,
            UPLOAD_PATH => Route::Upload,
            DOWNLOAD_PATH => Route::Download {
                file_path: parse_query(query).remove(FILE_PATH_PARAM),
            },
            _ => [MirrorRoot::Download, MirrorRoot::Upload]
                .into_iter()
                .find_map(|root| {
                    mirror_subpath(path, root.prefix()).map(|rest| Route::Mirror {
                        root,
                        path: percent_decode(rest, false),
                    })
                })
                .unwrap_or(Route::NotFound),
        }
    }
}

/// Path below `prefix`, matching only on a segment boundary
fn mirror_subpath<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Decode a form-urlencoded query string. The first occurrence of a key wins.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let mut kv = pair.splitn(2, '=');
            if let Some(key) = kv.next() {
                let value = kv.next().unwrap_or("");
                params
                    .entry(percent_decode(key, true))
                    .or_insert_with(|| percent_decode(value, true));
            }
        }
    }
    params
}

/// Percent-decode `s`, optionally treating `+` as a space
pub fn percent_decode(s: &str, plus_as_space: bool) -> String {
    if plus_as_space && s.contains('+') {
        let replaced = s.replace('+', " ");
        percent_decode_str(&replaced).decode_utf8_lossy().into_owned()
    } else {
        percent_decode_str(s).decode_utf8_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        assert_eq!(Route::parse(&Method::POST, "/upload", None), Route::Upload);
        // Wrong verbs still route; the service answers 405.
        assert_eq!(Route::parse(&Method::GET, "/upload", None), Route::Upload);
    }

    #[test]
    fn test_parse_download_with_reference() {
        let route = Route::parse(&Method::GET, "/download", Some("filePath=123%2Fa.txt"));
        assert_eq!(
            route,
            Route::Download {
                file_path: Some("123/a.txt".into())
            }
        );
    }

    #[test]
    fn test_parse_download_without_reference() {
        let route = Route::parse(&Method::GET, "/download", Some("other=1"));
        assert_eq!(route, Route::Download { file_path: None });
    }

    #[test]
    fn test_parse_mirrors() {
        assert_eq!(
            Route::parse(&Method::GET, "/files/in/1/a%20b.txt", None),
            Route::Mirror {
                root: MirrorRoot::Download,
                path: "1/a b.txt".into()
            }
        );
        assert_eq!(
            Route::parse(&Method::GET, "/files/out", None),
            Route::Mirror {
                root: MirrorRoot::Upload,
                path: String::new()
            }
        );
        assert_eq!(
            Route::parse(&Method::GET, "/files/output/x", None),
            Route::NotFound
        );
    }

    #[test]
    fn test_parse_health_and_unknown() {
        assert_eq!(Route::parse(&Method::GET, "/health", None), Route::Health);
        assert_eq!(Route::parse(&Method::POST, "/health", None), Route::NotFound);
        assert_eq!(Route::parse(&Method::GET, "/", None), Route::NotFound);
    }

    #[test]
    fn test_query_decoding() {
        let params = parse_query(Some("filePath=a+b%2B.txt&filePath=second&flag"));
        assert_eq!(params.get("filePath").map(String::as_str), Some("a b+.txt"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
    }
}

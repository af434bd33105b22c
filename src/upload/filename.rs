//! Filename extraction from `Content-Disposition`

use hyper::header::{HeaderMap, CONTENT_DISPOSITION};

use crate::storage::{strip_parent_tokens, timestamp_nanos};

/// Extract the advisory filename from request headers.
///
/// Looks for `filename="..."` in `Content-Disposition`. The value is
/// untrusted: it is reduced to its last path component so it can only ever
/// name an entry inside the allocation directory, and every literal `..` is
/// removed the same way downloads remove it, so the issued reference always
/// resolves back to the stored file. Falls back to a nanosecond
/// timestamp when the header is absent, not UTF-8, has no quoted filename, or
/// reduces to nothing.
pub fn filename_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_disposition_filename)
        .and_then(|raw| leaf_name(&raw))
        .unwrap_or_else(|| timestamp_nanos().to_string())
}

/// Capture the value of `filename="..."`, up to the first closing quote
pub fn parse_disposition_filename(disposition: &str) -> Option<String> {
    let re = regex_lite::Regex::new(r#"filename="([^"]+)"#).ok()?;
    re.captures(disposition)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Last `/`- or `\`-separated component with `..` runs removed, unless that
/// leaves nothing or `.`
fn leaf_name(raw: &str) -> Option<String> {
    let leaf = strip_parent_tokens(raw.rsplit(['/', '\\']).next()?);
    match leaf.as_str() {
        "" | "." => None,
        _ => Some(leaf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(disposition: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_DISPOSITION, HeaderValue::from_str(disposition).unwrap());
        map
    }

    #[test]
    fn test_parse_quoted_filename() {
        assert_eq!(
            parse_disposition_filename(r#"attachment; filename="a.txt""#),
            Some("a.txt".to_string())
        );
    }

    #[test]
    fn test_parse_unterminated_quote() {
        // Matches up to end of input when the closing quote is missing.
        assert_eq!(
            parse_disposition_filename(r#"form-data; filename="report.pdf"#),
            Some("report.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_unquoted_is_rejected() {
        assert_eq!(parse_disposition_filename("attachment; filename=a.txt"), None);
        assert_eq!(parse_disposition_filename(r#"filename="""#), None);
    }

    #[test]
    fn test_filename_from_headers() {
        assert_eq!(
            filename_from_headers(&headers(r#"attachment; filename="notes.md""#)),
            "notes.md"
        );
    }

    #[test]
    fn test_traversal_reduced_to_leaf() {
        assert_eq!(
            filename_from_headers(&headers(r#"attachment; filename="../../etc/cron.d/job""#)),
            "job"
        );
        assert_eq!(
            filename_from_headers(&headers(r#"attachment; filename="..\..\win.ini""#)),
            "win.ini"
        );
    }

    #[test]
    fn test_dot_runs_inside_name_removed() {
        assert_eq!(
            filename_from_headers(&headers(r#"attachment; filename="a..b.txt""#)),
            "ab.txt"
        );
        assert_eq!(
            filename_from_headers(&headers(r#"attachment; filename="notes..md""#)),
            "notesmd"
        );
        assert_eq!(
            filename_from_headers(&headers(r#"attachment; filename="v1...2.txt""#)),
            "v1.2.txt"
        );
    }

    #[test]
    fn test_leaf_is_stable_under_download_filter() {
        for raw in ["a..b", "x.....y", "..a..", "plain.txt", "...."] {
            if let Some(leaf) = leaf_name(raw) {
                assert_eq!(strip_parent_tokens(&leaf), leaf, "{}", raw);
            }
        }
    }

    #[test]
    fn test_fallback_to_timestamp() {
        let name = filename_from_headers(&HeaderMap::new());
        assert!(name.parse::<i64>().is_ok());

        let name = filename_from_headers(&headers(r#"attachment; filename="../""#));
        assert!(name.parse::<i64>().is_ok());

        let name = filename_from_headers(&headers(r#"attachment; filename="..""#));
        assert!(name.parse::<i64>().is_ok());

        let name = filename_from_headers(&headers(r#"attachment; filename="...""#));
        assert!(name.parse::<i64>().is_ok());
    }
}

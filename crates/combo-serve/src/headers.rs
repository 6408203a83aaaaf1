//! Response header derivation from combination stats.
//!
//! Headers that are already present on the response are never replaced.

use crate::combine::{FileStat, StatsBundle};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderName, LAST_MODIFIED,
};
use axum::http::{HeaderMap, HeaderValue};
use std::time::UNIX_EPOCH;

/// Content type for `resource`, with a UTF-8 charset for textual types.
#[must_use]
pub fn content_type_for(resource: &str) -> String {
    let mime = mime_guess::from_path(resource).first_or_octet_stream();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(
            mime.essence_str(),
            "application/json" | "application/javascript"
        );
    if textual {
        format!("{mime}; charset=UTF-8")
    } else {
        mime.to_string()
    }
}

/// Weak validator built from a file's size and modification time.
#[must_use]
pub fn etag_for(stat: &FileStat) -> String {
    let millis = stat
        .mtime
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("W/\"{:x}-{:x}\"", stat.size, millis)
}

/// Set caching and entity headers for a combined response.
///
/// `resource` is the logical resource name used for the Content-Type
/// lookup. Existing headers are left untouched.
pub fn set_headers(headers: &mut HeaderMap, stats: &StatsBundle, resource: &str, max_age: u64) {
    insert_absent(headers, CONTENT_LENGTH, || {
        let length = stats.total_size();
        tracing::debug!("Content length: {}", length);
        length.to_string()
    });

    insert_absent(headers, CONTENT_TYPE, || content_type_for(resource));

    insert_absent(headers, CACHE_CONTROL, || {
        format!("public, max-age={max_age}")
    });

    let Some(latest) = stats.last_modified() else {
        return;
    };
    tracing::debug!("Last modified file: {:?}", latest.path);

    insert_absent(headers, LAST_MODIFIED, || {
        httpdate::fmt_http_date(latest.mtime)
    });

    insert_absent(headers, ETAG, || etag_for(latest));
}

fn insert_absent(headers: &mut HeaderMap, name: HeaderName, value: impl FnOnce() -> String) {
    if headers.contains_key(&name) {
        return;
    }

    match HeaderValue::try_from(value()) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!("Skipping invalid {} header: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn stat(name: &str, size: u64, secs: u64) -> FileStat {
        FileStat {
            path: PathBuf::from(name),
            size,
            mtime: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn bundle() -> StatsBundle {
        StatsBundle {
            stats: vec![
                stat("a.js", 100, 1_445_412_480),
                stat("b.js", 250, 1_445_412_500),
                stat("c.js", 5, 1_445_412_000),
            ],
        }
    }

    #[test]
    fn test_sets_all_headers() {
        let mut headers = HeaderMap::new();
        set_headers(&mut headers, &bundle(), "/??a.css,b.css,c.css", 31_536_000);

        assert_eq!(headers[CONTENT_LENGTH], "355");
        assert_eq!(headers[CONTENT_TYPE], "text/css; charset=UTF-8");
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=31536000");
        assert_eq!(headers[LAST_MODIFIED], "Wed, 21 Oct 2015 07:28:20 GMT");
        assert_eq!(headers[ETAG], "W/\"fa-150894c7220\"");
    }

    #[test]
    fn test_never_overwrites_existing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"),
        );
        headers.insert(ETAG, HeaderValue::from_static("\"fixed\""));
        let before = headers.clone();

        set_headers(&mut headers, &bundle(), "a.css", 60);
        assert_eq!(headers, before);
    }

    #[test]
    fn test_content_type_lookup() {
        assert_eq!(content_type_for("style.css"), "text/css; charset=UTF-8");
        assert_eq!(content_type_for("db.json~3.png"), "image/png");
        assert_eq!(content_type_for("noextension"), "application/octet-stream");
        assert_eq!(
            content_type_for("data.json"),
            "application/json; charset=UTF-8"
        );
        assert!(content_type_for("app.js").ends_with("; charset=UTF-8"));
    }

    #[test]
    fn test_zero_max_age() {
        let mut headers = HeaderMap::new();
        set_headers(&mut headers, &bundle(), "a.css", 0);
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=0");
    }
}

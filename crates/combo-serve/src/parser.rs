//! Combo URL parsing.
//!
//! Two URL shapes are recognized:
//!
//! - Multi-file: `/<base>/??<file>,<file>[?<query>]`, each file relative to
//!   `<base>` under the root.
//! - Database reference: `/<db path>~<token>[.<ext>]`, where `<db path>`
//!   names an index database under the root and `<token>` is a radix-32
//!   bitmask (see [`crate::codec`]).
//!
//! Parsers never touch the filesystem. A URL that does not have a
//! parser's shape yields `Ok(None)`.

use crate::error::ParseError;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const MULTI_MARKER: &str = "??";
const LIST_SEPARATOR: char = ',';
const TOKEN_MARKER: char = '~';

/// Normalized combo request, whichever URL shape produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboRequest {
    /// Files to combine, in order
    pub files: Vec<PathBuf>,
    /// Root the files must live under
    pub root: PathBuf,
    /// Logical resource name used for the Content-Type lookup
    pub resource: String,
}

/// Database reference extracted from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbReference {
    /// Database path relative to the root
    pub db: String,
    /// Radix-32 bitmask token
    pub token: String,
    /// Logical resource name used for the Content-Type lookup
    pub resource: String,
}

/// Parser for explicit file-list URLs.
pub trait MultiParser: Send + Sync {
    /// Parse `url` (path and query).
    fn parse(&self, url: &str) -> Result<Option<ComboRequest>, ParseError>;
}

/// Parser for database-reference URLs.
pub trait DbParser: Send + Sync {
    /// Parse `url` (path and query).
    fn parse(&self, url: &str) -> Result<Option<DbReference>, ParseError>;
}

/// Default `??a,b,c` parser.
#[derive(Debug, Clone)]
pub struct MultiFilesParser {
    root: PathBuf,
}

impl MultiFilesParser {
    /// Create a parser resolving files under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MultiParser for MultiFilesParser {
    fn parse(&self, url: &str) -> Result<Option<ComboRequest>, ParseError> {
        let Some((base, list)) = url.split_once(MULTI_MARKER) else {
            return Ok(None);
        };

        // Anything after a further '?' is a cache-busting query
        let list = list.split_once('?').map_or(list, |(list, _query)| list);
        let base = decode(base)?;
        let base = Path::new(base.trim_start_matches('/'));

        let entries = list
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;

        let Some(first) = entries.first() else {
            return Err(ParseError::EmptySegment(url.to_string()));
        };
        let resource = first.to_string();

        let files = entries
            .iter()
            .map(|entry| self.root.join(base).join(entry.trim_start_matches('/')))
            .collect();

        Ok(Some(ComboRequest {
            files,
            root: self.root.clone(),
            resource,
        }))
    }
}

/// Default `<db>~<token>.<ext>` parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbFilesParser;

impl DbFilesParser {
    /// Create a parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DbParser for DbFilesParser {
    fn parse(&self, url: &str) -> Result<Option<DbReference>, ParseError> {
        if url.contains(MULTI_MARKER) {
            return Ok(None);
        }

        let path = url.split_once('?').map_or(url, |(path, _query)| path);
        let (dir, segment) = path.rsplit_once('/').unwrap_or(("", path));
        let Some((db_name, rest)) = segment.split_once(TOKEN_MARKER) else {
            return Ok(None);
        };

        let token = rest.split_once('.').map_or(rest, |(token, _ext)| token);
        if db_name.is_empty() || token.is_empty() {
            return Err(ParseError::EmptySegment(url.to_string()));
        }

        Ok(Some(DbReference {
            db: decode(&format!("{dir}/{db_name}"))?.into_owned(),
            token: token.to_string(),
            resource: decode(segment)?.into_owned(),
        }))
    }
}

fn decode(raw: &str) -> Result<Cow<'_, str>, ParseError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ParseError::InvalidEncoding(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_multi_parse_at_root() {
        let parser = MultiFilesParser::new("/srv/www");
        let request = parser.parse("/??a.js,b.js").unwrap().unwrap();
        assert_eq!(
            request.files,
            vec![PathBuf::from("/srv/www/a.js"), PathBuf::from("/srv/www/b.js")]
        );
        assert_eq!(request.root, PathBuf::from("/srv/www"));
        assert_eq!(request.resource, "a.js");
    }

    #[test]
    fn test_multi_parse_with_base_and_query() {
        let parser = MultiFilesParser::new("/srv/www");
        let request = parser
            .parse("/static/js/??lib/a.js, b.js,,c.js?v=20240101")
            .unwrap()
            .unwrap();
        assert_eq!(
            request.files,
            vec![
                PathBuf::from("/srv/www/static/js/lib/a.js"),
                PathBuf::from("/srv/www/static/js/b.js"),
                PathBuf::from("/srv/www/static/js/c.js"),
            ]
        );
    }

    #[test]
    fn test_multi_parse_percent_encoded() {
        let parser = MultiFilesParser::new("/srv/www");
        let request = parser.parse("/??my%20file.css").unwrap().unwrap();
        assert_eq!(request.files, vec![PathBuf::from("/srv/www/my file.css")]);
        assert_eq!(request.resource, "my file.css");
    }

    #[test]
    fn test_multi_no_match() {
        let parser = MultiFilesParser::new("/srv/www");
        assert_eq!(parser.parse("/static/a.js").unwrap(), None);
        assert_eq!(parser.parse("/static/a.js?v=1").unwrap(), None);
    }

    #[test]
    fn test_multi_empty_list() {
        let parser = MultiFilesParser::new("/srv/www");
        assert!(matches!(
            parser.parse("/static/??,,"),
            Err(ParseError::EmptySegment(_))
        ));
        assert!(matches!(
            parser.parse("/static/??"),
            Err(ParseError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_multi_invalid_encoding() {
        let parser = MultiFilesParser::new("/srv/www");
        assert!(matches!(
            parser.parse("/??a%ff.js"),
            Err(ParseError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_db_parse() {
        let reference = DbFilesParser::new()
            .parse("/static/db.json~1f.js")
            .unwrap()
            .unwrap();
        assert_eq!(reference.db, "/static/db.json");
        assert_eq!(reference.token, "1f");
        assert_eq!(reference.resource, "db.json~1f.js");
    }

    #[test]
    fn test_db_parse_without_extension_and_with_query() {
        let reference = DbFilesParser::new()
            .parse("/db.json~3?v=2")
            .unwrap()
            .unwrap();
        assert_eq!(reference.db, "/db.json");
        assert_eq!(reference.token, "3");
    }

    #[test]
    fn test_db_no_match() {
        let parser = DbFilesParser::new();
        assert_eq!(parser.parse("/static/app.js").unwrap(), None);
        assert_eq!(parser.parse("/static~dir/app.js").unwrap(), None);
        assert_eq!(parser.parse("/??a~1.js,b.js").unwrap(), None);
    }

    #[test]
    fn test_db_empty_parts() {
        let parser = DbFilesParser::new();
        assert!(matches!(
            parser.parse("/static/~3.js"),
            Err(ParseError::EmptySegment(_))
        ));
        assert!(matches!(
            parser.parse("/static/db.json~.js"),
            Err(ParseError::EmptySegment(_))
        ));
    }
}

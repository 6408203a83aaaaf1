//! Index database loading and caching.
//!
//! A database file maps small integer indices to file paths so that combo
//! URLs can carry a bitmask instead of a file list. Databases are JSON,
//! either an array of paths (index = position, `null` for retired slots)
//! or an object keyed by decimal index.
//!
//! Loaded databases are cached for the life of the process and reloaded
//! when the file's modification time changes.

use crate::checker::join_under_root;
use crate::codec;
use crate::error::DatabaseError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// One row of an index database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Index within the database
    pub index: usize,
    /// Path relative to the served root
    pub path: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDatabase {
    List(Vec<Option<String>>),
    Map(BTreeMap<String, String>),
}

/// Highest index a database file may define.
///
/// Combo URLs carry one bit per index, so larger index spaces are never
/// addressable in practice.
pub const MAX_INDEX: usize = 0xFFFF;

/// In-memory index database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDatabase {
    entries: BTreeMap<usize, String>,
}

impl IndexDatabase {
    /// Build a dense database where index = position.
    pub fn from_paths(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entries: paths
                .into_iter()
                .enumerate()
                .map(|(index, path)| (index, path.into()))
                .collect(),
        }
    }

    /// Build a possibly sparse database from `(index, path)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parse a database from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidJson` for malformed JSON and
    /// `DatabaseError::InvalidIndex` for keys that are not indices or
    /// exceed [`MAX_INDEX`].
    pub fn from_json(bytes: &[u8]) -> Result<Self, DatabaseError> {
        let entries = match serde_json::from_slice(bytes)? {
            RawDatabase::List(list) => {
                if list.len() > MAX_INDEX + 1 {
                    return Err(DatabaseError::InvalidIndex((list.len() - 1).to_string()));
                }
                list.into_iter()
                    .enumerate()
                    .filter_map(|(index, path)| path.map(|path| (index, path)))
                    .collect()
            }
            RawDatabase::Map(map) => map
                .into_iter()
                .map(|(key, path)| match key.parse::<usize>() {
                    Ok(index) if index <= MAX_INDEX => Ok((index, path)),
                    _ => Err(DatabaseError::InvalidIndex(key)),
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(Self { entries })
    }

    /// Size of the index space (highest defined index + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .last_key_value()
            .map_or(0, |(last, _)| last.saturating_add(1))
    }

    /// Whether no index is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path stored at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(&index).map(String::as_str)
    }
}

#[derive(Debug)]
struct CachedDatabase {
    modified: SystemTime,
    database: Arc<IndexDatabase>,
}

/// Process-wide cache of loaded databases keyed by file path.
///
/// [`DbFileResolver`] always passes canonical paths, so one file maps to
/// one entry however it was addressed.
#[derive(Debug, Default)]
pub struct DatabaseCache {
    entries: RwLock<HashMap<PathBuf, Arc<CachedDatabase>>>,
}

impl DatabaseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the database at `path`, loading it on first use or when the
    /// file's modification time differs from the cached copy.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the file cannot be read or parsed.
    pub async fn get(&self, path: &Path) -> Result<Arc<IndexDatabase>, DatabaseError> {
        let load_failed = |source| DatabaseError::LoadFailed {
            path: path.to_path_buf(),
            source,
        };

        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(load_failed)?;

        let cached = self.entries.read().get(path).cloned();
        if let Some(cached) = cached
            && cached.modified == modified
        {
            return Ok(Arc::clone(&cached.database));
        }

        tracing::debug!("Loading index database from {:?}", path);
        let bytes = tokio::fs::read(path).await.map_err(load_failed)?;
        let database = Arc::new(IndexDatabase::from_json(&bytes)?);

        tracing::info!(
            "Loaded index database {:?} with {} indices",
            path,
            database.len()
        );

        self.entries.write().insert(
            path.to_path_buf(),
            Arc::new(CachedDatabase {
                modified,
                database: Arc::clone(&database),
            }),
        );

        Ok(database)
    }

    /// Number of cached databases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no database.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Resolves a database reference and bitmask token into file paths.
#[async_trait]
pub trait IndexResolver: Send + Sync {
    /// `db` is the database path relative to `root`.
    async fn resolve(
        &self,
        root: &Path,
        db: &str,
        token: &str,
    ) -> Result<Vec<PathBuf>, DatabaseError>;
}

/// Default resolver backed by JSON database files under the root.
#[derive(Debug, Clone, Default)]
pub struct DbFileResolver {
    cache: Arc<DatabaseCache>,
}

impl DbFileResolver {
    /// Create a resolver sharing `cache`.
    #[must_use]
    pub const fn new(cache: Arc<DatabaseCache>) -> Self {
        Self { cache }
    }

    /// Underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<DatabaseCache> {
        &self.cache
    }
}

async fn canonicalize(path: &Path) -> Result<PathBuf, DatabaseError> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|source| DatabaseError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl IndexResolver for DbFileResolver {
    async fn resolve(
        &self,
        root: &Path,
        db: &str,
        token: &str,
    ) -> Result<Vec<PathBuf>, DatabaseError> {
        let db_path = join_under_root(root, db)
            .ok_or_else(|| DatabaseError::OutsideRoot(PathBuf::from(db)))?;

        // Symlinks inside the root may still point elsewhere.
        let canonical_root = canonicalize(root).await?;
        let canonical = canonicalize(&db_path).await?;
        if !canonical.starts_with(&canonical_root) {
            return Err(DatabaseError::OutsideRoot(PathBuf::from(db)));
        }

        let database = self.cache.get(&canonical).await?;
        let entries = codec::decode(&database, token)?;

        // Entry paths are still validated by the path checker downstream.
        Ok(entries
            .into_iter()
            .map(|entry| root.join(entry.path.trim_start_matches('/')))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use tempfile::TempDir;

    #[test]
    fn test_from_json_list() {
        let db = IndexDatabase::from_json(br#"["a.js", null, "c.js"]"#).unwrap();
        assert_eq!(db.len(), 3);
        assert_eq!(db.get(0), Some("a.js"));
        assert_eq!(db.get(1), None);
        assert_eq!(db.get(2), Some("c.js"));
    }

    #[test]
    fn test_from_json_map() {
        let db = IndexDatabase::from_json(br#"{"0": "a.js", "9": "j.js"}"#).unwrap();
        assert_eq!(db.len(), 10);
        assert_eq!(db.get(9), Some("j.js"));
        assert_eq!(db.get(5), None);
    }

    #[test]
    fn test_from_json_invalid_key() {
        let err = IndexDatabase::from_json(br#"{"first": "a.js"}"#).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidIndex(key) if key == "first"));
    }

    #[test]
    fn test_from_json_huge_key_rejected() {
        for key in ["18446744073709551615", "40000000000", "65536"] {
            let json = format!(r#"{{"{key}": "a.js"}}"#);
            let err = IndexDatabase::from_json(json.as_bytes()).unwrap_err();
            assert!(matches!(err, DatabaseError::InvalidIndex(k) if k == key));
        }

        let db = IndexDatabase::from_json(br#"{"65535": "last.js"}"#).unwrap();
        assert_eq!(db.len(), MAX_INDEX + 1);
        assert_eq!(db.get(MAX_INDEX), Some("last.js"));
    }

    #[test]
    fn test_from_entries_sparse_extremes() {
        let db = IndexDatabase::from_entries([(usize::MAX, "z.js".to_string())]);
        assert_eq!(db.len(), usize::MAX);
        assert_eq!(db.get(usize::MAX), Some("z.js"));
        assert_eq!(db.get(0), None);
    }

    #[test]
    fn test_from_json_malformed() {
        let err = IndexDatabase::from_json(b"module.exports = []").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidJson(_)));
    }

    #[test]
    fn test_len_ignores_trailing_holes() {
        let db = IndexDatabase::from_json(br#"["a.js", null, null]"#).unwrap();
        assert_eq!(db.len(), 1);
        assert!(!db.is_empty());
        assert!(IndexDatabase::default().is_empty());
    }

    #[tokio::test]
    async fn test_cache_reuses_loaded_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"["a.js"]"#).unwrap();

        let cache = DatabaseCache::new();
        let first = cache.get(&path).await.unwrap();
        let second = cache.get(&path).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_reloads_on_mtime_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"["a.js"]"#).unwrap();

        let cache = DatabaseCache::new();
        let first = cache.get(&path).await.unwrap();
        assert_eq!(first.len(), 1);

        std::fs::write(&path, r#"["a.js", "b.js"]"#).unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(10);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let second = cache.get(&path).await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_cache_missing_file() {
        let dir = TempDir::new().unwrap();
        let cache = DatabaseCache::new();
        let err = cache.get(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::LoadFailed { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_joins_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("static")).unwrap();
        std::fs::write(
            dir.path().join("static/db.json"),
            r#"["js/a.js", "/js/b.js", "js/c.js"]"#,
        )
        .unwrap();

        let resolver = DbFileResolver::default();
        // binary 011 -> indices 1 and 2
        let paths = resolver
            .resolve(dir.path(), "/static/db.json", "3")
            .await
            .unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("js/b.js"), dir.path().join("js/c.js")]
        );
    }

    #[tokio::test]
    async fn test_resolver_rejects_db_outside_root() {
        let dir = TempDir::new().unwrap();
        let resolver = DbFileResolver::default();
        let err = resolver
            .resolve(dir.path(), "/../../etc/db.json", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::OutsideRoot(_)));
    }

    #[tokio::test]
    async fn test_resolver_missing_db() {
        let dir = TempDir::new().unwrap();
        let resolver = DbFileResolver::default();
        let err = resolver
            .resolve(dir.path(), "nope.json", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::LoadFailed { .. }));
        assert!(resolver.cache().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolver_rejects_symlinked_db_outside_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("public");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("private.json"), r#"["a.js"]"#).unwrap();
        std::os::unix::fs::symlink(dir.path().join("private.json"), root.join("db.json"))
            .unwrap();

        let resolver = DbFileResolver::default();
        let err = resolver.resolve(&root, "db.json", "1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::OutsideRoot(_)));
        assert!(resolver.cache().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolver_caches_by_canonical_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("db.json"), r#"["a.js"]"#).unwrap();
        std::os::unix::fs::symlink(dir.path().join("db.json"), dir.path().join("alias.json"))
            .unwrap();

        let resolver = DbFileResolver::default();
        resolver.resolve(dir.path(), "db.json", "1").await.unwrap();
        resolver.resolve(dir.path(), "./alias.json", "1").await.unwrap();
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_resolver_propagates_decode_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("db.json"), r#"["a.js"]"#).unwrap();

        let resolver = DbFileResolver::default();
        let err = resolver
            .resolve(dir.path(), "db.json", "2")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Decode(DecodeError::IndexOutOfRange { bit: 1, len: 1 })
        ));
    }
}

use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::trace;

use super::{Direction, PathTranslator};
use crate::errors::PathError;

static GLOBAL_CACHE: Lazy<Arc<PathCache>> = Lazy::new(|| Arc::new(PathCache::new()));

/// Memoised translations keyed by `(direction, raw path)`.
///
/// Entries are never invalidated implicitly; the mount configuration is
/// assumed stable for the lifetime of the process. Failures are not cached,
/// and neither are relative native paths, whose meaning depends on the
/// current directory. A cache holds the answers of one translator
/// configuration; translators configured differently need separate caches.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: RwLock<HashMap<(Direction, String), String>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every translator built with [`super::default_translator`].
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_CACHE)
    }

    pub fn get(&self, direction: Direction, path: &str) -> Option<String> {
        self.entries
            .read()
            .get(&(direction, path.to_string()))
            .cloned()
    }

    pub fn insert(&self, direction: Direction, path: &str, translated: String) {
        self.entries
            .write()
            .insert((direction, path.to_string()), translated);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Clear the process-wide translation cache.
pub fn clear_path_cache() {
    GLOBAL_CACHE.clear();
}

/// Memoising decorator over any [`PathTranslator`].
#[derive(Debug)]
pub struct CachedTranslator<T> {
    inner: T,
    cache: Arc<PathCache>,
}

impl<T: PathTranslator> CachedTranslator<T> {
    pub fn new(inner: T, cache: Arc<PathCache>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    fn cached(&self, direction: Direction, path: &str) -> Result<String, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if let Some(hit) = self.cache.get(direction, path) {
            trace!(?direction, path, "path cache hit");
            return Ok(hit);
        }
        let translated = self.inner.translate(direction, path)?;
        if direction == Direction::ToNative || path.starts_with('/') {
            self.cache.insert(direction, path, translated.clone());
        }
        Ok(translated)
    }
}

impl<T: PathTranslator> PathTranslator for CachedTranslator<T> {
    fn to_host_path(&self, native_path: &str) -> Result<String, PathError> {
        self.cached(Direction::ToHost, native_path)
    }

    fn to_native_path(&self, host_path: &str) -> Result<String, PathError> {
        self.cached(Direction::ToNative, host_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingTranslator {
        lookups: AtomicUsize,
    }

    impl PathTranslator for CountingTranslator {
        fn to_host_path(&self, native_path: &str) -> Result<String, PathError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if native_path == "/broken" {
                return Err(PathError::Translation {
                    path: native_path.to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(format!("host:{native_path}"))
        }

        fn to_native_path(&self, host_path: &str) -> Result<String, PathError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(format!("native:{host_path}"))
        }
    }

    #[test]
    fn repeated_lookups_hit_the_inner_translator_once() {
        let translator =
            CachedTranslator::new(CountingTranslator::default(), Arc::new(PathCache::new()));

        assert_eq!(translator.to_host_path("/a").unwrap(), "host:/a");
        assert_eq!(translator.to_host_path("/a").unwrap(), "host:/a");
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 1);

        translator.to_host_path("/b").unwrap();
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 2);

        // Same raw text in the other direction is a distinct key.
        translator.to_native_path("/a").unwrap();
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 3);
        assert_eq!(translator.cache().len(), 3);
    }

    #[test]
    fn failures_are_not_memoised() {
        let translator =
            CachedTranslator::new(CountingTranslator::default(), Arc::new(PathCache::new()));
        assert!(translator.to_host_path("/broken").is_err());
        assert!(translator.to_host_path("/broken").is_err());
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 2);
        assert!(translator.cache().is_empty());
    }

    #[test]
    fn relative_native_paths_are_not_memoised() {
        let translator =
            CachedTranslator::new(CountingTranslator::default(), Arc::new(PathCache::new()));
        translator.to_host_path("./a.txt").unwrap();
        translator.to_host_path("./a.txt").unwrap();
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 2);
        assert!(translator.cache().is_empty());
    }

    #[test]
    fn empty_paths_fail_without_lookup() {
        let translator =
            CachedTranslator::new(CountingTranslator::default(), Arc::new(PathCache::new()));
        assert_eq!(translator.to_host_path(""), Err(PathError::Empty));
        assert_eq!(translator.to_native_path(""), Err(PathError::Empty));
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clearing_forces_a_new_lookup() {
        let cache = Arc::new(PathCache::new());
        let translator = CachedTranslator::new(CountingTranslator::default(), Arc::clone(&cache));
        translator.to_host_path("/a").unwrap();
        cache.clear();
        translator.to_host_path("/a").unwrap();
        assert_eq!(translator.inner().lookups.load(Ordering::SeqCst), 2);
    }
}

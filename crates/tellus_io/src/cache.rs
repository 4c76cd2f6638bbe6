//! Read-through TTL cache over a key-value backend.
//!
//! On a miss, the loader runs synchronously and its value is returned
//! immediately; cache population happens on a detached thread, best
//! effort. `get_or_set` is not a singleflight: concurrent loaders for the
//! same key may both run, and the last write wins.

use crate::error::{IoError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

pub trait KeyValueBackend: Send + Sync + 'static {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    fn delete(&self, keys: &[String]) -> Result<()>;
}

/// In-process TTL store; stands in for the external key-value service.
#[derive(Default)]
pub struct MemoryBackend {
    map: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut map = self.map.lock().expect("cache lock poisoned");
        match map.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut map = self.map.lock().expect("cache lock poisoned");
        map.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> Result<()> {
        let mut map = self.map.lock().expect("cache lock poisoned");
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

pub struct QueryCache {
    backend: Arc<dyn KeyValueBackend>,
    ttl: Duration,
}

impl QueryCache {
    /// A configured TTL of zero or less falls back to the 60 s default.
    pub fn new(backend: Arc<dyn KeyValueBackend>, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        Self { backend, ttl }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set_raw(key, bytes, self.ttl)
    }

    /// Read-through: a hit returns the cached value; a miss runs `loader`
    /// synchronously, returns its value, and populates the cache from a
    /// detached thread. Loader errors propagate; population errors are
    /// only logged.
    pub fn get_or_set<T, F>(&self, key: &str, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let value = loader().map_err(|e| IoError::loader(e.to_string()))?;

        let bytes = serde_json::to_vec(&value)?;
        let backend = Arc::clone(&self.backend);
        let key = key.to_string();
        let ttl = self.ttl;
        thread::spawn(move || {
            if let Err(e) = backend.set_raw(&key, bytes, ttl) {
                warn!(key = %key, "async cache population failed: {e}");
            }
        });
        Ok(value)
    }

    pub fn delete(&self, keys: &[String]) -> Result<()> {
        self.backend.delete(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> QueryCache {
        QueryCache::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60))
    }

    #[test]
    fn test_get_or_set_runs_loader_once_serially() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(99u64)
        };
        let first: u64 = cache.get_or_set("answer", load).unwrap();
        assert_eq!(first, 99);

        // Wait for the async population to land, then a second read must
        // hit without invoking its loader.
        let deadline = Instant::now() + Duration::from_secs(2);
        while cache.get::<u64>("answer").unwrap().is_none() {
            assert!(Instant::now() < deadline, "population never landed");
            thread::sleep(Duration::from_millis(5));
        }
        let second: u64 = cache
            .get_or_set("answer", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .unwrap();
        assert_eq!(second, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_loader_error_propagates_and_cache_untouched() {
        let cache = cache();
        let result: Result<u64> =
            cache.get_or_set("broken", || Err(IoError::store("backend offline")));
        assert!(matches!(result, Err(IoError::Loader(_))));
        assert!(cache.get::<u64>("broken").unwrap().is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = QueryCache::new(Arc::new(MemoryBackend::new()), Duration::from_millis(30));
        cache.set("ephemeral", &7u32).unwrap();
        assert_eq!(cache.get::<u32>("ephemeral").unwrap(), Some(7));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get::<u32>("ephemeral").unwrap(), None);
    }

    #[test]
    fn test_zero_ttl_falls_back_to_default() {
        let cache = QueryCache::new(Arc::new(MemoryBackend::new()), Duration::ZERO);
        assert_eq!(cache.ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_delete() {
        let cache = cache();
        cache.set("a", &1u8).unwrap();
        cache.set("b", &2u8).unwrap();
        cache.delete(&["a".to_string()]).unwrap();
        assert_eq!(cache.get::<u8>("a").unwrap(), None);
        assert_eq!(cache.get::<u8>("b").unwrap(), Some(2));
    }
}

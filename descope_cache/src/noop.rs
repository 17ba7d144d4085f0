use aliri_clock::DurationSecs;

use crate::{CacheError, KeyCache};

/// A cache that never holds a value
///
/// Used when no caching backend is available. Every lookup misses, so every
/// consumer falls through to its source of truth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoopCache;

impl<V> KeyCache<V> for NoopCache {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        tracing::trace!(cache.key = key, "no-op cache miss");
        Ok(None)
    }

    #[inline]
    fn set(&self, _key: &str, _value: V, _ttl: DurationSecs) -> Result<(), CacheError> {
        Ok(())
    }

    #[inline]
    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

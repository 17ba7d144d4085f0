use std::{collections::HashMap, fmt, sync::Arc};

use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use arc_swap::ArcSwap;

use crate::{CacheError, KeyCache};

struct Entry<V> {
    value: V,
    expires_at: UnixTime,
}

type Entries<V> = HashMap<String, Arc<Entry<V>>>;

/// A process-local cache with real expiry semantics
///
/// Reads never block. Writes swap in a fresh copy of the (small) entry
/// table, pruning anything that has expired along the way.
pub struct InMemoryCache<V, C = System> {
    entries: ArcSwap<Entries<V>>,
    clock: C,
}

impl<V> InMemoryCache<V, System> {
    /// Constructs an empty cache driven by the system clock
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            clock: System,
        }
    }
}

impl<V> Default for InMemoryCache<V, System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> InMemoryCache<V, C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> InMemoryCache<V, D> {
        InMemoryCache {
            entries: self.entries,
            clock,
        }
    }
}

impl<V, C> fmt::Debug for InMemoryCache<V, C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entries = self.entries.load();
        f.debug_struct("InMemoryCache")
            .field(
                "keys",
                &entries.keys().map(String::as_str).collect::<Vec<_>>(),
            )
            .field("clock", &self.clock)
            .finish()
    }
}

impl<V, C> KeyCache<V> for InMemoryCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock + Send + Sync + fmt::Debug,
{
    fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let entries = self.entries.load();
        match entries.get(key) {
            Some(entry) if self.clock.now() < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(entry) => {
                tracing::trace!(
                    cache.key = key,
                    expired_at = entry.expires_at.0,
                    "cached entry expired"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: V, ttl: DurationSecs) -> Result<(), CacheError> {
        let now = self.clock.now();
        let entry = Arc::new(Entry {
            value,
            expires_at: now + ttl,
        });

        self.entries.rcu(|current| {
            let mut next: Entries<V> = current
                .iter()
                .filter(|(_, e)| now < e.expires_at)
                .map(|(k, e)| (k.clone(), Arc::clone(e)))
                .collect();
            next.insert(key.to_owned(), Arc::clone(&entry));
            next
        });

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.rcu(|current| {
            let mut next: Entries<V> = (**current).clone();
            next.remove(key);
            next
        });

        Ok(())
    }
}

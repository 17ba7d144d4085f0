use std::{error::Error as StdError, fmt};

use aliri_clock::DurationSecs;
use serde::{de::DeserializeOwned, Serialize};

use crate::{CacheError, KeyCache};

/// A failure reported by a [`HostStore`]
pub type HostStoreError = Box<dyn StdError + Send + Sync + 'static>;

/// A string-keyed, string-valued store owned by the host application
///
/// Implement this to share key material through whatever cache the
/// surrounding framework already provides.
pub trait HostStore: Send + Sync + fmt::Debug {
    /// Reads the raw value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be queried.
    fn get_raw(&self, key: &str) -> Result<Option<String>, HostStoreError>;

    /// Writes a raw value under `key`, expiring after `ttl`
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejected the write.
    fn set_raw(&self, key: &str, value: String, ttl: DurationSecs) -> Result<(), HostStoreError>;

    /// Removes the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejected the removal.
    fn delete_raw(&self, key: &str) -> Result<(), HostStoreError>;
}

/// A cache that delegates storage to the host application
///
/// Values are stored as JSON under a namespaced key, so that several SDK
/// instances (or unrelated host data) can share one store.
#[derive(Debug)]
pub struct DelegatedCache<S> {
    store: S,
    namespace: String,
}

impl<S> DelegatedCache<S> {
    /// Delegates to `store`, prefixing every key with `descope:`
    pub fn new(store: S) -> Self {
        Self::with_namespace(store, "descope")
    }

    /// Delegates to `store`, prefixing every key with `{namespace}:`
    pub fn with_namespace(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

impl<V, S> KeyCache<V> for DelegatedCache<S>
where
    V: Serialize + DeserializeOwned,
    S: HostStore,
{
    fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let key = self.qualify(key);
        let Some(raw) = self.store.get_raw(&key).map_err(CacheError::Backend)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                let error: &dyn StdError = &err;
                tracing::warn!(
                    error,
                    cache.key = %key,
                    "discarding undecodable value from host cache"
                );
                if let Err(err) = self.store.delete_raw(&key) {
                    let error: &dyn StdError = &*err;
                    tracing::debug!(
                        error,
                        cache.key = %key,
                        "unable to remove undecodable value from host cache"
                    );
                }
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: V, ttl: DurationSecs) -> Result<(), CacheError> {
        let raw = serde_json::to_string(&value)?;
        self.store
            .set_raw(&self.qualify(key), raw, ttl)
            .map_err(CacheError::Backend)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store
            .delete_raw(&self.qualify(key))
            .map_err(CacheError::Backend)
    }
}

//! Pluggable caches for the key material used by the `descope` SDK
//!
//! Verifying a session token requires the project's JSON Web Key Set (JWKS).
//! Fetching that set on every verification would put the identity platform
//! on the hot path of every request, so the SDK keeps the most recent set in
//! a [`KeyCache`] for a fixed time-to-live.
//!
//! Caching is purely additive: every variant yields correct results, the
//! cheaper ones simply hit the network more often.
//!
//! * [`InMemoryCache`]: a process-local cache with real expiry semantics
//!   (requires the `in-memory` feature, enabled by default).
//! * [`NoopCache`]: never holds anything. Every lookup misses and every
//!   write succeeds.
//! * [`DelegatedCache`]: hands values to a cache owned by the host
//!   application, such as a framework cache or a shared key-value store,
//!   through the [`HostStore`] trait.
//!
//! ```
//! use aliri_clock::DurationSecs;
//! use descope_cache::{KeyCache, NoopCache};
//!
//! let cache = NoopCache;
//! cache.set("jwks", String::from("{}"), DurationSecs(3600)).unwrap();
//! let cached: Option<String> = cache.get("jwks").unwrap();
//! assert!(cached.is_none());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::{error::Error as StdError, fmt, sync::Arc};

use aliri_clock::DurationSecs;
use thiserror::Error;

mod delegated;
#[cfg(feature = "in-memory")]
mod in_memory;
mod noop;

pub use delegated::{DelegatedCache, HostStore, HostStoreError};
#[cfg(feature = "in-memory")]
#[cfg_attr(docsrs, doc(cfg(feature = "in-memory")))]
pub use in_memory::InMemoryCache;
pub use noop::NoopCache;

/// An error raised by a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying store failed to complete the operation
    #[error("cache backend failure")]
    Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The value could not be converted to or from its stored form
    #[error("unable to encode cached value")]
    Encoding(#[from] serde_json::Error),
}

impl CacheError {
    /// Wraps an arbitrary backend failure
    pub fn backend(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Backend(source.into())
    }
}

/// A keyed cache with per-entry expiry
///
/// Implementations must tolerate concurrent calls from multiple threads.
/// No multi-key or transactional semantics are expected.
pub trait KeyCache<V>: Send + Sync + fmt::Debug {
    /// Looks up a value
    ///
    /// A missing or expired entry is reported as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself failed.
    fn get(&self, key: &str) -> Result<Option<V>, CacheError>;

    /// Stores a value which expires after `ttl`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not store the value. Callers are
    /// expected to log such failures and carry on without the cache.
    fn set(&self, key: &str, value: V, ttl: DurationSecs) -> Result<(), CacheError>;

    /// Removes a value, if present
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not remove the value.
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

impl<V, T> KeyCache<V> for Arc<T>
where
    T: KeyCache<V> + ?Sized,
{
    #[inline]
    fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        T::get(&**self, key)
    }

    #[inline]
    fn set(&self, key: &str, value: V, ttl: DurationSecs) -> Result<(), CacheError> {
        T::set(&**self, key, value, ttl)
    }

    #[inline]
    fn delete(&self, key: &str) -> Result<(), CacheError> {
        T::delete(&**self, key)
    }
}

impl<V, T> KeyCache<V> for Box<T>
where
    T: KeyCache<V> + ?Sized,
{
    #[inline]
    fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        T::get(&**self, key)
    }

    #[inline]
    fn set(&self, key: &str, value: V, ttl: DurationSecs) -> Result<(), CacheError> {
        T::set(&**self, key, value, ttl)
    }

    #[inline]
    fn delete(&self, key: &str) -> Result<(), CacheError> {
        T::delete(&**self, key)
    }
}

//! Public key material and its retrieval

use std::{
    error::Error as StdError,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use aliri::{
    jwa,
    jwk::KeyIdRef,
    Jwk, Jwks,
};
use aliri_clock::DurationSecs;
use descope_cache::KeyCache;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, FetchError},
    http::AuthenticatedClient,
};

/// The cache key the project's key set is stored under
pub const KEY_SET_CACHE_KEY: &str = "jwks";

/// How long a fetched key set is reused by default
pub const DEFAULT_KEY_SET_TTL: DurationSecs = DurationSecs(3600);

/// A project's public keys, as published by the identity platform
///
/// Keys of unsupported types are dropped while decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet {
    jwks: Jwks,
}

impl KeySet {
    /// Decodes a key set endpoint response
    ///
    /// # Errors
    ///
    /// Fails if the body is not JSON, has no `keys` array, or holds no
    /// usable key.
    pub fn from_response(body: &[u8]) -> Result<Self, FetchError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(FetchError::MalformedResponse)?;

        match value.get("keys") {
            Some(serde_json::Value::Array(keys)) if keys.is_empty() => {
                return Err(FetchError::NoUsableKeys)
            }
            Some(serde_json::Value::Array(_)) => {}
            _ => return Err(FetchError::MissingKeys),
        }

        // `Jwks` only decodes its keys from the raw document
        let jwks: Jwks = serde_json::from_slice(body).map_err(FetchError::MalformedResponse)?;
        Self::from_jwks(jwks)
    }

    /// Decodes a statically configured key, given as a JWK or a JWKS
    ///
    /// # Errors
    ///
    /// Fails if the document is neither, or holds no usable key.
    pub fn from_static(document: &str) -> Result<Self, FetchError> {
        let value: serde_json::Value =
            serde_json::from_str(document).map_err(FetchError::MalformedResponse)?;

        if value.get("keys").is_some() {
            return Self::from_response(document.as_bytes());
        }

        let jwk: Jwk = serde_json::from_str(document).map_err(FetchError::MalformedResponse)?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);
        Self::from_jwks(jwks)
    }

    fn from_jwks(jwks: Jwks) -> Result<Self, FetchError> {
        if jwks.keys().is_empty() {
            return Err(FetchError::NoUsableKeys);
        }

        Ok(Self { jwks })
    }

    /// The keys in this set
    #[inline]
    pub fn keys(&self) -> &[Jwk] {
        self.jwks.keys()
    }

    /// The identifiers of the keys in this set
    pub fn key_ids(&self) -> impl Iterator<Item = &KeyIdRef> {
        self.jwks.keys().iter().filter_map(Jwk::key_id)
    }

    /// Finds the key identified by `kid` that may verify `alg`
    ///
    /// Keys without an identifier never match, nor do keys pinned to a
    /// different algorithm or usage.
    pub fn find(&self, kid: &KeyIdRef, alg: jwa::Algorithm) -> Option<&Jwk> {
        self.jwks.keys().iter().find(|key| {
            key.key_id() == Some(kid)
                && key.is_compatible(alg)
                && key.algorithm().map_or(true, |a| a == alg)
                && key.usage().map_or(true, |u| u == alg.to_usage())
        })
    }
}

enum Source {
    Static(KeySet),
    Remote(Remote),
}

struct Remote {
    client: AuthenticatedClient,
    cache: Arc<dyn KeyCache<KeySet>>,
    ttl: DurationSecs,
    fetch_lock: Mutex<()>,
}

/// Supplies the key set used to verify token signatures
///
/// Remote key sets are kept in a [`KeyCache`] for a fixed time-to-live.
/// Concurrent misses are collapsed into a single fetch.
pub struct KeySetProvider {
    source: Source,
}

impl KeySetProvider {
    /// Fetches the project's key set through `client`, keeping it in `cache`
    /// for `ttl`
    pub fn remote(
        client: AuthenticatedClient,
        cache: Arc<dyn KeyCache<KeySet>>,
        ttl: DurationSecs,
    ) -> Self {
        Self {
            source: Source::Remote(Remote {
                client,
                cache,
                ttl,
                fetch_lock: Mutex::new(()),
            }),
        }
    }

    /// Always supplies `keys`, without fetching or caching
    pub fn fixed(keys: KeySet) -> Self {
        Self {
            source: Source::Static(keys),
        }
    }

    /// Gets the key set
    ///
    /// A cached set is returned unless `force_refresh` is set, in which case
    /// the set is always fetched and the cache overwritten.
    ///
    /// # Errors
    ///
    /// Fails if the cache could not be read, or if the key set could not be
    /// fetched or decoded. A failure to write the cache is only logged.
    #[tracing::instrument(skip(self))]
    pub fn get_key_set(&self, force_refresh: bool) -> Result<KeySet, Error> {
        let remote = match &self.source {
            Source::Static(keys) => return Ok(keys.clone()),
            Source::Remote(remote) => remote,
        };

        if !force_refresh {
            if let Some(keys) = remote.cached()? {
                return Ok(keys);
            }
        }

        let _guard = remote
            .fetch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !force_refresh {
            if let Some(keys) = remote.cached()? {
                tracing::debug!("key set fetched while waiting");
                return Ok(keys);
            }
        }

        let keys = remote.fetch()?;
        remote.store(&keys);
        Ok(keys)
    }
}

impl Remote {
    fn cached(&self) -> Result<Option<KeySet>, Error> {
        let keys = self.cache.get(KEY_SET_CACHE_KEY)?;
        if keys.is_some() {
            tracing::trace!("using cached key set");
        }
        Ok(keys)
    }

    fn fetch(&self) -> Result<KeySet, Error> {
        let url = self.client.endpoints().public_keys();
        let response = match self.client.get(&url, None) {
            Ok(response) => response,
            Err(Error::Transport(err)) => return Err(FetchError::Transport(err).into()),
            Err(err) => return Err(err),
        };

        let keys = KeySet::from_response(response.body())?;
        tracing::info!(
            jwks.url = %url,
            jwks.keys = keys.keys().len(),
            "fetched key set"
        );
        Ok(keys)
    }

    fn store(&self, keys: &KeySet) {
        if let Err(err) = self.cache.set(KEY_SET_CACHE_KEY, keys.clone(), self.ttl) {
            let error: &dyn StdError = &err;
            tracing::warn!(error, "unable to cache key set");
        }
    }
}

impl fmt::Debug for KeySetProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Source::Static(keys) => f
                .debug_struct("KeySetProvider")
                .field("keys", &keys.key_ids().collect::<Vec<_>>())
                .finish(),
            Source::Remote(remote) => f
                .debug_struct("KeySetProvider")
                .field("url", &remote.client.endpoints().public_keys())
                .field("cache", &remote.cache)
                .field("ttl", &remote.ttl.0)
                .finish(),
        }
    }
}

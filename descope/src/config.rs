//! Client configuration

use std::{sync::Arc, time::Duration};

use aliri::jwa;
use aliri_clock::DurationSecs;
use descope_cache::KeyCache;

use crate::{
    endpoints::{Endpoints, DEFAULT_ROOT_DOMAIN},
    error::ValidationError,
    http::DEFAULT_TIMEOUT,
    keys::{KeySet, DEFAULT_KEY_SET_TTL},
    ManagementKey, ProjectId,
};

/// Environment variable holding the project identifier
pub const PROJECT_ID_ENV: &str = "DESCOPE_PROJECT_ID";
/// Environment variable overriding the platform base URL
pub const BASE_URI_ENV: &str = "DESCOPE_BASE_URI";
/// Environment variable holding a static public key (a JWK or a JWKS)
pub const PUBLIC_KEY_ENV: &str = "DESCOPE_PUBLIC_KEY";
/// Environment variable holding the management key
pub const MANAGEMENT_KEY_ENV: &str = "DESCOPE_MANAGEMENT_KEY";

/// Configuration for a [`DescopeClient`](crate::DescopeClient)
///
/// ```
/// use std::time::Duration;
/// use descope::Config;
///
/// let config = Config::new("P2CtzUhdqpIF2ys9gg7ms06UvtC4")?
///     .with_timeout(Duration::from_secs(10));
/// # Ok::<(), descope::ValidationError>(())
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    project_id: ProjectId,
    base_url: Option<String>,
    root_domain: String,
    timeout: Duration,
    public_key: Option<String>,
    management_key: Option<ManagementKey>,
    cache: Option<Arc<dyn KeyCache<KeySet>>>,
    allowed_algorithms: Vec<jwa::Algorithm>,
    key_set_ttl: DurationSecs,
}

impl Config {
    /// Starts a configuration for `project_id` with default settings
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the project identifier is empty.
    pub fn new(project_id: impl Into<String>) -> Result<Self, ValidationError> {
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(ValidationError::new("project_id"));
        }

        Ok(Self {
            project_id: ProjectId::new(project_id),
            base_url: None,
            root_domain: DEFAULT_ROOT_DOMAIN.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            public_key: None,
            management_key: None,
            cache: None,
            allowed_algorithms: default_algorithms(),
            key_set_ttl: DEFAULT_KEY_SET_TTL,
        })
    }

    /// Reads the configuration from the process environment
    ///
    /// `DESCOPE_PROJECT_ID` is required. `DESCOPE_BASE_URI`,
    /// `DESCOPE_PUBLIC_KEY` and `DESCOPE_MANAGEMENT_KEY` are applied when
    /// present and not empty.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if no project identifier is set.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let project_id = var(PROJECT_ID_ENV).ok_or(ValidationError::new("project_id"))?;
        let mut config = Self::new(project_id)?;

        if let Some(base_url) = var(BASE_URI_ENV) {
            config = config.with_base_url(base_url);
        }

        if let Some(public_key) = var(PUBLIC_KEY_ENV) {
            config = config.with_public_key(public_key);
        }

        if let Some(key) = var(MANAGEMENT_KEY_ENV) {
            config = config.with_management_key(ManagementKey::new(key));
        }

        Ok(config)
    }

    /// Overrides the platform base URL
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    /// Changes the root domain used to derive the base URL
    pub fn with_root_domain(self, root_domain: impl Into<String>) -> Self {
        Self {
            root_domain: root_domain.into(),
            ..self
        }
    }

    /// Limits every outbound call to `timeout`
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Verifies tokens against a fixed public key instead of fetching the
    /// project's key set
    ///
    /// Accepts either a single JWK or a JWKS document.
    pub fn with_public_key(self, public_key: impl Into<String>) -> Self {
        Self {
            public_key: Some(public_key.into()),
            ..self
        }
    }

    /// Sets the key used for administrative calls
    pub fn with_management_key(self, management_key: ManagementKey) -> Self {
        Self {
            management_key: Some(management_key),
            ..self
        }
    }

    /// Stores the key set in `cache` instead of the default cache
    pub fn with_cache<K>(self, cache: K) -> Self
    where
        K: KeyCache<KeySet> + 'static,
    {
        Self {
            cache: Some(Arc::new(cache)),
            ..self
        }
    }

    /// Replaces the set of signature algorithms a token may use
    pub fn with_allowed_algorithms(
        self,
        algorithms: impl IntoIterator<Item = jwa::Algorithm>,
    ) -> Self {
        Self {
            allowed_algorithms: algorithms.into_iter().collect(),
            ..self
        }
    }

    /// Changes how long a fetched key set is reused
    pub fn with_key_set_ttl(self, ttl: DurationSecs) -> Self {
        Self {
            key_set_ttl: ttl,
            ..self
        }
    }

    /// The project identifier
    #[inline]
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// The timeout applied to outbound calls
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The configured static public key, if any
    #[inline]
    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// The configured management key, if any
    #[inline]
    pub fn management_key(&self) -> Option<&ManagementKey> {
        self.management_key.as_ref()
    }

    /// The signature algorithms a token may use
    #[inline]
    pub fn allowed_algorithms(&self) -> &[jwa::Algorithm] {
        &self.allowed_algorithms
    }

    /// How long a fetched key set is reused
    #[inline]
    pub fn key_set_ttl(&self) -> DurationSecs {
        self.key_set_ttl
    }

    /// Derives the endpoints for the configured project
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(
            &self.project_id,
            self.base_url.as_deref(),
            &self.root_domain,
        )
    }

    /// Selects the cache the key set is kept in
    ///
    /// An explicitly configured cache wins. Otherwise the in-memory cache is
    /// used when compiled in, and a no-op cache when it is not.
    pub(crate) fn resolve_cache(&self) -> Arc<dyn KeyCache<KeySet>> {
        match &self.cache {
            Some(cache) => Arc::clone(cache),
            None => default_cache(),
        }
    }
}

#[cfg(feature = "in-memory-cache")]
fn default_cache() -> Arc<dyn KeyCache<KeySet>> {
    tracing::debug!("keeping key set in process memory");
    Arc::new(descope_cache::InMemoryCache::<KeySet>::new())
}

#[cfg(not(feature = "in-memory-cache"))]
fn default_cache() -> Arc<dyn KeyCache<KeySet>> {
    tracing::warn!("no key set cache available, public keys will be fetched for every token");
    Arc::new(descope_cache::NoopCache)
}

/// The signature algorithms accepted unless configured otherwise
pub fn default_algorithms() -> Vec<jwa::Algorithm> {
    #[allow(unused_mut)]
    let mut algorithms = vec![
        jwa::Algorithm::RS256,
        jwa::Algorithm::RS384,
        jwa::Algorithm::RS512,
        jwa::Algorithm::PS256,
        jwa::Algorithm::PS384,
        jwa::Algorithm::PS512,
    ];

    #[cfg(feature = "ec")]
    algorithms.extend([
        jwa::Algorithm::ES256,
        jwa::Algorithm::ES384,
        jwa::Algorithm::ES512,
    ]);

    algorithms
}

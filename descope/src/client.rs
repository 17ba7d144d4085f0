use std::sync::Arc;

use aliri_clock::{Clock, System};

use crate::{
    claims::{Claims, ClaimsExtractor},
    config::Config,
    endpoints::Endpoints,
    error::Error,
    http::{AuthenticatedClient, HttpTransport, ReqwestTransport},
    keys::{KeySet, KeySetProvider},
    token::{TokenParser, UserRecord},
    verifier::TokenVerifier,
    RefreshTokenRef,
};

#[derive(Debug)]
struct Inner {
    http: AuthenticatedClient,
    keys: Arc<KeySetProvider>,
    parser: Arc<TokenParser>,
    claims: ClaimsExtractor,
}

/// A client for a single project of the identity platform
///
/// Cloning is cheap; clones share the key set cache and HTTP client.
///
/// ```no_run
/// use descope::{Config, DescopeClient};
///
/// let client = DescopeClient::new(Config::from_env()?)?;
///
/// # let session_token = "";
/// if client.verify(session_token, None)? {
///     let claims = client.get_claims(session_token)?;
///     println!("hello, {}", claims.subject().unwrap_or("stranger"));
/// }
/// # Ok::<(), descope::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct DescopeClient<C = System> {
    inner: Arc<Inner>,
    verifier: TokenVerifier<C>,
}

impl DescopeClient<System> {
    /// Builds a client that calls the platform over HTTPS
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client could not be built or the configured static
    /// public key is invalid.
    pub fn new(config: Config) -> Result<Self, Error> {
        let transport = ReqwestTransport::new(config.timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Builds a client that calls the platform through `transport`
    ///
    /// # Errors
    ///
    /// Fails if the configured static public key is invalid.
    pub fn with_transport(config: Config, transport: Arc<dyn HttpTransport>) -> Result<Self, Error> {
        let endpoints = Arc::new(config.endpoints());
        tracing::debug!(
            project.id = %endpoints.project_id(),
            base_url = endpoints.base_url(),
            "configuring client"
        );

        let mut http = AuthenticatedClient::new(transport, endpoints);
        if let Some(key) = config.management_key() {
            http = http.with_management_key(key.clone());
        }

        let keys = match config.public_key() {
            Some(public_key) => {
                let keys = KeySet::from_static(public_key)?;
                tracing::info!(
                    jwks.keys = keys.keys().len(),
                    "verifying tokens against a static public key"
                );
                KeySetProvider::fixed(keys)
            }
            None => {
                KeySetProvider::remote(http.clone(), config.resolve_cache(), config.key_set_ttl())
            }
        };
        let keys = Arc::new(keys);

        let parser = Arc::new(TokenParser::new(
            Arc::clone(&keys),
            http.clone(),
            config.allowed_algorithms().to_vec(),
        ));

        Ok(Self {
            verifier: TokenVerifier::new(Arc::clone(&parser)),
            inner: Arc::new(Inner {
                http,
                keys,
                claims: ClaimsExtractor::new(Arc::clone(&parser)),
                parser,
            }),
        })
    }
}

impl<C> DescopeClient<C> {
    /// Sets a custom clock to be used when checking expiry
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> DescopeClient<D> {
        DescopeClient {
            inner: self.inner,
            verifier: self.verifier.with_clock(clock),
        }
    }

    /// Returns the claims of a token with a valid signature, without checking
    /// expiry
    ///
    /// # Errors
    ///
    /// Fails if the token is empty, cannot be parsed, does not carry a valid
    /// signature, or if the key set could not be obtained.
    pub fn get_claims(&self, token: &str) -> Result<Claims, Error> {
        self.inner.claims.get_claims(token)
    }

    /// Looks up the user owning `refresh_token`
    ///
    /// # Errors
    ///
    /// Fails if the token is empty or the platform rejects the lookup.
    pub fn get_user_details(&self, refresh_token: &str) -> Result<UserRecord, Error> {
        self.inner
            .claims
            .get_user_details(RefreshTokenRef::from_str(refresh_token))
    }

    /// Gets the project's key set, from the cache unless `force_refresh` is
    /// set
    ///
    /// # Errors
    ///
    /// Fails if the cache could not be read or the key set could not be
    /// fetched.
    pub fn get_key_set(&self, force_refresh: bool) -> Result<KeySet, Error> {
        self.inner.keys.get_key_set(force_refresh)
    }

    /// The endpoints this client calls
    pub fn endpoints(&self) -> &Endpoints {
        self.inner.http.endpoints()
    }

    /// An authenticated HTTP client for calls this SDK does not wrap
    pub fn http(&self) -> &AuthenticatedClient {
        &self.inner.http
    }

    /// The parser validating token signatures
    pub fn token_parser(&self) -> Arc<TokenParser> {
        Arc::clone(&self.inner.parser)
    }
}

impl<C: Clock> DescopeClient<C> {
    /// Whether `token` carries a valid signature, has not expired, and, when
    /// given, was issued for `audience`
    ///
    /// # Errors
    ///
    /// Fails if the token is empty or malformed, or if the key set could not
    /// be obtained. Tokens that are merely invalid yield `Ok(false)`.
    pub fn verify(&self, token: &str, audience: Option<&str>) -> Result<bool, Error> {
        self.verifier.verify(token, audience)
    }

    /// Whether `token` can no longer be used, including when it cannot be
    /// verified at all
    pub fn token_expired(&self, token: &str) -> bool {
        self.verifier.token_expired(token)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use aliri_clock::DurationSecs;
    use color_eyre::Result;
    use descope_cache::{DelegatedCache, HostStore, HostStoreError};

    use super::*;
    use crate::test;

    #[derive(Clone, Debug, Default)]
    struct SharedStore {
        values: Arc<Mutex<HashMap<String, String>>>,
    }

    impl HostStore for SharedStore {
        fn get_raw(&self, key: &str) -> Result<Option<String>, HostStoreError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        fn set_raw(
            &self,
            key: &str,
            value: String,
            _ttl: DurationSecs,
        ) -> Result<(), HostStoreError> {
            self.values.lock().unwrap().insert(key.to_owned(), value);
            Ok(())
        }

        fn delete_raw(&self, key: &str) -> Result<(), HostStoreError> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn static_public_key_never_calls_transport() -> Result<()> {
        let transport = Arc::new(test::MockTransport::new());
        let config = test::config().with_public_key(test::JWK_1);
        let (client, _) = test::client_with(config, &transport);

        assert!(client.verify(&test::session_token(60), None)?);
        client.get_key_set(true)?;

        assert_eq!(transport.total_calls(), 0);
        Ok(())
    }

    #[test]
    fn invalid_static_public_key_fails_construction() {
        let transport: Arc<dyn HttpTransport> = Arc::new(test::MockTransport::new());
        let config = test::config().with_public_key("{\"keys\":[]}");

        let err = DescopeClient::with_transport(config, transport).unwrap_err();

        assert!(err.is_fetch());
    }

    #[test]
    fn delegated_cache_is_shared_between_clients() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let store = SharedStore::default();

        let first = test::client_with(
            test::config().with_cache(DelegatedCache::new(store.clone())),
            &transport,
        )
        .0;
        let second = test::client_with(
            test::config().with_cache(DelegatedCache::new(store.clone())),
            &transport,
        )
        .0;

        assert!(first.verify(&test::session_token(60), None)?);
        assert!(second.verify(&test::session_token(60), None)?);

        assert_eq!(transport.calls(&test::keys_url()), 1);
        assert!(store.values.lock().unwrap().contains_key("descope:jwks"));
        Ok(())
    }

    #[test]
    fn clones_share_the_key_set() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let clone = client.clone();

        client.get_key_set(false)?;
        clone.get_key_set(false)?;

        assert_eq!(transport.calls(&test::keys_url()), 1);
        Ok(())
    }

    #[test]
    fn management_key_is_carried_to_http_client() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let config = test::config().with_management_key(crate::ManagementKey::from_static("K2key"));
        let (client, _) = test::client_with(config, &transport);

        let headers = client.http().management_headers()?;

        assert_eq!(
            headers[reqwest::header::AUTHORIZATION],
            format!("Bearer {}:K2key", test::PROJECT_ID).as_str()
        );
        Ok(())
    }

    #[test]
    fn client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DescopeClient>();
        assert_send_sync::<DescopeClient<test::SharedClock>>();
    }
}

//! Outbound HTTP plumbing
//!
//! All calls to the identity platform go through an [`HttpTransport`]. The
//! default transport wraps a blocking [`reqwest`] client; tests and hosts
//! with their own HTTP stack can supply another implementation.
//!
//! [`AuthenticatedClient`] attaches the project credentials and SDK
//! identification headers that every platform call requires.

use std::{fmt, sync::Arc, time::Duration};

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    endpoints::Endpoints,
    error::{Error, TransportError, ValidationError},
    ManagementKey,
};

/// The default limit on any single outbound call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const SDK_NAME_HEADER: HeaderName = HeaderName::from_static("x-descope-sdk-name");
const SDK_VERSION_HEADER: HeaderName = HeaderName::from_static("x-descope-sdk-version");
const SDK_NAME: &str = "rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A response received from the identity platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Constructs a response from its parts
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The HTTP status code
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The raw response body
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the status is in the 2xx range
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns a non-success status into an error carrying the body
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Status`] if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Status {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }

    /// Decodes the body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if the body is not the expected
    /// JSON document.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(TransportError::Decode)
    }
}

/// A blocking HTTP client
///
/// Implementations report connection problems and timeouts as
/// [`TransportError::Send`]. Non-success statuses are returned as ordinary
/// responses.
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Sends a `GET` request
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained.
    fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, TransportError>;

    /// Sends a `POST` request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained.
    fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
        T::get(self, url, headers)
    }

    fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        T::post(self, url, headers, body)
    }
}

/// The default transport, backed by a blocking [`reqwest`] client
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Builds a client that gives up on any call after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend could not be initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("descope/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(TransportError::send)?;

        Ok(Self { client })
    }

    /// Uses an already configured client
    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }

    fn execute(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<HttpResponse, TransportError> {
        let response = request.send().map_err(TransportError::send)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(TransportError::send)?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
        self.execute(self.client.get(url).headers(headers.clone()))
    }

    fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        self.execute(self.client.post(url).headers(headers.clone()).json(body))
    }
}

/// Sends requests on behalf of a project
///
/// Every request carries `Authorization: Bearer {projectId}`, or
/// `Bearer {projectId}:{token}` when a token is supplied, along with the
/// SDK identification headers.
#[derive(Clone, Debug)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    endpoints: Arc<Endpoints>,
    management_key: Option<ManagementKey>,
}

impl AuthenticatedClient {
    /// Constructs a client for the project served by `endpoints`
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: Arc<Endpoints>) -> Self {
        Self {
            transport,
            endpoints,
            management_key: None,
        }
    }

    /// Sets the management key used by [`Self::management_headers`]
    pub fn with_management_key(self, key: ManagementKey) -> Self {
        Self {
            management_key: Some(key),
            ..self
        }
    }

    /// The endpoints requests are made against
    #[inline]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Builds the headers for a request, optionally carrying `token`
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the token cannot be sent as a
    /// header value.
    pub fn headers(&self, token: Option<&str>) -> Result<HeaderMap, ValidationError> {
        let project = self.endpoints.project_id();
        let bearer = match token {
            Some(token) => format!("Bearer {}:{}", project, token),
            None => format!("Bearer {}", project),
        };

        let mut authorization =
            HeaderValue::from_str(&bearer).map_err(|_| ValidationError::new("token"))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(header::AUTHORIZATION, authorization);
        headers.insert(SDK_NAME_HEADER, HeaderValue::from_static(SDK_NAME));
        headers.insert(SDK_VERSION_HEADER, HeaderValue::from_static(SDK_VERSION));
        Ok(headers)
    }

    /// Builds the headers for an administrative request
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if no management key is configured.
    pub fn management_headers(&self) -> Result<HeaderMap, ValidationError> {
        let key = self
            .management_key
            .as_ref()
            .ok_or(ValidationError::new("management_key"))?;
        self.headers(Some(key.as_str()))
    }

    /// Sends a `GET` request, failing on a non-success status
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be made or the platform
    /// answered with a non-success status.
    #[tracing::instrument(skip(self, token), fields(http.status_code = tracing::field::Empty))]
    pub fn get(&self, url: &str, token: Option<&str>) -> Result<HttpResponse, Error> {
        let headers = self.headers(token)?;
        let response = self.transport.get(url, &headers)?;
        tracing::Span::current().record("http.status_code", response.status());
        Ok(response.error_for_status()?)
    }

    /// Sends a `POST` request with a JSON body, failing on a non-success
    /// status
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encode`] if the body could not be encoded.
    /// Otherwise fails if the request could not be made or the platform
    /// answered with a non-success status.
    #[tracing::instrument(skip(self, body, token), fields(http.status_code = tracing::field::Empty))]
    pub fn post<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<HttpResponse, Error> {
        let headers = self.headers(token)?;
        let body = serde_json::to_value(body).map_err(TransportError::Encode)?;
        let response = self.transport.post(url, &headers, &body)?;
        tracing::Span::current().record("http.status_code", response.status());
        Ok(response.error_for_status()?)
    }

    /// Sends a `GET` request to a platform path and decodes the JSON answer
    ///
    /// # Errors
    ///
    /// As [`Self::get`], or if the body is not the expected document.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, Error> {
        let response = self.get(&self.endpoints.url(path), token)?;
        Ok(response.json()?)
    }

    /// Sends a `POST` request to a platform path and decodes the JSON answer
    ///
    /// # Errors
    ///
    /// As [`Self::post`], or if the body is not the expected document.
    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, Error> {
        let response = self.post(&self.endpoints.url(path), body, token)?;
        Ok(response.json()?)
    }
}

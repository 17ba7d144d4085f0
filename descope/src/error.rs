//! Errors raised by the SDK
//!
//! Expected verification outcomes (bad signature, expired token, audience
//! mismatch) are reported as `false` by the verifier and never surface here
//! on their own. The types in this module describe the remaining failures.

use std::error::Error as StdError;

pub use descope_cache::CacheError;
use thiserror::Error;

/// A required argument was missing or empty
///
/// Raised before any network or cryptographic work is attempted.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("argument `{argument}` must not be empty or invalid")]
pub struct ValidationError {
    argument: &'static str,
}

impl ValidationError {
    pub(crate) const fn new(argument: &'static str) -> Self {
        Self { argument }
    }

    /// The name of the offending argument
    #[must_use]
    pub fn argument(&self) -> &'static str {
        self.argument
    }
}

/// A remote call to the identity platform failed
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read,
    /// including connection failures and timeouts
    #[error("unable to complete request")]
    Send(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The platform answered with a non-success status
    #[error("request failed with status {status}: {body}")]
    Status {
        /// The HTTP status code
        status: u16,
        /// The response body, lossily decoded as UTF-8
        body: String,
    },

    /// The request body could not be encoded as JSON
    #[error("unable to encode request body")]
    Encode(#[source] serde_json::Error),

    /// The response body was not the expected JSON document
    #[error("unable to decode response body")]
    Decode(#[source] serde_json::Error),
}

impl TransportError {
    /// Wraps a failure to send a request or read its response
    pub fn send(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Send(source.into())
    }

    /// The status code returned by the platform, if one was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The public key set could not be obtained
#[derive(Debug, Error)]
pub enum FetchError {
    /// The key endpoint could not be reached or returned an error status
    #[error("unable to retrieve key set")]
    Transport(#[from] TransportError),

    /// The response was not a JSON document, or a key was malformed
    #[error("malformed key set")]
    MalformedResponse(#[source] serde_json::Error),

    /// The response did not contain a `keys` array
    #[error("key set response has no `keys` array")]
    MissingKeys,

    /// The `keys` array was empty or held no key usable for verification
    #[error("key set contains no usable keys")]
    NoUsableKeys,
}

/// The reason a token could not be parsed
#[derive(Debug, Error)]
pub enum MalformedToken {
    /// The token is not made of three `.`-separated segments
    #[error("expected three `.`-separated segments")]
    Segments,

    /// The header segment is not base64url-encoded JSON
    #[error("malformed token header")]
    Header(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The payload segment is not a base64url-encoded JSON object
    #[error("malformed token payload")]
    Payload(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The signature segment is not base64url-encoded
    #[error("malformed token signature")]
    Signature(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl MalformedToken {
    pub(crate) fn header(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Header(source.into())
    }

    pub(crate) fn payload(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Payload(source.into())
    }

    pub(crate) fn signature(
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self::Signature(source.into())
    }
}

/// A token was rejected
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token is not a well-formed compact JWT
    #[error("token could not be parsed")]
    CouldNotParse(#[from] MalformedToken),

    /// The token is well-formed, but no permitted key and algorithm
    /// validate its signature
    ///
    /// Unknown key ids, disallowed algorithms, and tampered content are
    /// deliberately indistinguishable.
    #[error("token signature is invalid")]
    SignatureInvalid,
}

/// Any error raised by the SDK
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was missing or empty
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The token was rejected
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The public key set could not be obtained
    #[error("unable to obtain public keys")]
    Fetch(#[from] FetchError),

    /// The key set cache failed while being read
    #[error("key set cache failure")]
    Cache(#[from] CacheError),

    /// A remote call failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Whether the token's signature could not be validated
    #[must_use]
    pub fn is_signature_invalid(&self) -> bool {
        matches!(self, Self::Token(TokenError::SignatureInvalid))
    }

    /// Whether the token was not a well-formed compact JWT
    #[must_use]
    pub fn is_could_not_parse(&self) -> bool {
        matches!(self, Self::Token(TokenError::CouldNotParse(_)))
    }

    /// Whether a required argument was missing or empty
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the public key set could not be fetched
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

impl From<MalformedToken> for Error {
    fn from(err: MalformedToken) -> Self {
        Self::Token(TokenError::CouldNotParse(err))
    }
}

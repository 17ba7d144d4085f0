//! Session token verification for projects hosted on the Descope identity
//! platform
//!
//! A session token is a compact JWT signed with one of the project's private
//! keys. Verifying it requires the project's public JSON Web Key Set (JWKS),
//! which this crate fetches from the platform and keeps in a
//! [`KeyCache`](descope_cache::KeyCache) so that verification stays off the
//! network for most requests.
//!
//! # General Flow
//!
//! Build a [`Config`] (from code or the environment), turn it into a
//! [`DescopeClient`], and share that client across your application. Clones
//! are cheap and share the cached key set.
//!
//! ```no_run
//! use descope::{Config, DescopeClient};
//!
//! let config = Config::new("P2CtzUhdqpIF2ys9gg7ms06UvtC4")?;
//! let client = DescopeClient::new(config)?;
//!
//! # let session_token = "";
//! if client.verify(session_token, Some("my-api"))? {
//!     let claims = client.get_claims(session_token)?;
//!     if claims.validate_roles(&["admin"]) {
//!         // ...
//!     }
//! }
//! # Ok::<(), descope::Error>(())
//! ```
//!
//! Outcomes a caller should expect in normal operation (a forged, expired or
//! misdirected token) are reported as `false`. Only problems with the input
//! itself, the network, or the cache surface as an [`Error`].
//!
//! # Caching
//!
//! The key set is cached for an hour. Unless a cache is configured with
//! [`Config::with_cache`], the in-memory cache is used when the
//! `in-memory-cache` feature is enabled (the default); otherwise every
//! verification fetches the key set. Hosts that already run a shared cache
//! can plug it in through [`DelegatedCache`](descope_cache::DelegatedCache).
//!
//! # Features
//!
//! * `in-memory-cache` (default): process-local key set cache
//! * `rustls-tls` (default): TLS through `rustls`
//! * `default-tls`: TLS through the platform's native library
//! * `ec`: accept ES256, ES384 and ES512 tokens

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

mod authz;
mod braids;
pub mod claims;
mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod keys;
pub mod token;
pub mod verifier;


pub use braids::{
    ManagementKey, ManagementKeyRef, ProjectId, ProjectIdRef, RefreshToken, RefreshTokenRef,
};
pub use claims::Claims;
pub use client::DescopeClient;
pub use config::Config;
pub use error::{Error, TokenError, ValidationError};
pub use keys::KeySet;
pub use token::UserRecord;

pub use descope_cache;

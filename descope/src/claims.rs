//! Claims carried by session tokens

use std::sync::Arc;

use aliri_clock::UnixTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::Error,
    token::{TokenParser, UserRecord},
    RefreshTokenRef,
};

/// The claims carried by a session token
///
/// Claims are kept as the raw JSON object that was signed, so that
/// platform-specific claims survive untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Looks up a claim by name
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The claims as a JSON object
    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Takes the claims as a JSON object
    #[inline]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// The `sub` claim
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The `iss` claim
    pub fn issuer(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    /// The raw `aud` claim
    pub fn audience(&self) -> Option<&Value> {
        self.get("aud")
    }

    /// The `exp` claim, in whole seconds
    ///
    /// Fractional expirations are rounded up. A claim that is not a number
    /// is treated as absent.
    pub fn expiration(&self) -> Option<UnixTime> {
        let exp = self.get("exp")?;
        if let Some(secs) = exp.as_u64() {
            return Some(UnixTime(secs));
        }

        let secs = exp.as_f64()?;
        if secs.is_nan() {
            None
        } else if secs <= 0.0 {
            Some(UnixTime(0))
        } else {
            Some(UnixTime(secs.ceil() as u64))
        }
    }

    /// The `tenants` claim, keyed by tenant identifier
    pub fn tenants(&self) -> Option<&Map<String, Value>> {
        self.get("tenants").and_then(Value::as_object)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Reads the claims of signed tokens and the details of their users
#[derive(Clone, Debug)]
pub struct ClaimsExtractor {
    parser: Arc<TokenParser>,
}

impl ClaimsExtractor {
    /// Reads claims using `parser`
    pub fn new(parser: Arc<TokenParser>) -> Self {
        Self { parser }
    }

    /// Returns the claims of a token with a valid signature
    ///
    /// Expiry is not checked.
    ///
    /// # Errors
    ///
    /// Fails if the token is empty, cannot be parsed, does not carry a valid
    /// signature, or if the key set could not be obtained.
    pub fn get_claims(&self, token: &str) -> Result<Claims, Error> {
        Ok(self.parser.parse(token)?.into_claims())
    }

    /// Looks up the user owning `refresh_token`
    ///
    /// # Errors
    ///
    /// Fails if the token is empty or the platform rejects the lookup.
    pub fn get_user_details(&self, refresh_token: &RefreshTokenRef) -> Result<UserRecord, Error> {
        self.parser.get_user_details(refresh_token)
    }
}

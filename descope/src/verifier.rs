//! Validity checks on session tokens

use std::{error::Error as StdError, sync::Arc};

use aliri_clock::{Clock, System};

use crate::{
    error::{Error, TokenError},
    token::TokenParser,
};

/// Decides whether session tokens are currently valid
///
/// Expected rejections (bad signature, expiry, wrong audience) are reported
/// as `false`; only unexpected failures are errors.
#[derive(Clone, Debug)]
pub struct TokenVerifier<C = System> {
    parser: Arc<TokenParser>,
    clock: C,
}

impl TokenVerifier<System> {
    /// Verifies tokens parsed by `parser`, using the system clock
    pub fn new(parser: Arc<TokenParser>) -> Self {
        Self {
            parser,
            clock: System,
        }
    }
}

impl<C> TokenVerifier<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenVerifier<D> {
        TokenVerifier {
            parser: self.parser,
            clock,
        }
    }
}

impl<C: Clock> TokenVerifier<C> {
    /// Whether `token` carries a valid signature, has not expired, and, when
    /// given, was issued for `audience`
    ///
    /// A token is valid only while the current time is strictly before its
    /// `exp` claim. A token without `exp` is never valid. The `aud` claim must
    /// be a string exactly equal to `audience`.
    ///
    /// # Errors
    ///
    /// Fails if the token is empty or malformed, or if the key set could not
    /// be obtained.
    #[tracing::instrument(skip(self, token))]
    pub fn verify(&self, token: &str, audience: Option<&str>) -> Result<bool, Error> {
        let parsed = match self.parser.parse(token) {
            Ok(parsed) => parsed,
            Err(Error::Token(TokenError::SignatureInvalid)) => {
                tracing::debug!("rejecting token with invalid signature");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let claims = parsed.claims();
        let now = self.clock.now();

        match claims.expiration() {
            Some(exp) if now < exp => {}
            Some(exp) => {
                tracing::debug!(jwt.exp = exp.0, now = now.0, "rejecting expired token");
                return Ok(false);
            }
            None => {
                tracing::debug!("rejecting token without expiration");
                return Ok(false);
            }
        }

        if let Some(audience) = audience {
            let matches = claims
                .audience()
                .and_then(serde_json::Value::as_str)
                .map_or(false, |aud| aud == audience);

            if !matches {
                tracing::debug!("rejecting token issued for another audience");
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Whether `token` can no longer be used
    ///
    /// Any failure to parse or validate the token, or to obtain the key set,
    /// counts as expired.
    pub fn token_expired(&self, token: &str) -> bool {
        match self.parser.parse(token) {
            Ok(parsed) => match parsed.claims().expiration() {
                Some(exp) => self.clock.now() >= exp,
                None => true,
            },
            Err(err) => {
                let error: &dyn StdError = &err;
                tracing::debug!(error, "treating unverifiable token as expired");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use crate::test;

    #[test]
    fn valid_token_verifies() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);

        assert!(client.verify(&test::session_token(60), None)?);
        assert!(!client.token_expired(&test::session_token(60)));
        Ok(())
    }

    #[test]
    fn token_expiring_now_is_expired() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::session_token(0);

        assert!(!client.verify(&token, None)?);
        assert!(client.token_expired(&token));
        Ok(())
    }

    #[test]
    fn token_expired_in_the_past_is_rejected() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::session_token(-3600);

        assert!(!client.verify(&token, None)?);
        assert!(client.token_expired(&token));
        Ok(())
    }

    #[test]
    fn token_becomes_invalid_as_clock_advances() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let (client, clock) = test::client_with(test::config(), &transport);
        let token = test::session_token(60);

        clock.advance(59);
        assert!(client.verify(&token, None)?);
        clock.advance(1);
        assert!(!client.verify(&token, None)?);
        Ok(())
    }

    #[test]
    fn fractional_expiry_is_rounded_up() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::sign(test::KEY_ID_1, &json!({ "exp": test::NOW as f64 + 0.5 }));

        assert!(client.verify(&token, None)?);
        Ok(())
    }

    #[test]
    fn missing_expiration_is_rejected() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::sign(test::KEY_ID_1, &json!({ "sub": "U2user" }));

        assert!(!client.verify(&token, None)?);
        assert!(client.token_expired(&token));
        Ok(())
    }

    #[test]
    fn invalid_signature_is_false_not_error() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let unknown_key = test::sign("some-other-key", &json!({ "exp": test::NOW + 60 }));
        let tampered = test::tamper(
            &test::session_token(60),
            &json!({ "exp": test::NOW + 60, "sub": "admin" }),
        );

        assert!(!client.verify(&unknown_key, None)?);
        assert!(!client.verify(&tampered, None)?);
        assert!(client.token_expired(&tampered));
        Ok(())
    }

    #[test]
    fn audience_must_match_exactly() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::sign(
            test::KEY_ID_1,
            &json!({ "exp": test::NOW + 60, "aud": "my-api" }),
        );

        assert!(client.verify(&token, Some("my-api"))?);
        assert!(!client.verify(&token, Some("my-api2"))?);
        assert!(!client.verify(&token, Some("MY-API"))?);
        assert!(client.verify(&token, None)?);
        Ok(())
    }

    #[test]
    fn expiry_wins_over_matching_audience() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::sign(
            test::KEY_ID_1,
            &json!({ "exp": test::NOW - 1, "aud": "my-api" }),
        );

        assert!(!client.verify(&token, Some("my-api"))?);
        Ok(())
    }

    #[test]
    fn forged_claims_are_not_trusted() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let original = test::sign(
            test::KEY_ID_1,
            &json!({ "exp": test::NOW - 60, "aud": "other-api" }),
        );
        let forged = test::tamper(
            &original,
            &json!({ "exp": test::NOW + 3600, "aud": "my-api" }),
        );

        assert!(!client.verify(&forged, Some("my-api"))?);
        assert!(client.token_expired(&forged));
        Ok(())
    }

    #[test]
    fn audience_list_or_absence_never_matches() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let listed = test::sign(
            test::KEY_ID_1,
            &json!({ "exp": test::NOW + 60, "aud": ["my-api"] }),
        );
        let absent = test::session_token(60);

        assert!(!client.verify(&listed, Some("my-api"))?);
        assert!(!client.verify(&absent, Some("my-api"))?);
        Ok(())
    }

    #[test]
    fn empty_token_is_an_error_but_expired() {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);

        assert!(client.verify("", None).unwrap_err().is_validation());
        assert!(client.token_expired(""));
    }

    #[test]
    fn malformed_token_is_an_error() {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);

        let err = client.verify("garbage", None).unwrap_err();

        assert!(err.is_could_not_parse());
        assert!(client.token_expired("garbage"));
    }

    #[test]
    fn key_fetch_failure_is_an_error_but_expired() {
        let transport = std::sync::Arc::new(test::MockTransport::new());
        transport.fail(&test::keys_url());
        let client = test::client(&transport);
        let token = test::session_token(60);

        assert!(client.verify(&token, None).unwrap_err().is_fetch());
        assert!(client.token_expired(&token));
    }

    #[test]
    fn one_fetch_serves_many_verifications() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);

        for ttl in [10, 20, 30] {
            assert!(client.verify(&test::session_token(ttl), None)?);
        }

        assert_eq!(transport.calls(&test::keys_url()), 1);
        Ok(())
    }
}

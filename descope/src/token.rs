//! Parsing and signature validation of session tokens

use std::{error::Error as StdError, sync::Arc};

use aliri::{
    jwa,
    jwk::{KeyId, KeyIdRef},
    jws::Verifier,
};
use aliri_base64::Base64Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    claims::Claims,
    error::{Error, MalformedToken, TokenError, ValidationError},
    http::AuthenticatedClient,
    keys::KeySetProvider,
    RefreshTokenRef,
};

/// A token whose signature has been validated
///
/// Nothing but the signature has been checked; expiry and audience are the
/// verifier's concern.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedToken {
    claims: Claims,
    key_id: KeyId,
    algorithm: jwa::Algorithm,
}

impl ParsedToken {
    /// The token's claims
    #[inline]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Takes the token's claims
    #[inline]
    pub fn into_claims(self) -> Claims {
        self.claims
    }

    /// The identifier of the key that signed the token
    #[inline]
    pub fn key_id(&self) -> &KeyIdRef {
        &self.key_id
    }

    /// The algorithm the token was signed with
    #[inline]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.algorithm
    }
}

/// A tenant membership of a user
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTenant {
    /// The tenant identifier
    pub tenant_id: String,
    /// The tenant's display name
    #[serde(default)]
    pub tenant_name: Option<String>,
    /// The roles granted within the tenant
    #[serde(default)]
    pub role_names: Vec<String>,
}

/// The details of a user, as reported by the platform
///
/// Fields the SDK does not know about are kept in [`UserRecord::extra`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// The user identifier
    #[serde(default)]
    pub user_id: Option<String>,
    /// The login identifiers of the user
    #[serde(default)]
    pub login_ids: Vec<String>,
    /// The display name
    #[serde(default)]
    pub name: Option<String>,
    /// The email address
    #[serde(default)]
    pub email: Option<String>,
    /// The phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether the email address has been verified
    #[serde(default)]
    pub verified_email: bool,
    /// Whether the phone number has been verified
    #[serde(default)]
    pub verified_phone: bool,
    /// Project-level roles
    #[serde(default)]
    pub role_names: Vec<String>,
    /// Tenant memberships
    #[serde(default)]
    pub user_tenants: Vec<UserTenant>,
    /// The account status
    #[serde(default)]
    pub status: Option<String>,
    /// Any other reported fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct UntrustedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<KeyId>,
}

struct Decomposed<'a> {
    header: UntrustedHeader,
    claims: Claims,
    message: &'a str,
    signature: Vec<u8>,
}

fn decompose(token: &str) -> Result<Decomposed<'_>, MalformedToken> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(MalformedToken::Segments);
    };

    let message = &token[..header.len() + 1 + payload.len()];

    let header = Base64Url::from_encoded(header).map_err(MalformedToken::header)?;
    let header: UntrustedHeader =
        serde_json::from_slice(&header.into_inner()).map_err(MalformedToken::header)?;

    let payload = Base64Url::from_encoded(payload).map_err(MalformedToken::payload)?;
    let claims: Claims =
        serde_json::from_slice(&payload.into_inner()).map_err(MalformedToken::payload)?;

    let signature = Base64Url::from_encoded(signature)
        .map_err(MalformedToken::signature)?
        .into_inner();

    Ok(Decomposed {
        header,
        claims,
        message,
        signature,
    })
}

/// Parses tokens and validates their signatures against the project's keys
#[derive(Debug)]
pub struct TokenParser {
    keys: Arc<KeySetProvider>,
    client: AuthenticatedClient,
    allowed_algorithms: Vec<jwa::Algorithm>,
}

impl TokenParser {
    /// Validates tokens against keys from `keys`, accepting only
    /// `allowed_algorithms`
    pub fn new(
        keys: Arc<KeySetProvider>,
        client: AuthenticatedClient,
        allowed_algorithms: Vec<jwa::Algorithm>,
    ) -> Self {
        Self {
            keys,
            client,
            allowed_algorithms,
        }
    }

    /// The signature algorithms a token may use
    pub fn allowed_algorithms(&self) -> &[jwa::Algorithm] {
        &self.allowed_algorithms
    }

    /// Parses `token` and validates its signature
    ///
    /// The token is fully decoded before any key is requested, so malformed
    /// input never reaches the network.
    ///
    /// # Errors
    ///
    /// * [`ValidationError`] if the token is empty
    /// * [`TokenError::CouldNotParse`] if the token is not a well-formed JWT
    /// * [`TokenError::SignatureInvalid`] if the key is unknown, the
    ///   algorithm is not allowed, or the signature does not match
    /// * any error raised while obtaining the key set
    #[tracing::instrument(skip_all)]
    pub fn parse(&self, token: &str) -> Result<ParsedToken, Error> {
        if token.is_empty() {
            return Err(ValidationError::new("token").into());
        }

        let decomposed = decompose(token).map_err(|err| {
            let error: &dyn StdError = &err;
            tracing::debug!(error, "unable to parse token");
            err
        })?;
        let header = &decomposed.header;

        let algorithm = jwa::Algorithm::try_from(header.alg.as_str())
            .ok()
            .filter(|alg| self.allowed_algorithms.contains(alg))
            .ok_or_else(|| {
                tracing::debug!(jwt.alg = %header.alg, "token algorithm not allowed");
                TokenError::SignatureInvalid
            })?;

        let kid = header.kid.as_deref().ok_or_else(|| {
            tracing::debug!("token has no key id");
            TokenError::SignatureInvalid
        })?;

        let keys = self.keys.get_key_set(false)?;
        let key = keys.find(kid, algorithm).ok_or_else(|| {
            tracing::debug!(jwt.kid = %kid, jwt.alg = %algorithm, "no matching key for token");
            TokenError::SignatureInvalid
        })?;

        key.verify(
            algorithm,
            decomposed.message.as_bytes(),
            &decomposed.signature,
        )
        .map_err(|err| {
            let error: &dyn StdError = &err;
            tracing::debug!(error, jwt.kid = %kid, "token signature did not verify");
            TokenError::SignatureInvalid
        })?;

        tracing::trace!(jwt.kid = %kid, jwt.alg = %algorithm, "token signature verified");

        Ok(ParsedToken {
            key_id: kid.to_owned(),
            algorithm,
            claims: decomposed.claims,
        })
    }

    /// Looks up the user owning `refresh_token`
    ///
    /// # Errors
    ///
    /// Fails if the token is empty, the request could not be made, the
    /// platform answered with a non-success status, or the answer could not
    /// be decoded.
    #[tracing::instrument(skip_all)]
    pub fn get_user_details(&self, refresh_token: &RefreshTokenRef) -> Result<UserRecord, Error> {
        if refresh_token.as_str().is_empty() {
            return Err(ValidationError::new("refresh_token").into());
        }

        let url = self.client.endpoints().me();
        let response = self
            .client
            .get(&url, Some(refresh_token.as_str()))
            .map_err(|err| match err {
                Error::Validation(_) => ValidationError::new("refresh_token").into(),
                err => err,
            })?;
        Ok(response.json()?)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use reqwest::header;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::test;

    fn parser(transport: &Arc<test::MockTransport>) -> Arc<TokenParser> {
        test::client(transport).token_parser()
    }

    #[test]
    fn valid_token_parses() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let token = test::session_token(60);

        let parsed = parser(&transport).parse(&token)?;

        assert_eq!(parsed.key_id().as_str(), test::KEY_ID_1);
        assert_eq!(parsed.algorithm(), jwa::Algorithm::RS256);
        assert_eq!(parsed.claims().subject(), Some("U2user"));
        Ok(())
    }

    #[test]
    fn empty_token_is_a_validation_error() {
        let transport = test::MockTransport::serving_keys();
        let err = parser(&transport).parse("").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    #[traced_test]
    fn malformed_tokens_never_fetch_keys() {
        let transport = test::MockTransport::serving_keys();
        let parser = parser(&transport);

        for token in [
            "not-a-jwt",
            "a.b",
            "a.b.c.d",
            "!!!.e30.c2ln",
            "bm90IGpzb24.e30.c2ln",
            "e30.e30.c2ln",
            "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsifQ.!!!.c2ln",
            "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsifQ.WzFd.c2ln",
            "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsifQ.e30.!!!",
        ] {
            let err = parser.parse(token).unwrap_err();
            assert!(err.is_could_not_parse(), "{token}: {err:?}");
        }

        assert_eq!(transport.total_calls(), 0);
        assert!(logs_contain("unable to parse token"));
    }

    #[test]
    fn missing_kid_is_signature_invalid() {
        let transport = test::MockTransport::serving_keys();
        let token = test::sign_with_header(
            test::KEY_1_PEM,
            &json!({ "alg": "RS256" }),
            &json!({ "exp": test::NOW + 60 }),
        );

        let err = parser(&transport).parse(&token).unwrap_err();

        assert!(err.is_signature_invalid());
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    fn unknown_kid_is_signature_invalid() {
        let transport = test::MockTransport::serving_keys();
        let token = test::sign("some-other-key", &json!({ "exp": test::NOW + 60 }));

        let err = parser(&transport).parse(&token).unwrap_err();

        assert!(err.is_signature_invalid());
    }

    #[test]
    fn key_from_another_signer_is_signature_invalid() {
        let transport = test::MockTransport::serving_keys();
        let token = test::sign_with_header(
            test::KEY_2_PEM,
            &json!({ "alg": "RS256", "kid": test::KEY_ID_1 }),
            &json!({ "exp": test::NOW + 60 }),
        );

        let err = parser(&transport).parse(&token).unwrap_err();

        assert!(err.is_signature_invalid());
    }

    #[test]
    fn tampered_payload_is_signature_invalid() {
        let transport = test::MockTransport::serving_keys();
        let token = test::tamper(
            &test::session_token(60),
            &json!({ "sub": "admin", "exp": test::NOW + 6000 }),
        );

        let err = parser(&transport).parse(&token).unwrap_err();

        assert!(err.is_signature_invalid());
    }

    #[test]
    fn disallowed_algorithms_are_signature_invalid() {
        let transport = test::MockTransport::serving_keys();
        let parser = parser(&transport);

        for alg in ["HS256", "none", "RS1", "ES256K"] {
            let token = test::sign_with_header(
                test::KEY_1_PEM,
                &json!({ "alg": alg, "kid": test::KEY_ID_1 }),
                &json!({ "exp": test::NOW + 60 }),
            );
            let err = parser.parse(&token).unwrap_err();
            assert!(err.is_signature_invalid(), "{alg}: {err:?}");
        }
    }

    #[test]
    fn algorithm_outside_configured_list_is_signature_invalid() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let config = test::config().with_allowed_algorithms([jwa::Algorithm::PS256]);
        let (client, _) = test::client_with(config, &transport);

        let err = client
            .token_parser()
            .parse(&test::session_token(60))
            .unwrap_err();

        assert!(err.is_signature_invalid());
        Ok(())
    }

    #[test]
    fn header_algorithm_must_match_key_algorithm() {
        let transport = test::MockTransport::serving_keys();
        let token = test::sign_with_header(
            test::KEY_1_PEM,
            &json!({ "alg": "RS512", "kid": test::KEY_ID_1 }),
            &json!({ "exp": test::NOW + 60 }),
        );

        let err = parser(&transport).parse(&token).unwrap_err();

        assert!(err.is_signature_invalid());
    }

    #[test]
    fn rotated_key_verifies_after_refresh() -> Result<()> {
        let transport = test::MockTransport::serving_keys();
        let client = test::client(&transport);
        let token = test::sign_with_header(
            test::KEY_2_PEM,
            &json!({ "alg": "RS256", "kid": test::KEY_ID_2 }),
            &json!({ "exp": test::NOW + 60 }),
        );

        assert!(client.token_parser().parse(&token).unwrap_err().is_signature_invalid());

        transport.respond(&test::keys_url(), 200, test::JWKS_ROTATED);
        client.get_key_set(true)?;

        let parsed = client.token_parser().parse(&token)?;
        assert_eq!(parsed.key_id().as_str(), test::KEY_ID_2);
        Ok(())
    }

    #[test]
    fn key_fetch_failure_propagates() {
        let transport = Arc::new(test::MockTransport::new());
        transport.fail(&test::keys_url());

        let err = parser(&transport)
            .parse(&test::session_token(60))
            .unwrap_err();

        assert!(err.is_fetch());
    }

    #[test]
    fn user_details_use_refresh_token_bearer() -> Result<()> {
        let transport = Arc::new(test::MockTransport::new());
        transport.respond(
            &test::me_url(),
            200,
            r#"{
                "userId": "U2user",
                "loginIds": ["someone@example.com"],
                "email": "someone@example.com",
                "verifiedEmail": true,
                "userTenants": [{ "tenantId": "T1", "roleNames": ["admin"] }],
                "picture": "https://example.com/me.png"
            }"#,
        );

        let user = parser(&transport)
            .get_user_details(RefreshTokenRef::from_str("refresh-me"))?;

        assert_eq!(user.user_id.as_deref(), Some("U2user"));
        assert!(user.verified_email);
        assert_eq!(user.user_tenants[0].role_names, ["admin"]);
        assert_eq!(user.extra["picture"], "https://example.com/me.png");

        let request = transport
            .last_request(&test::me_url())
            .expect("request recorded");
        assert_eq!(request.method, "GET");
        assert_eq!(
            request.headers[header::AUTHORIZATION],
            format!("Bearer {}:refresh-me", test::PROJECT_ID).as_str()
        );
        Ok(())
    }

    #[test]
    fn user_details_require_a_refresh_token() {
        let transport = Arc::new(test::MockTransport::new());
        let err = parser(&transport)
            .get_user_details(RefreshTokenRef::from_str(""))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    fn unsendable_refresh_token_is_named_in_the_error() {
        let transport = Arc::new(test::MockTransport::new());
        let err = parser(&transport)
            .get_user_details(RefreshTokenRef::from_str("abc\ndef"))
            .unwrap_err();

        match err {
            Error::Validation(err) => assert_eq!(err.argument(), "refresh_token"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    fn user_details_rejection_is_a_transport_error() {
        let transport = Arc::new(test::MockTransport::new());
        transport.respond(&test::me_url(), 401, r#"{"errorCode":"E061004"}"#);

        let err = parser(&transport)
            .get_user_details(RefreshTokenRef::from_str("expired"))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(crate::error::TransportError::Status { status: 401, .. })
        ));
    }
}

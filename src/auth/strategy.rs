//! The ways a bearer token can be verified.
//!
//! The [IdentityResolver](crate::auth::IdentityResolver) tries these in order
//! and accepts the first success.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use serde::Deserialize;

use crate::auth::{AuthError, Claims, KeySetCache, TokenPayload, UnverifiedToken, UserMetadata};

/// One way of turning a bearer token into verified [Claims].
#[async_trait]
pub trait VerificationStrategy: Send + Sync {
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// Verify `token`, whose decoded but unverified contents are `unverified`.
    async fn verify(&self, token: &str, unverified: &UnverifiedToken) -> Result<Claims, AuthError>;
}

/// Verifies the signature with a secret shared with the identity provider (HS256).
pub struct SharedSecretStrategy {
    key: DecodingKey,
}

impl SharedSecretStrategy {
    /// Create a strategy for the shared `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl VerificationStrategy for SharedSecretStrategy {
    fn name(&self) -> &'static str {
        "shared secret"
    }

    async fn verify(&self, token: &str, unverified: &UnverifiedToken) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&unverified.payload.expected_audiences());

        let payload = decode::<TokenPayload>(token, &self.key, &validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        Claims::try_from(payload)
    }
}

/// Verifies the signature against the identity provider's published key set.
///
/// The issuer and audience are checked against the token's own `iss` and
/// `aud` claims.
pub struct KeySetStrategy {
    cache: Arc<KeySetCache>,
}

impl KeySetStrategy {
    /// Create a strategy that reads keys from `cache`.
    pub fn new(cache: Arc<KeySetCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl VerificationStrategy for KeySetStrategy {
    fn name(&self) -> &'static str {
        "key set"
    }

    async fn verify(&self, token: &str, unverified: &UnverifiedToken) -> Result<Claims, AuthError> {
        let key_set = self.cache.get().await?;

        let result = verify_with_key_set(token, unverified, &key_set);
        match &result {
            Ok(_) => self.cache.record_success(),
            Err(_) => self.cache.record_failure(),
        }

        result
    }
}

fn verify_with_key_set(
    token: &str,
    unverified: &UnverifiedToken,
    key_set: &JwkSet,
) -> Result<Claims, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::Malformed)?;

    let jwk = match &header.kid {
        Some(kid) => key_set.find(kid),
        None if key_set.keys.len() == 1 => key_set.keys.first(),
        None => None,
    }
    .ok_or(AuthError::UnknownSigningKey)?;

    let key = DecodingKey::from_jwk(jwk).map_err(|_| AuthError::UnknownSigningKey)?;

    let mut validation = Validation::new(header.alg);
    if let Some(issuer) = &unverified.payload.iss {
        validation.set_issuer(&[issuer]);
    }
    validation.set_audience(&unverified.payload.expected_audiences());

    let payload = decode::<TokenPayload>(token, &key, &validation)
        .map_err(|_| AuthError::InvalidToken)?
        .claims;

    Claims::try_from(payload)
}

/// The user profile returned by the identity provider's "current user" endpoint.
#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Option<String>,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

/// Asks the identity provider who the token belongs to.
pub struct IntrospectionStrategy {
    client: reqwest::Client,
    user_url: String,
    anon_key: Option<String>,
}

impl IntrospectionStrategy {
    /// Create a strategy that calls the provider at `provider_url`.
    pub fn new(client: reqwest::Client, provider_url: &str, anon_key: Option<String>) -> Self {
        Self {
            client,
            user_url: format!("{}/auth/v1/user", provider_url.trim_end_matches('/')),
            anon_key,
        }
    }
}

#[async_trait]
impl VerificationStrategy for IntrospectionStrategy {
    fn name(&self) -> &'static str {
        "introspection"
    }

    async fn verify(&self, token: &str, _: &UnverifiedToken) -> Result<Claims, AuthError> {
        let mut request = self.client.get(&self.user_url).bearer_auth(token);
        if let Some(anon_key) = &self.anon_key {
            request = request.header("apikey", anon_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| AuthError::ProviderUnreachable(error.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!(
                "Identity provider rejected the token with status {}",
                response.status()
            );
            return Err(AuthError::InvalidToken);
        }

        let user: ProviderUser = response
            .json()
            .await
            .map_err(|error| AuthError::ProviderUnreachable(error.to_string()))?;

        Claims::from_profile(user.id, user.email, user.user_metadata.unwrap_or_default())
    }
}

/// Accepts the decoded claims without any verification.
///
/// **Insecure**: only ever registered when the server runs in development mode.
pub struct UnverifiedStrategy;

#[async_trait]
impl VerificationStrategy for UnverifiedStrategy {
    fn name(&self) -> &'static str {
        "unverified (development)"
    }

    async fn verify(&self, _: &str, unverified: &UnverifiedToken) -> Result<Claims, AuthError> {
        tracing::warn!("Accepting an unverified token because the server is in development mode");

        Claims::try_from(unverified.payload.clone())
    }
}

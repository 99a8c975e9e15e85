//! Resolves bearer tokens to caller identities.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;

use crate::{
    auth::{
        AuthError, Claims, HttpKeySetFetcher, KeySetCache, UnverifiedToken,
        key_set::KEY_SET_FETCH_TIMEOUT,
        strategy::{
            IntrospectionStrategy, KeySetStrategy, SharedSecretStrategy, UnverifiedStrategy,
            VerificationStrategy,
        },
    },
    config::RuntimeMode,
};

/// The settings needed to talk to the identity provider.
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    /// The identity provider's base URL, e.g. "https://abc.supabase.co".
    pub provider_url: Option<String>,
    /// The provider's public anon key, sent along with introspection calls.
    pub anon_key: Option<String>,
    /// A secret shared with the provider for HS256 signed tokens.
    pub jwt_secret: Option<String>,
    /// Whether unverified tokens may be accepted as a last resort.
    pub mode: RuntimeMode,
    /// How long a fetched key set stays cached.
    pub key_set_refresh_interval: Duration,
}

/// Verifies bearer tokens by trying an ordered list of strategies.
pub struct IdentityResolver {
    strategies: Vec<Box<dyn VerificationStrategy>>,
    key_set: Option<Arc<KeySetCache>>,
}

impl IdentityResolver {
    /// Create a resolver with no strategies. Every token is rejected until one is added.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            key_set: None,
        }
    }

    /// Add `strategy` to the end of the chain.
    pub fn with_strategy(mut self, strategy: impl VerificationStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Add a key set strategy backed by `cache` to the end of the chain.
    pub fn with_key_set(mut self, cache: Arc<KeySetCache>) -> Self {
        self.strategies.push(Box::new(KeySetStrategy::new(cache.clone())));
        self.key_set = Some(cache);
        self
    }

    /// Build the strategy chain for `settings`.
    ///
    /// The order is: shared secret (if configured), key set and introspection
    /// (if a provider URL is configured), then unverified claims in development mode.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_settings(settings: &IdentitySettings) -> Result<Self, reqwest::Error> {
        let mut resolver = Self::new();

        if let Some(secret) = &settings.jwt_secret {
            resolver = resolver.with_strategy(SharedSecretStrategy::new(secret));
        }

        match &settings.provider_url {
            Some(provider_url) => {
                let client = reqwest::Client::builder()
                    .timeout(KEY_SET_FETCH_TIMEOUT)
                    .build()?;

                let fetcher = HttpKeySetFetcher::new(client.clone(), provider_url);
                let cache = KeySetCache::new(Box::new(fetcher), settings.key_set_refresh_interval);

                resolver = resolver
                    .with_key_set(Arc::new(cache))
                    .with_strategy(IntrospectionStrategy::new(
                        client,
                        provider_url,
                        settings.anon_key.clone(),
                    ));
            }
            None => tracing::warn!(
                "No identity provider URL configured, key set and introspection verification are disabled"
            ),
        }

        if settings.mode == RuntimeMode::Development {
            tracing::warn!("Development mode: unverified tokens will be accepted as a last resort");
            resolver = resolver.with_strategy(UnverifiedStrategy);
        }

        Ok(resolver)
    }

    /// The key set cache, if key set verification is enabled.
    pub fn key_set(&self) -> Option<&Arc<KeySetCache>> {
        self.key_set.as_ref()
    }

    /// Verify `token` and extract the caller's claims.
    ///
    /// Expired tokens are rejected before any strategy is tried.
    ///
    /// # Errors
    /// Returns:
    /// - [AuthError::Malformed] if `token` is not a JWT,
    /// - [AuthError::Expired] if its `exp` claim has passed,
    /// - [AuthError::InvalidToken] if no strategy accepted it.
    pub async fn resolve(&self, token: &str) -> Result<Claims, AuthError> {
        let unverified = UnverifiedToken::decode(token)?;
        unverified.check_expiry(OffsetDateTime::now_utc())?;

        for strategy in &self.strategies {
            match strategy.verify(token, &unverified).await {
                Ok(claims) => {
                    tracing::debug!("Token verified by the {} strategy", strategy.name());
                    return Ok(claims);
                }
                Err(error) => {
                    tracing::debug!("The {} strategy rejected the token: {error}", strategy.name());
                }
            }
        }

        Err(AuthError::InvalidToken)
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

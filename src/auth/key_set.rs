//! Fetching and caching the identity provider's published verification keys.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::auth::AuthError;

/// The longest a key set fetch may take before it is abandoned.
pub const KEY_SET_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The default lifetime of a cached key set (or a cached fetch failure).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Consecutive signature failures against a cached key set that trigger an
/// early refetch.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// The default spacing between early refetches triggered by signature failures.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Build the key set URL for an identity provider base URL.
pub fn key_set_url(provider_url: &str) -> String {
    format!(
        "{}/auth/v1/.well-known/jwks.json",
        provider_url.trim_end_matches('/')
    )
}

/// A source of verification keys.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch the current key set.
    async fn fetch(&self) -> Result<JwkSet, String>;

    /// Where the keys are fetched from, for diagnostics.
    fn location(&self) -> &str;
}

/// Fetches the key set over HTTP.
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for the key set of the provider at `provider_url`.
    pub fn new(client: reqwest::Client, provider_url: &str) -> Self {
        Self {
            client,
            url: key_set_url(provider_url),
        }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<JwkSet, String> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(KEY_SET_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let key_set: JwkSet = response.json().await.map_err(|error| error.to_string())?;

        if key_set.keys.is_empty() {
            return Err("key set response has no keys".to_owned());
        }

        Ok(key_set)
    }

    fn location(&self) -> &str {
        &self.url
    }
}

struct CacheEntry {
    outcome: Result<Arc<JwkSet>, String>,
    fetched_at: Instant,
}

/// A summary of one cached key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeySummary {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
}

/// The state of the key set cache, for the health and debug endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeySetStatus {
    /// No fetch has happened yet.
    NotFetched,
    /// The last fetch succeeded.
    Available {
        keys: usize,
        sample: Option<KeySummary>,
    },
    /// The last fetch failed.
    Unavailable { error: String },
}

/// A read-through cache for the verification key set.
///
/// The outcome of a fetch, success or failure, is kept for
/// `refresh_interval`. A cached key set is refetched early once
/// `failure_threshold` signatures in a row failed to verify against it, but
/// no sooner than `min_refetch_interval` (default [MIN_REFETCH_INTERVAL])
/// after the previous fetch.
pub struct KeySetCache {
    fetcher: Box<dyn KeySetFetcher>,
    refresh_interval: Duration,
    failure_threshold: u32,
    min_refetch_interval: Duration,
    consecutive_failures: AtomicU32,
    entry: RwLock<Option<CacheEntry>>,
}

impl KeySetCache {
    /// Create an empty cache. Nothing is fetched until the first call to [KeySetCache::get].
    pub fn new(fetcher: Box<dyn KeySetFetcher>, refresh_interval: Duration) -> Self {
        Self {
            fetcher,
            refresh_interval,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            min_refetch_interval: MIN_REFETCH_INTERVAL,
            consecutive_failures: AtomicU32::new(0),
            entry: RwLock::new(None),
        }
    }

    /// Set how many consecutive verification failures trigger an early refetch.
    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    /// Set the minimum age of a cached key set before failures can trigger a refetch.
    pub fn with_min_refetch_interval(mut self, min_refetch_interval: Duration) -> Self {
        self.min_refetch_interval = min_refetch_interval;
        self
    }

    /// Where the keys are fetched from.
    pub fn location(&self) -> &str {
        self.fetcher.location()
    }

    /// Get the key set, fetching it if there is no fresh cache entry.
    ///
    /// # Errors
    /// Returns [AuthError::KeySetUnavailable] if the current (possibly cached)
    /// fetch outcome is a failure.
    pub async fn get(&self) -> Result<Arc<JwkSet>, AuthError> {
        {
            let entry = self.entry.read().await;
            if let Some(outcome) = self.fresh_outcome(entry.as_ref()) {
                return outcome;
            }
        }

        let mut entry = self.entry.write().await;
        // Another request may have refreshed the entry while we waited for the lock.
        if let Some(outcome) = self.fresh_outcome(entry.as_ref()) {
            return outcome;
        }

        tracing::info!("Fetching verification keys from {}", self.location());
        let outcome = match tokio::time::timeout(KEY_SET_FETCH_TIMEOUT, self.fetcher.fetch()).await
        {
            Ok(Ok(key_set)) => Ok(Arc::new(key_set)),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(format!(
                "timed out after {} seconds",
                KEY_SET_FETCH_TIMEOUT.as_secs()
            )),
        };

        if let Err(error) = &outcome {
            tracing::error!("Failed to fetch verification keys: {error}");
        }

        self.consecutive_failures.store(0, Ordering::Relaxed);
        *entry = Some(CacheEntry {
            outcome: outcome.clone(),
            fetched_at: Instant::now(),
        });

        outcome.map_err(AuthError::KeySetUnavailable)
    }

    /// Record that a signature verified against the cached keys.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record that a signature did not verify against the cached keys.
    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Report the cache state without fetching.
    pub async fn status(&self) -> KeySetStatus {
        let entry = self.entry.read().await;

        match entry.as_ref().map(|entry| &entry.outcome) {
            None => KeySetStatus::NotFetched,
            Some(Ok(key_set)) => KeySetStatus::Available {
                keys: key_set.keys.len(),
                sample: key_set.keys.first().map(summarize_key),
            },
            Some(Err(error)) => KeySetStatus::Unavailable {
                error: error.clone(),
            },
        }
    }

    fn fresh_outcome(
        &self,
        entry: Option<&CacheEntry>,
    ) -> Option<Result<Arc<JwkSet>, AuthError>> {
        let entry = entry?;
        let age = entry.fetched_at.elapsed();

        if age >= self.refresh_interval {
            return None;
        }

        let too_many_failures =
            self.consecutive_failures.load(Ordering::Relaxed) >= self.failure_threshold;
        if entry.outcome.is_ok() && too_many_failures && age >= self.min_refetch_interval {
            return None;
        }

        Some(entry.outcome.clone().map_err(AuthError::KeySetUnavailable))
    }
}

fn summarize_key(jwk: &jsonwebtoken::jwk::Jwk) -> KeySummary {
    use jsonwebtoken::jwk::AlgorithmParameters;

    let kty = match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(_) => "EC",
        AlgorithmParameters::RSA(_) => "RSA",
        AlgorithmParameters::OctetKey(_) => "oct",
        AlgorithmParameters::OctetKeyPair(_) => "OKP",
    };

    KeySummary {
        kty: kty.to_owned(),
        kid: jwk.common.key_id.clone(),
        alg: jwk
            .common
            .key_algorithm
            .as_ref()
            .map(|algorithm| format!("{algorithm:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use jsonwebtoken::jwk::JwkSet;

    use crate::{
        auth::{
            AuthError,
            key_set::{KeySetCache, KeySetFetcher, KeySetStatus, key_set_url},
        },
        test_utils::test_key_set,
    };

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        result: Result<JwkSet, String>,
    }

    #[async_trait]
    impl KeySetFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<JwkSet, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        fn location(&self) -> &str {
            "test://keys"
        }
    }

    fn cache_with(
        result: Result<JwkSet, String>,
        refresh: Duration,
    ) -> (KeySetCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = CountingFetcher {
            calls: calls.clone(),
            result,
        };

        (KeySetCache::new(Box::new(fetcher), refresh), calls)
    }

    #[test]
    fn builds_key_set_url() {
        assert_eq!(
            key_set_url("https://abc.supabase.co/"),
            "https://abc.supabase.co/auth/v1/.well-known/jwks.json"
        );
    }

    #[tokio::test]
    async fn fetches_once_while_fresh() {
        let (cache, calls) = cache_with(Ok(test_key_set()), Duration::from_secs(3600));

        cache.get().await.unwrap();
        cache.get().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remembers_failures() {
        let (cache, calls) = cache_with(Err("boom".to_owned()), Duration::from_secs(3600));

        let first = cache.get().await;
        let second = cache.get().await;

        assert_eq!(first, Err(AuthError::KeySetUnavailable("boom".to_owned())));
        assert_eq!(second, Err(AuthError::KeySetUnavailable("boom".to_owned())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_after_refresh_interval() {
        let (cache, calls) = cache_with(Err("boom".to_owned()), Duration::ZERO);

        let _ = cache.get().await;
        let _ = cache.get().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_do_not_refetch_before_minimum_interval() {
        let (cache, calls) = cache_with(Ok(test_key_set()), Duration::from_secs(3600));
        let cache = cache.with_failure_threshold(1);

        cache.get().await.unwrap();
        cache.record_failure();
        cache.get().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_after_repeated_failures() {
        let (cache, calls) = cache_with(Ok(test_key_set()), Duration::from_secs(3600));
        let cache = cache
            .with_failure_threshold(2)
            .with_min_refetch_interval(Duration::ZERO);

        cache.get().await.unwrap();
        cache.record_failure();
        cache.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.record_failure();
        cache.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The refetch starts the count again.
        cache.record_failure();
        cache.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let (cache, calls) = cache_with(Ok(test_key_set()), Duration::from_secs(3600));
        let cache = cache
            .with_failure_threshold(2)
            .with_min_refetch_interval(Duration::ZERO);

        cache.get().await.unwrap();
        cache.record_failure();
        cache.record_success();
        cache.record_failure();
        cache.get().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_status() {
        let (cache, _) = cache_with(Ok(test_key_set()), Duration::from_secs(3600));
        assert_eq!(cache.status().await, KeySetStatus::NotFetched);

        cache.get().await.unwrap();

        match cache.status().await {
            KeySetStatus::Available { keys, sample } => {
                assert_eq!(keys, 1);
                let sample = sample.unwrap();
                assert_eq!(sample.kty, "oct");
                assert_eq!(sample.kid.as_deref(), Some("test-key"));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
}

//! JWKS key resolution.
//!
//! Keys are cached per `kid` with a 24h freshness window and refreshed lazily
//! on lookup miss. Fetches against the identity provider are throttled to a
//! global budget of 10 requests per sliding minute; callers beyond the budget
//! fail fast instead of queuing, so a key rotation cannot turn into a
//! thundering herd against the JWKS endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::services::auth::verifier::AuthError;

/// 鍵のキャッシュ保持期間（24時間）。
pub const DEFAULT_KEY_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// JWKS エンドポイントへのフェッチ上限（回/分）。
pub const MAX_FETCHES_PER_MINUTE: usize = 10;

const FETCH_WINDOW: Duration = Duration::from_secs(60);

/// JWKS レスポンスの構造体。
#[derive(Debug, Clone, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    #[allow(dead_code)]
    kty: String,
    n: String,
    e: String,
}

/// 取得済み RSA 公開鍵の素材（base64url の n/e）。
#[derive(Debug, Clone)]
pub struct JwkKey {
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// JwksFetcher は JWKS エンドポイントからの鍵取得を抽象化するトレイト。
#[async_trait::async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<Vec<JwkKey>, AuthError>;
}

/// HTTP 経由で JWKS を取得するデフォルト実装。
pub struct HttpJwksFetcher {
    http: reqwest::Client,
}

impl HttpJwksFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<Vec<JwkKey>, AuthError> {
        let resp: JwksResponse = self
            .http
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;

        Ok(resp
            .keys
            .into_iter()
            .map(|k| JwkKey {
                kid: k.kid,
                n: k.n,
                e: k.e,
            })
            .collect())
    }
}

struct CachedKey {
    key: JwkKey,
    fetched_at: Instant,
}

/// KeyResolver は kid から署名検証用の公開鍵を解決する。
///
/// キャッシュは kid 単位。同じ未キャッシュ kid への並行 lookup が
/// それぞれフェッチしても結果は冪等で、後勝ちで問題ない。
pub struct KeyResolver {
    jwks_url: String,
    key_max_age: Duration,
    cache: RwLock<HashMap<String, CachedKey>>,
    fetch_log: Mutex<VecDeque<Instant>>,
    fetcher: Arc<dyn JwksFetcher>,
}

impl KeyResolver {
    pub fn new(
        jwks_url: impl Into<String>,
        key_max_age: Duration,
        fetcher: Arc<dyn JwksFetcher>,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            key_max_age,
            cache: RwLock::new(HashMap::new()),
            fetch_log: Mutex::new(VecDeque::new()),
            fetcher,
        }
    }

    /// kid に対応する公開鍵を返す。キャッシュが新しければネットワークに出ない。
    pub async fn resolve(&self, kid: &str) -> Result<JwkKey, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(kid)
                && cached.fetched_at.elapsed() < self.key_max_age
            {
                return Ok(cached.key.clone());
            }
        }

        self.reserve_fetch_slot().await?;

        let keys = self.fetcher.fetch_keys(&self.jwks_url).await?;
        tracing::debug!(count = keys.len(), "refreshed JWKS key set");

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        for key in keys {
            cache.insert(key.kid.clone(), CachedKey { key, fetched_at: now });
        }

        match cache.get(kid) {
            Some(cached) => Ok(cached.key.clone()),
            None => Err(AuthError::KeyNotFound(kid.to_string())),
        }
    }

    /// スライディングウィンドウでフェッチ回数を制限する。
    /// 上限超過は待たずに即エラー。
    async fn reserve_fetch_slot(&self) -> Result<(), AuthError> {
        let mut log = self.fetch_log.lock().await;

        while log.front().is_some_and(|t| t.elapsed() >= FETCH_WINDOW) {
            log.pop_front();
        }

        if log.len() >= MAX_FETCHES_PER_MINUTE {
            tracing::warn!("JWKS fetch rate limit exceeded");
            return Err(AuthError::JwksRateLimited);
        }

        log.push_back(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::testutil::{CountingFetcher, MockFetcher};

    fn test_key(kid: &str) -> JwkKey {
        JwkKey {
            kid: kid.into(),
            n: "AQAB-n".into(),
            e: "AQAB".into(),
        }
    }

    #[tokio::test]
    async fn resolve_hits_cache_within_max_age() {
        let (fetcher, count) = CountingFetcher::new(vec![test_key("kid-1")]);
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            DEFAULT_KEY_MAX_AGE,
            Arc::new(fetcher),
        );

        resolver.resolve("kid-1").await.unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);

        // second lookup within 24h: no network call
        resolver.resolve("kid-1").await.unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_refetches_after_expiry() {
        let (fetcher, count) = CountingFetcher::new(vec![test_key("kid-1")]);
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            Duration::ZERO,
            Arc::new(fetcher),
        );

        resolver.resolve("kid-1").await.unwrap();
        resolver.resolve("kid-1").await.unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resolve_unknown_kid_is_key_not_found() {
        let fetcher = MockFetcher::new(vec![test_key("kid-1")]);
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            DEFAULT_KEY_MAX_AGE,
            Arc::new(fetcher),
        );

        let err = resolver.resolve("kid-2").await.unwrap_err();
        assert!(matches!(err, AuthError::KeyNotFound(kid) if kid == "kid-2"));
    }

    #[tokio::test]
    async fn resolve_caches_every_fetched_key() {
        let (fetcher, count) = CountingFetcher::new(vec![test_key("kid-1"), test_key("kid-2")]);
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            DEFAULT_KEY_MAX_AGE,
            Arc::new(fetcher),
        );

        resolver.resolve("kid-1").await.unwrap();
        // kid-2 arrived in the same key set; no second fetch
        resolver.resolve("kid-2").await.unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_rate_limit_fails_fast() {
        let fetcher = MockFetcher::new(vec![]);
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            DEFAULT_KEY_MAX_AGE,
            Arc::new(fetcher),
        );

        // every miss triggers a fetch; the budget is 10 per minute
        for _ in 0..MAX_FETCHES_PER_MINUTE {
            let err = resolver.resolve("missing").await.unwrap_err();
            assert!(matches!(err, AuthError::KeyNotFound(_)));
        }

        let err = resolver.resolve("missing").await.unwrap_err();
        assert!(matches!(err, AuthError::JwksRateLimited));
    }

    #[tokio::test]
    async fn cache_hit_does_not_consume_fetch_budget() {
        let (fetcher, count) = CountingFetcher::new(vec![test_key("kid-1")]);
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            DEFAULT_KEY_MAX_AGE,
            Arc::new(fetcher),
        );

        for _ in 0..(MAX_FETCHES_PER_MINUTE * 2) {
            resolver.resolve("kid-1").await.unwrap();
        }
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}

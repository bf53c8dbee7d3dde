// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching, per tenant.
//!
//! ## Refresh policy
//!
//! - First use of a tenant fetches its key set from the realm's cert endpoint
//! - A cached set older than the refresh interval is refreshed on next use
//!   (and by the background [`JwksRefresher`])
//! - A token whose `kid` is not in the cached set forces a refresh, at most
//!   once per rate-limit window per tenant
//! - Failed refreshes are logged and never evict the cached set; validation
//!   keeps using the last-known-good keys
//!
//! No lock is held across a network fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::tenants::{TenantConfig, TenantRegistry};

/// Default periodic refresh interval (1 hour).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Default minimum spacing of forced refreshes (5 minutes).
pub const DEFAULT_REFRESH_RATE_LIMIT: Duration = Duration::from_secs(300);

/// Default fetch timeout (10 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of key sets.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<JwkSet, AuthError>;
}

/// Fetches key sets over HTTP(S) with a bounded timeout.
#[derive(Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetchFailed(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))
    }
}

/// Cache timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwksSettings {
    pub refresh_interval: Duration,
    pub refresh_rate_limit: Duration,
}

impl Default for JwksSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_rate_limit: DEFAULT_REFRESH_RATE_LIMIT,
        }
    }
}

/// Per-tenant cache entry.
struct CacheEntry {
    keys: Arc<JwkSet>,
    refreshed_at: Instant,
    /// Last in-request refresh of a stale set, successful or not
    last_stale_attempt: Option<Instant>,
    last_forced: Option<Instant>,
}

/// A key resolved for verification.
pub struct VerificationKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Per-tenant JWKS cache keyed by issuer.
pub struct JwksCache {
    fetcher: Arc<dyn KeySetFetcher>,
    settings: JwksSettings,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl JwksCache {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, settings: JwksSettings) -> Self {
        Self {
            fetcher,
            settings,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> JwksSettings {
        self.settings
    }

    /// Current key set of a tenant.
    ///
    /// Fetches on first use and refreshes a set older than the refresh
    /// interval; a failed refresh of a stale set returns the stale set.
    /// Stale refreshes are throttled per tenant by the refresh rate limit,
    /// so an unreachable provider costs one fetch per window, not one per
    /// request.
    pub async fn get_keys(&self, tenant: &TenantConfig) -> Result<Arc<JwkSet>, AuthError> {
        let cached = {
            let entries = self.entries.read().await;
            entries
                .get(&tenant.issuer)
                .map(|e| (Arc::clone(&e.keys), e.refreshed_at.elapsed()))
        };

        match cached {
            Some((keys, age)) if age < self.settings.refresh_interval => Ok(keys),
            Some((stale, _)) => {
                if let Some(current) = self.claim_stale_refresh(&tenant.issuer).await {
                    return Ok(current);
                }
                match self.refresh(tenant).await {
                    Ok(keys) => Ok(keys),
                    Err(_) => Ok(stale),
                }
            }
            None => self.refresh(tenant).await,
        }
    }

    /// Fetch the key set unconditionally and store it.
    ///
    /// On failure the cached set, if any, is left untouched.
    pub async fn refresh(&self, tenant: &TenantConfig) -> Result<Arc<JwkSet>, AuthError> {
        let url = tenant.cert_endpoint();
        match self.fetcher.fetch(&url).await {
            Ok(jwks) => {
                let keys = Arc::new(jwks);
                let mut entries = self.entries.write().await;
                let entry = entries.entry(tenant.issuer.clone()).or_insert_with(|| CacheEntry {
                    keys: Arc::clone(&keys),
                    refreshed_at: Instant::now(),
                    last_stale_attempt: None,
                    last_forced: None,
                });
                entry.keys = Arc::clone(&keys);
                entry.refreshed_at = Instant::now();
                debug!(
                    issuer = %tenant.issuer,
                    keys = keys.keys.len(),
                    "JWKS refreshed"
                );
                Ok(keys)
            }
            Err(e) => {
                warn!(issuer = %tenant.issuer, url = %url, error = ?e, "JWKS refresh failed");
                Err(e)
            }
        }
    }

    /// Claim the right to refresh a stale set.
    ///
    /// Returns the cached set instead when another refresh was attempted
    /// within the rate limit window.
    async fn claim_stale_refresh(&self, issuer: &str) -> Option<Arc<JwkSet>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(issuer)?;
        if entry
            .last_stale_attempt
            .is_some_and(|t| t.elapsed() < self.settings.refresh_rate_limit)
        {
            return Some(Arc::clone(&entry.keys));
        }
        entry.last_stale_attempt = Some(Instant::now());
        None
    }

    /// Refresh because a token referenced an unknown key id.
    ///
    /// Returns `None` when the rate limit suppressed the fetch.
    async fn force_refresh(&self, tenant: &TenantConfig) -> Option<Arc<JwkSet>> {
        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(&tenant.issuer) {
                if entry
                    .last_forced
                    .is_some_and(|t| t.elapsed() < self.settings.refresh_rate_limit)
                {
                    debug!(issuer = %tenant.issuer, "Forced JWKS refresh rate limited");
                    return None;
                }
                // Claimed before fetching so concurrent callers are throttled too
                entry.last_forced = Some(Instant::now());
            }
        }

        self.refresh(tenant).await.ok()
    }

    /// Resolve the verification key for a token header.
    ///
    /// Tokens without a `kid` are only accepted when the set holds exactly
    /// one signing key. An unknown `kid` after a (possibly rate-limited)
    /// forced refresh is reported as an invalid signature.
    pub async fn find_key(
        &self,
        tenant: &TenantConfig,
        kid: Option<&str>,
        alg: Algorithm,
    ) -> Result<VerificationKey, AuthError> {
        let keys = self.get_keys(tenant).await?;

        let jwk = match kid {
            Some(kid) => match find_jwk(&keys, kid) {
                Some(jwk) => jwk.clone(),
                None => {
                    let refreshed = self
                        .force_refresh(tenant)
                        .await
                        .ok_or(AuthError::InvalidSignature)?;
                    find_jwk(&refreshed, kid)
                        .cloned()
                        .ok_or(AuthError::InvalidSignature)?
                }
            },
            None => {
                let mut signing = keys.keys.iter().filter(|k| is_signing_key(k));
                match (signing.next(), signing.next()) {
                    (Some(only), None) => only.clone(),
                    _ => return Err(AuthError::InvalidSignature),
                }
            }
        };

        jwk_to_verification_key(&jwk, alg)
    }

    /// Whether a tenant has a cached key set.
    pub async fn is_cached(&self, issuer: &str) -> bool {
        self.entries.read().await.contains_key(issuer)
    }
}

fn find_jwk<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
}

fn is_signing_key(jwk: &Jwk) -> bool {
    !matches!(
        jwk.common.public_key_use,
        Some(jsonwebtoken::jwk::PublicKeyUse::Encryption)
    )
}

/// Asymmetric algorithm implied by a key, from its `alg` or its type.
fn key_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    if let Some(alg) = jwk.common.key_algorithm {
        return match alg {
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Convert a JWK to a decoding key, requiring the token's `alg` to match.
///
/// Symmetric (`oct`) keys and HMAC algorithms are never accepted.
fn jwk_to_verification_key(jwk: &Jwk, alg: Algorithm) -> Result<VerificationKey, AuthError> {
    if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
        || matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_))
    {
        return Err(AuthError::UnsupportedAlgorithm);
    }

    let expected = key_algorithm(jwk).ok_or(AuthError::UnsupportedAlgorithm)?;
    let family_matches = match (&jwk.algorithm, alg) {
        (
            AlgorithmParameters::RSA(_),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => true,
        (AlgorithmParameters::EllipticCurve(_), Algorithm::ES256 | Algorithm::ES384) => true,
        (AlgorithmParameters::OctetKeyPair(_), Algorithm::EdDSA) => true,
        _ => false,
    };
    if expected != alg || !family_matches {
        return Err(AuthError::UnsupportedAlgorithm);
    }

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::Internal(format!("Failed to build decoding key: {e}")))?;

    Ok(VerificationKey {
        key,
        algorithm: alg,
    })
}

/// Background task keeping every tenant's key set warm.
pub struct JwksRefresher {
    cache: Arc<JwksCache>,
    tenants: Arc<TenantRegistry>,
    interval: Duration,
}

impl JwksRefresher {
    pub fn new(cache: Arc<JwksCache>, tenants: Arc<TenantRegistry>) -> Self {
        let interval = cache.settings().refresh_interval;
        Self {
            cache,
            tenants,
            interval,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            tenants = self.tenants.len(),
            "JWKS refresher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("JWKS refresher shutting down");
                return;
            }

            self.refresh_all().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("JWKS refresher shutting down");
                    return;
                }
            }
        }
    }

    /// Refresh every registered tenant once. Failures are logged by the cache.
    pub async fn refresh_all(&self) {
        for tenant in self.tenants.tenants() {
            let _ = self.cache.refresh(tenant).await;
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application state and startup wiring.

use std::sync::Arc;

use crate::auth::{
    AuthError, CodeExchanger, CookieSigner, HttpCodeExchanger, HttpKeySetFetcher,
    IdentityReconciler, JwksCache, JwksRefresher, KeySetFetcher, TenantRegistry, TokenValidator,
};
use crate::config::{AppConfig, ConfigError};
use crate::session::{
    PersistQueue, PersistWorker, SessionService, SessionServiceParts, SessionStore, SessionSweeper,
};
use crate::storage::{
    FileStore, IdentityRepository, JsonStorage, SessionPersistence, StorageError, StoragePaths,
};

/// Fatal startup errors.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("auth: {0}")]
    Auth(#[from] AuthError),
    #[error("invalid bind address {0}")]
    Bind(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileStore>,
    pub tenants: Arc<TenantRegistry>,
    pub keys: Arc<JwksCache>,
    pub sessions: Arc<SessionService>,
}

/// Long-running tasks the binary spawns next to the server.
pub struct BackgroundTasks {
    pub sweeper: SessionSweeper,
    pub refresher: JwksRefresher,
    pub persist: PersistWorker,
}

impl AppState {
    /// Build the state from configuration, with HTTP clients for the
    /// identity provider.
    pub fn from_config(config: &AppConfig) -> Result<(Self, BackgroundTasks), StartupError> {
        let store = FileStore::open(JsonStorage::new(StoragePaths::new(&config.data_dir)))?;
        let fetcher = Arc::new(HttpKeySetFetcher::new(config.jwks_fetch_timeout)?);
        let exchanger = Arc::new(HttpCodeExchanger::new(config.code_exchange_timeout)?);
        Self::with_components(config, Arc::new(store), fetcher, exchanger)
    }

    /// Build the state around explicit storage and provider clients.
    pub fn with_components(
        config: &AppConfig,
        store: Arc<FileStore>,
        fetcher: Arc<dyn KeySetFetcher>,
        exchanger: Arc<dyn CodeExchanger>,
    ) -> Result<(Self, BackgroundTasks), StartupError> {
        let signer = CookieSigner::new(config.store_secret.as_bytes())
            .ok_or(ConfigError::SecretTooShort)?;

        let tenants = Arc::new(TenantRegistry::new(
            config.default_tenant.clone(),
            config.extra_tenants.iter().cloned(),
        ));
        let keys = Arc::new(JwksCache::new(fetcher, config.jwks));
        let validator = Arc::new(TokenValidator::new(
            Arc::clone(&tenants),
            Arc::clone(&keys),
            config.jwt_leeway_secs,
        ));
        let reconciler = Arc::new(IdentityReconciler::new(
            Arc::clone(&store) as Arc<dyn IdentityRepository>,
            config.wallet_default_balance,
        ));

        let durable = Arc::clone(&store) as Arc<dyn SessionPersistence>;
        let (queue, persist) = PersistQueue::new(Arc::clone(&durable));
        let cache = Arc::new(SessionStore::new(config.session_idle_timeout));

        let sessions = Arc::new(SessionService::new(SessionServiceParts {
            validator,
            reconciler,
            exchanger,
            cache: Arc::clone(&cache),
            durable,
            queue,
            signer,
            cookies: config.cookies.clone(),
        }));

        let tasks = BackgroundTasks {
            sweeper: SessionSweeper::new(cache, config.session_cleanup_interval),
            refresher: JwksRefresher::new(Arc::clone(&keys), Arc::clone(&tenants)),
            persist,
        };

        Ok((
            Self {
                store,
                tenants,
                keys,
                sessions,
            },
            tasks,
        ))
    }
}

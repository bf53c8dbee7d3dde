// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup (a `.env`
//! file is loaded first when present).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` / `PORT` | Server bind address | `0.0.0.0` / `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset |
//! | `DATA_DIR` | Root directory of the durable store | `./data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `STORE_SECRET` | Session cookie HMAC secret, at least 16 bytes | Required |
//! | `STORE_COOKIE_NAME` | Session cookie name | `parier-session` |
//! | `STORE_COOKIE_PATH` / `STORE_COOKIE_DOMAIN` | Cookie scope | `/` / unset |
//! | `STORE_COOKIE_SECURE` / `STORE_COOKIE_HTTP_ONLY` | Cookie flags | `false` / `true` |
//! | `STORE_SESSION_DURATION_SECS` | Session lifetime and cookie max-age | `86400` |
//! | `SESSION_IDLE_TIMEOUT_SECS` | Idle eviction from the session cache | `1800` |
//! | `SESSION_CLEANUP_INTERVAL_SECS` | Session cache sweep interval | `1800` |
//! | `KEYCLOAK_SERVER_URL` | Identity provider base URL | `http://localhost:8080` |
//! | `KEYCLOAK_DEFAULT_REALM` | Realm of the default tenant | `parier` |
//! | `KEYCLOAK_CLIENT_ID` / `KEYCLOAK_CLIENT_SECRET` | Default tenant client | `parier-api` / empty |
//! | `KEYCLOAK_JWT_ISSUER` | Issuer template (`{realm}` substituted) | `<server>/realms/{realm}` |
//! | `KEYCLOAK_CERT_ENDPOINT` | JWKS URL template | `<server>/realms/{realm}/protocol/openid-connect/certs` |
//! | `KEYCLOAK_TENANTS` | JSON array of additional tenants | `[]` |
//! | `JWKS_REFRESH_INTERVAL_SECS` | Periodic key set refresh | `3600` |
//! | `JWKS_REFRESH_RATE_LIMIT_SECS` | Minimum spacing of forced refreshes | `300` |
//! | `JWKS_FETCH_TIMEOUT_SECS` | Key set fetch timeout | `10` |
//! | `CODE_EXCHANGE_TIMEOUT_SECS` | Token endpoint timeout | `30` |
//! | `JWT_LEEWAY_SECS` | Clock skew tolerance for `exp`/`nbf` | `0` |
//! | `WALLET_DEFAULT_BALANCE` | Balance of newly created wallets | `0` |
//!
//! Unparseable numbers and booleans fall back to their default with a
//! warning. A missing or short secret, a malformed tenant list or an
//! invalid provider URL abort startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::auth::cookie::{MAX_AGE_LIMIT_SECS, MIN_SECRET_LEN};
use crate::auth::exchange::DEFAULT_EXCHANGE_TIMEOUT;
use crate::auth::jwks::{DEFAULT_FETCH_TIMEOUT, DEFAULT_REFRESH_INTERVAL, DEFAULT_REFRESH_RATE_LIMIT};
use crate::auth::tenants::REALM_PLACEHOLDER;
use crate::auth::{CookieSettings, JwksSettings, TenantConfig, TenantEntry};
use crate::logging::LogFormat;
use crate::session::store::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_IDLE_TIMEOUT};
use crate::storage::paths::DATA_ROOT;

/// Environment variable name for the durable store root.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Startup configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STORE_SECRET is not set")]
    MissingSecret,

    #[error("STORE_SECRET must be at least 16 bytes")]
    SecretTooShort,

    #[error("KEYCLOAK_TENANTS is not a valid tenant list: {0}")]
    InvalidTenants(String),

    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,
}

/// Paths of the PEM certificate chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    /// Cookie HMAC secret; never logged
    pub store_secret: String,
    pub cookies: CookieSettings,
    pub session_idle_timeout: Duration,
    pub session_cleanup_interval: Duration,
    pub default_tenant: TenantConfig,
    pub extra_tenants: Vec<TenantConfig>,
    pub jwks: JwksSettings,
    pub jwks_fetch_timeout: Duration,
    pub code_exchange_timeout: Duration,
    pub jwt_leeway_secs: u64,
    pub wallet_default_balance: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("data_dir", &self.data_dir)
            .field("default_realm", &self.default_tenant.realm)
            .field("extra_tenants", &self.extra_tenants.len())
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let secs = |name: &'static str, default: Duration| {
            Duration::from_secs(parse_or(name, var(name), default.as_secs()))
        };

        let store_secret = var("STORE_SECRET").ok_or(ConfigError::MissingSecret)?;
        if store_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort);
        }

        let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let cookies = CookieSettings {
            name: var("STORE_COOKIE_NAME").unwrap_or_else(|| CookieSettings::default().name),
            path: var("STORE_COOKIE_PATH").unwrap_or_else(|| "/".to_string()),
            domain: var("STORE_COOKIE_DOMAIN"),
            secure: parse_bool("STORE_COOKIE_SECURE", var("STORE_COOKIE_SECURE"), false),
            http_only: parse_bool("STORE_COOKIE_HTTP_ONLY", var("STORE_COOKIE_HTTP_ONLY"), true),
            max_age_secs: session_duration(var("STORE_SESSION_DURATION_SECS")),
        };

        let server_url = var("KEYCLOAK_SERVER_URL").unwrap_or_else(|| "http://localhost:8080".into());
        let server_url = validate_url("KEYCLOAK_SERVER_URL", &server_url)?;
        let server = server_url.as_str().trim_end_matches('/');

        let issuer_template = var("KEYCLOAK_JWT_ISSUER")
            .unwrap_or_else(|| format!("{server}/realms/{REALM_PLACEHOLDER}"));
        let cert_template = var("KEYCLOAK_CERT_ENDPOINT").unwrap_or_else(|| {
            format!("{server}/realms/{REALM_PLACEHOLDER}/protocol/openid-connect/certs")
        });
        validate_url("KEYCLOAK_JWT_ISSUER", &issuer_template)?;
        validate_url("KEYCLOAK_CERT_ENDPOINT", &cert_template)?;

        let default_tenant = TenantConfig::from_templates(
            var("KEYCLOAK_DEFAULT_REALM").unwrap_or_else(|| "parier".into()),
            var("KEYCLOAK_CLIENT_ID").unwrap_or_else(|| "parier-api".into()),
            var("KEYCLOAK_CLIENT_SECRET").unwrap_or_default(),
            issuer_template,
            cert_template,
        );

        let extra_tenants = match var("KEYCLOAK_TENANTS") {
            Some(raw) => serde_json::from_str::<Vec<TenantEntry>>(&raw)
                .map_err(|e| ConfigError::InvalidTenants(e.to_string()))?
                .into_iter()
                .map(|entry| entry.into_config(&default_tenant))
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("PORT", var("PORT"), 8080u16),
            tls,
            data_dir: var(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.into()).into(),
            log_format: LogFormat::from_env_value(var("LOG_FORMAT").as_deref()),
            store_secret,
            cookies,
            session_idle_timeout: secs("SESSION_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT),
            session_cleanup_interval: secs("SESSION_CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL),
            default_tenant,
            extra_tenants,
            jwks: JwksSettings {
                refresh_interval: secs("JWKS_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL),
                refresh_rate_limit: secs("JWKS_REFRESH_RATE_LIMIT_SECS", DEFAULT_REFRESH_RATE_LIMIT),
            },
            jwks_fetch_timeout: secs("JWKS_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT),
            code_exchange_timeout: secs("CODE_EXCHANGE_TIMEOUT_SECS", DEFAULT_EXCHANGE_TIMEOUT),
            jwt_leeway_secs: parse_or("JWT_LEEWAY_SECS", var("JWT_LEEWAY_SECS"), 0u64),
            wallet_default_balance: parse_or(
                "WALLET_DEFAULT_BALANCE",
                var("WALLET_DEFAULT_BALANCE"),
                0i64,
            ),
        })
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

/// Session lifetime in seconds, kept within `1..=MAX_AGE_LIMIT_SECS`.
fn session_duration(value: Option<String>) -> i64 {
    let secs = parse_or("STORE_SESSION_DURATION_SECS", value, 86_400i64);
    if secs > MAX_AGE_LIMIT_SECS {
        warn!(
            variable = "STORE_SESSION_DURATION_SECS",
            value = secs,
            max = MAX_AGE_LIMIT_SECS,
            "Session duration too long, clamping"
        );
    }
    secs.clamp(1, MAX_AGE_LIMIT_SECS)
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            warn!(variable = name, value = %v, "Invalid boolean, using default");
            default
        }
        None => default,
    }
}

/// Parse `value` as a URL after substituting a sample realm.
fn validate_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(&value.replace(REALM_PLACEHOLDER, "realm")).map_err(|_| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
    })
}

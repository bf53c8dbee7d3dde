// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization-code exchange against a tenant's token endpoint.
//!
//! Used only by the interactive login flow. A failure or timeout fails that
//! login request; steady-state requests never reach this code.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::tenants::TenantConfig;
use super::AuthError;

/// Default token endpoint timeout (30 seconds).
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens returned by the provider for an authorization code.
#[derive(Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Exchanges authorization codes for tokens.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(
        &self,
        tenant: &TenantConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, AuthError>;
}

/// Form-encoded POST to `{issuer}/protocol/openid-connect/token`.
#[derive(Clone)]
pub struct HttpCodeExchanger {
    client: reqwest::Client,
}

impl HttpCodeExchanger {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CodeExchanger for HttpCodeExchanger {
    async fn exchange(
        &self,
        tenant: &TenantConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, AuthError> {
        let endpoint = tenant.token_endpoint();
        debug!(realm = %tenant.realm, "Exchanging authorization code");

        let form = [
            ("code", code),
            ("client_id", tenant.client_id.as_str()),
            ("client_secret", tenant.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .client
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "token endpoint timed out".to_string()
                } else {
                    e.to_string()
                };
                warn!(realm = %tenant.realm, error = %reason, "Code exchange failed");
                AuthError::CodeExchangeFailed(reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(realm = %tenant.realm, status = %status, "Token endpoint rejected code");
            return Err(AuthError::CodeExchangeFailed(format!(
                "HTTP {status} from token endpoint"
            )));
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| AuthError::CodeExchangeFailed(e.to_string()))
    }
}

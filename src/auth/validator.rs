// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token validation.
//!
//! ## Steps
//!
//! 1. Decode the header (`kid`, `alg`)
//! 2. Read the issuer from the payload *without* verifying it, only to pick
//!    the tenant whose keys must verify the token
//! 3. Resolve the verification key through the tenant's JWKS cache
//! 4. Verify signature, issuer, `exp` and `nbf`
//!
//! Nothing from step 2 is trusted until step 4 succeeds.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;

use super::claims::VerifiedClaims;
use super::jwks::JwksCache;
use super::tenants::{TenantConfig, TenantRegistry};
use super::AuthError;

/// A verified token and the tenant that issued it.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub claims: VerifiedClaims,
    pub tenant: Arc<TenantConfig>,
}

#[derive(Debug, Deserialize)]
struct UnverifiedIssuer {
    #[serde(default)]
    iss: Option<String>,
}

/// Validates provider-issued tokens against per-tenant key sets.
pub struct TokenValidator {
    tenants: Arc<TenantRegistry>,
    keys: Arc<JwksCache>,
    /// Clock skew tolerance for `exp`/`nbf`, in seconds
    leeway: u64,
}

impl TokenValidator {
    pub fn new(tenants: Arc<TenantRegistry>, keys: Arc<JwksCache>, leeway: u64) -> Self {
        Self {
            tenants,
            keys,
            leeway,
        }
    }

    pub fn tenants(&self) -> &Arc<TenantRegistry> {
        &self.tenants
    }

    pub fn keys(&self) -> &Arc<JwksCache> {
        &self.keys
    }

    /// Extract the issuer without verifying the signature.
    ///
    /// Only for routing to a tenant; never trust anything else from it.
    pub fn unverified_issuer(token: &str) -> Result<String, AuthError> {
        let data = jsonwebtoken::dangerous::insecure_decode::<UnverifiedIssuer>(token)
            .map_err(|_| AuthError::Malformed)?;
        data.claims
            .iss
            .filter(|iss| !iss.is_empty())
            .ok_or(AuthError::Malformed)
    }

    /// Validate a token, resolving its tenant from the unverified issuer.
    pub async fn validate(&self, token: &str) -> Result<ValidatedToken, AuthError> {
        let issuer = Self::unverified_issuer(token)?;
        let tenant = self.tenants.resolve(&issuer)?;
        let claims = self.validate_for(token, &tenant).await?;
        Ok(ValidatedToken { claims, tenant })
    }

    /// Validate a token against a known tenant.
    pub async fn validate_for(
        &self,
        token: &str,
        tenant: &TenantConfig,
    ) -> Result<VerifiedClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;

        let key = self
            .keys
            .find_key(tenant, header.kid.as_deref(), header.alg)
            .await?;

        let mut validation = Validation::new(key.algorithm);
        validation.leeway = self.leeway;
        validation.set_issuer(&[&tenant.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_nbf = true;
        validation.validate_aud = false;

        let data = decode::<VerifiedClaims>(token, &key.key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::ImmatureSignature => AuthError::NotYetValid,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
                _ => AuthError::Malformed,
            }
        })?;

        Ok(data.claims)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Multi-tenant bearer-token authentication against an OpenID Connect
//! identity provider (Keycloak-style realms).
//!
//! ## Auth Flow
//!
//! 1. Client sends `Authorization: Bearer <JWT>` minted by one of the
//!    provider's realms
//! 2. The server:
//!    - Reads the unverified `iss` to pick the tenant ([`TenantRegistry`])
//!    - Fetches and caches that tenant's JWKS ([`JwksCache`])
//!    - Verifies signature, issuer, `exp` and `nbf` ([`TokenValidator`])
//!    - Reconciles the identity into the local store
//!      ([`IdentityReconciler`]): user, profile, wallet, role grants
//! 3. The resulting identity is bound to a server-side session referenced by
//!    an HMAC-signed cookie ([`CookieSigner`])
//!
//! ## Security
//!
//! - Only asymmetric algorithms are accepted; `HS*` tokens are rejected
//! - Unknown `kid` values force a JWKS refresh, rate-limited per tenant
//! - Error bodies never carry internal details

pub mod claims;
pub mod cookie;
pub mod error;
pub mod exchange;
pub mod jwks;
pub mod reconciler;
pub mod roles;
pub mod tenants;
pub mod validator;

pub use claims::VerifiedClaims;
pub use cookie::{CookieSettings, CookieSigner};
pub use error::AuthError;
pub use exchange::{CodeExchanger, HttpCodeExchanger, TokenPair};
pub use jwks::{HttpKeySetFetcher, JwksCache, JwksRefresher, JwksSettings, KeySetFetcher};
pub use reconciler::IdentityReconciler;
pub use roles::Role;
pub use tenants::{TenantConfig, TenantEntry, TenantRegistry};
pub use validator::{TokenValidator, ValidatedToken};

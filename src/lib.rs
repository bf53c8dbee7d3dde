// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant Session Server - multi-tenant token authentication and sessions
//!
//! Verifies identity-provider access tokens for several tenants (realms),
//! reconciles the verified identity into a local store and keeps a
//! signed-cookie session in front of it.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (Axum) and OpenAPI document
//! - `auth` - Tenants, JWKS cache, token validation, code exchange, reconciliation
//! - `session` - Session cache, persistence queue, middleware and extractor
//! - `storage` - JSON file store for users, properties, wallets, roles and sessions
//! - `config` / `logging` - Environment configuration and tracing setup

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;

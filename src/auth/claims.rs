// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified token claims.
//!
//! Keycloak-shaped: realm roles under `realm_access.roles`, per-client roles
//! under `resource_access.<client_id>.roles`. Claims are produced fresh for
//! every validated token and only selectively projected into local records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::roles::Role;

/// Role list wrapper used by both realm- and client-scoped access claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `aud` may be a single string or an array. It is carried but not validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

/// Claims of a token whose signature, expiry and issuer have been verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedClaims {
    /// Subject
    #[serde(default)]
    pub sub: Option<String>,
    /// Provider session id
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RoleAccess>,
    #[serde(default)]
    pub resource_access: HashMap<String, RoleAccess>,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub aud: Option<Audience>,
}

impl VerifiedClaims {
    /// Identifier binding this identity to a local user.
    ///
    /// Uses `sub`; when the provider omits it, falls back to `sid`. The
    /// boolean is `true` when the fallback was taken.
    pub fn external_id(&self) -> Option<(&str, bool)> {
        match (non_empty(&self.sub), non_empty(&self.sid)) {
            (Some(sub), _) => Some((sub, false)),
            (None, Some(sid)) => Some((sid, true)),
            (None, None) => None,
        }
    }

    /// Known roles from the realm list and from the list of `client_id`.
    ///
    /// Unknown strings are dropped. The result is sorted and de-duplicated.
    pub fn roles_for_client(&self, client_id: &str) -> Vec<Role> {
        let realm = self.realm_access.iter().flat_map(|a| a.roles.iter());
        let client = self
            .resource_access
            .get(client_id)
            .into_iter()
            .flat_map(|a| a.roles.iter());

        let mut roles: Vec<Role> = realm.chain(client).filter_map(|r| Role::parse(r)).collect();
        roles.sort();
        roles.dedup();
        roles
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

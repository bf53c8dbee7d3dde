// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of roles the service knows how to grant.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access
/// - `Manager` - Operates on other users' data within a tenant
/// - `Viewer` - Normal authenticated user
/// - `Anonymous` - Unauthenticated traffic holding a bootstrap session
///
/// Provider role strings that do not map onto one of these variants are
/// dropped, so a misconfigured realm cannot mint a new privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Tenant-level management
    Manager,
    /// Authenticated end user
    Viewer,
    /// Bootstrap session without a verified identity
    Anonymous,
}

impl Role {
    /// Every role.
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Viewer, Role::Anonymous];

    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Manager, Role::Manager | Role::Viewer) => true,
            (Role::Viewer, Role::Viewer) => true,
            (Role::Anonymous, Role::Anonymous) => true,
            _ => false,
        }
    }

    /// Parse a provider role string (case-insensitive).
    ///
    /// `ANONYMOUS` is never accepted from a token: it is reserved for
    /// sessions the server bootstraps itself.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "MANAGER" => Some(Role::Manager),
            "VIEWER" => Some(Role::Viewer),
            _ => None,
        }
    }

    /// Canonical upper-case name, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Viewer => "VIEWER",
            Role::Anonymous => "ANONYMOUS",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

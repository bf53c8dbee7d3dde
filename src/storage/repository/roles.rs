// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role grant repository.
//!
//! A grant is a `(user, role)` pair with a validity window and a soft-delete
//! marker. There is one file per pair, so at most one grant per pair can be
//! active at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::{JsonStorage, StorageResult};
use crate::auth::Role;

/// Role grant record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRoleGrant {
    pub user_id: Uuid,
    pub role: Role,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoredRoleGrant {
    /// Whether the grant is in effect at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none()
            && self.start_date <= now
            && self.end_date.is_none_or(|end| end > now)
    }
}

/// Repository for role grants.
pub struct RoleRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> RoleRepository<'a> {
    /// Create a new RoleRepository.
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    /// Get the grant record for a pair, active or not.
    pub fn get(&self, user_id: Uuid, role: Role) -> StorageResult<Option<StoredRoleGrant>> {
        self.storage
            .read_json_opt(self.storage.paths().role_grant(user_id, role.as_str()))
    }

    /// Grant a role unless an active grant already exists.
    ///
    /// Returns `true` when a new grant was written. Callers must hold the
    /// store's write lock.
    pub fn grant_if_absent(&self, user_id: Uuid, role: Role) -> StorageResult<bool> {
        let now = Utc::now();
        if let Some(existing) = self.get(user_id, role)? {
            if existing.is_active(now) {
                return Ok(false);
            }
        }

        self.storage.write_json(
            self.storage.paths().role_grant(user_id, role.as_str()),
            &StoredRoleGrant {
                user_id,
                role,
                start_date: now,
                end_date: None,
                deleted_at: None,
            },
        )?;
        Ok(true)
    }

    /// Soft-delete a grant.
    pub fn revoke(&self, user_id: Uuid, role: Role) -> StorageResult<()> {
        if let Some(mut grant) = self.get(user_id, role)? {
            if grant.deleted_at.is_none() {
                grant.deleted_at = Some(Utc::now());
                self.storage.write_json(
                    self.storage.paths().role_grant(user_id, role.as_str()),
                    &grant,
                )?;
            }
        }
        Ok(())
    }

    /// Roles with an active grant, sorted.
    pub fn list_active(&self, user_id: Uuid) -> StorageResult<Vec<Role>> {
        let now = Utc::now();
        let names = self
            .storage
            .list_files(self.storage.paths().user_roles_dir(user_id), "json")?;

        let mut roles = Vec::new();
        for name in names {
            let Some(role) = Role::ALL.into_iter().find(|r| r.as_str() == name) else {
                continue;
            };
            if let Some(grant) = self.get(user_id, role)? {
                if grant.is_active(now) {
                    roles.push(role);
                }
            }
        }
        roles.sort();
        Ok(roles)
    }
}

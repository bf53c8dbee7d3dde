// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! A user record lives under `users/{id}.json`. The binding from the
//! provider's external identifier to the local id is a separate file under
//! `users/by-external/`, written once when the user is created and never
//! rewritten afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::{JsonStorage, StorageError, StorageResult};

/// Locally-owned user record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUser {
    /// Local identifier
    pub id: Uuid,
    /// Identifier assigned by the identity provider
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

/// Unique external id binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExternalBinding {
    external_id: String,
    user_id: Uuid,
}

/// Repository for user records.
pub struct UserRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository.
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    /// Get a user by local id.
    pub fn get(&self, user_id: Uuid) -> StorageResult<StoredUser> {
        let path = self.storage.paths().user(user_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("User {user_id}")));
        }
        self.storage.read_json(path)
    }

    /// Find a user by the provider's external identifier.
    pub fn find_by_external_id(&self, external_id: &str) -> StorageResult<Option<StoredUser>> {
        let binding: Option<ExternalBinding> = self
            .storage
            .read_json_opt(self.storage.paths().external_binding(external_id))?;

        match binding {
            Some(binding) => self.get(binding.user_id).map(Some),
            None => Ok(None),
        }
    }

    /// Ids of all stored users.
    pub fn list_ids(&self) -> StorageResult<Vec<String>> {
        self.storage
            .list_files(self.storage.paths().users_dir(), "json")
    }

    /// Create a user bound to `external_id`.
    ///
    /// Fails with `AlreadyExists` when the external id is already bound.
    /// Callers must hold the store's write lock so the check and the insert
    /// are not interleaved with another writer.
    pub fn create(&self, external_id: &str) -> StorageResult<StoredUser> {
        let binding_path = self.storage.paths().external_binding(external_id);
        if self.storage.exists(&binding_path) {
            return Err(StorageError::AlreadyExists(format!(
                "User with external id {external_id}"
            )));
        }

        let user = StoredUser {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            created_at: Utc::now(),
        };

        // The user file goes first so a binding never points at nothing
        self.storage.write_json(self.storage.paths().user(user.id), &user)?;
        self.storage.write_json(
            binding_path,
            &ExternalBinding {
                external_id: user.external_id.clone(),
                user_id: user.id,
            },
        )?;

        Ok(user)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable store of record behind the identity and session layers.
//!
//! The rest of the crate talks to persistence only through the
//! [`IdentityRepository`] and [`SessionPersistence`] traits, so the JSON
//! file implementation here can be swapped for a database without touching
//! the reconciler or the session controller.

use std::collections::BTreeMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::repository::{
    PropertyKind, PropertyRepository, PropertyValue, RoleRepository, SessionRepository,
    StoredUser, StoredWallet, UserRepository, WalletRepository,
};
use super::{JsonStorage, StorageError, StorageResult};
use crate::auth::Role;
use crate::session::Session;

/// User, property, wallet and role persistence.
pub trait IdentityRepository: Send + Sync {
    fn find_user_by_external_id(&self, external_id: &str) -> StorageResult<Option<StoredUser>>;

    /// Create a user bound to `external_id`; `AlreadyExists` if bound.
    fn create_user(&self, external_id: &str) -> StorageResult<StoredUser>;

    /// Returns `true` when the stored value changed.
    fn upsert_property(
        &self,
        user_id: Uuid,
        kind: PropertyKind,
        value: PropertyValue,
    ) -> StorageResult<bool>;

    fn properties(&self, user_id: Uuid) -> StorageResult<BTreeMap<PropertyKind, PropertyValue>>;

    /// Returns `true` when a wallet was created.
    fn create_wallet_if_absent(&self, user_id: Uuid, balance: i64) -> StorageResult<bool>;

    fn wallet(&self, user_id: Uuid) -> StorageResult<Option<StoredWallet>>;

    /// Returns `true` when a new active grant was written.
    fn grant_role_if_absent(&self, user_id: Uuid, role: Role) -> StorageResult<bool>;

    fn active_roles(&self, user_id: Uuid) -> StorageResult<Vec<Role>>;
}

/// Session record persistence.
pub trait SessionPersistence: Send + Sync {
    fn create_session(&self, session: &Session) -> StorageResult<()>;

    fn update_session(&self, session: &Session) -> StorageResult<()>;

    /// Find a session that has not been soft-deleted.
    fn find_session(&self, session_id: Uuid) -> StorageResult<Option<Session>>;

    fn soft_delete_session(&self, session_id: Uuid) -> StorageResult<()>;
}

/// JSON-file implementation of both persistence traits.
///
/// Every mutation runs under one process-wide mutex, which makes the
/// check-then-insert sequences (unique external id, single active grant,
/// single wallet) atomic with respect to other writers in the process.
/// Reads do not take the lock; records are replaced by rename, so a
/// reader sees either the old or the new document.
pub struct FileStore {
    storage: JsonStorage,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and initialize) a store rooted at `storage`'s paths.
    pub fn open(mut storage: JsonStorage) -> StorageResult<Self> {
        storage.initialize()?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Underlying storage.
    pub fn storage(&self) -> &JsonStorage {
        &self.storage
    }

    fn write<T>(&self, f: impl FnOnce(&JsonStorage) -> StorageResult<T>) -> StorageResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        f(&self.storage)
    }
}

impl IdentityRepository for FileStore {
    fn find_user_by_external_id(&self, external_id: &str) -> StorageResult<Option<StoredUser>> {
        UserRepository::new(&self.storage).find_by_external_id(external_id)
    }

    fn create_user(&self, external_id: &str) -> StorageResult<StoredUser> {
        self.write(|s| UserRepository::new(s).create(external_id))
    }

    fn upsert_property(
        &self,
        user_id: Uuid,
        kind: PropertyKind,
        value: PropertyValue,
    ) -> StorageResult<bool> {
        self.write(|s| PropertyRepository::new(s).upsert(user_id, kind, value))
    }

    fn properties(&self, user_id: Uuid) -> StorageResult<BTreeMap<PropertyKind, PropertyValue>> {
        PropertyRepository::new(&self.storage).list_active(user_id)
    }

    fn create_wallet_if_absent(&self, user_id: Uuid, balance: i64) -> StorageResult<bool> {
        self.write(|s| WalletRepository::new(s).create_if_absent(user_id, balance))
    }

    fn wallet(&self, user_id: Uuid) -> StorageResult<Option<StoredWallet>> {
        WalletRepository::new(&self.storage).get(user_id)
    }

    fn grant_role_if_absent(&self, user_id: Uuid, role: Role) -> StorageResult<bool> {
        self.write(|s| RoleRepository::new(s).grant_if_absent(user_id, role))
    }

    fn active_roles(&self, user_id: Uuid) -> StorageResult<Vec<Role>> {
        RoleRepository::new(&self.storage).list_active(user_id)
    }
}

impl SessionPersistence for FileStore {
    fn create_session(&self, session: &Session) -> StorageResult<()> {
        self.write(|s| SessionRepository::new(s).create(session))
    }

    fn update_session(&self, session: &Session) -> StorageResult<()> {
        self.write(|s| SessionRepository::new(s).update(session))
    }

    fn find_session(&self, session_id: Uuid) -> StorageResult<Option<Session>> {
        SessionRepository::new(&self.storage).get(session_id)
    }

    fn soft_delete_session(&self, session_id: Uuid) -> StorageResult<()> {
        self.write(|s| SessionRepository::new(s).delete(session_id))
    }
}

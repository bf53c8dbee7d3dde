// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session record repository.
//!
//! Durable copy of the in-memory session cache, read back on cache misses
//! (for example after a restart). Deletion is soft.

use chrono::Utc;
use uuid::Uuid;

use super::super::{JsonStorage, StorageError, StorageResult};
use crate::session::Session;

/// Repository for session records.
pub struct SessionRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> SessionRepository<'a> {
    /// Create a new SessionRepository.
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    /// Get a session that has not been soft-deleted.
    pub fn get(&self, session_id: Uuid) -> StorageResult<Option<Session>> {
        let session: Option<Session> = self
            .storage
            .read_json_opt(self.storage.paths().session(session_id))?;
        Ok(session.filter(|s| s.deleted_at.is_none()))
    }

    /// Create a new session record.
    pub fn create(&self, session: &Session) -> StorageResult<()> {
        let path = self.storage.paths().session(session.id);
        if self.storage.exists(&path) {
            return Err(StorageError::AlreadyExists(format!("Session {}", session.id)));
        }
        self.storage.write_json(path, session)
    }

    /// Write the latest state of a session, creating the record if needed.
    ///
    /// A soft-deleted record stays deleted: late updates are ignored.
    pub fn update(&self, session: &Session) -> StorageResult<()> {
        let path = self.storage.paths().session(session.id);
        let existing: Option<Session> = self.storage.read_json_opt(&path)?;
        if existing.is_some_and(|s| s.deleted_at.is_some()) {
            return Ok(());
        }
        self.storage.write_json(path, session)
    }

    /// Soft-delete a session.
    pub fn delete(&self, session_id: Uuid) -> StorageResult<()> {
        let path = self.storage.paths().session(session_id);
        let Some(mut session) = self.storage.read_json_opt::<Session>(&path)? else {
            return Err(StorageError::NotFound(format!("Session {session_id}")));
        };

        if session.deleted_at.is_none() {
            let now = Utc::now();
            session.deleted_at = Some(now);
            session.updated_at = now;
            self.storage.write_json(path, &session)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ClientInfo, Session};
    use crate::storage::StoragePaths;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_storage() -> (TempDir, JsonStorage) {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(StoragePaths::new(dir.path()));
        storage.initialize().expect("Failed to initialize");
        (dir, storage)
    }

    #[test]
    fn create_get_and_soft_delete() {
        let (_dir, storage) = test_storage();
        let repo = SessionRepository::new(&storage);
        let session = Session::anonymous(Duration::hours(1), &ClientInfo::default());

        repo.create(&session).unwrap();
        assert_eq!(repo.get(session.id).unwrap(), Some(session.clone()));

        repo.delete(session.id).unwrap();
        assert!(repo.get(session.id).unwrap().is_none());
        // The record itself is kept
        assert!(storage.exists(storage.paths().session(session.id)));
    }

    #[test]
    fn update_after_delete_keeps_the_record_deleted() {
        let (_dir, storage) = test_storage();
        let repo = SessionRepository::new(&storage);
        let mut session = Session::anonymous(Duration::hours(1), &ClientInfo::default());

        repo.create(&session).unwrap();
        repo.delete(session.id).unwrap();

        session.ip = Some("10.0.0.9".into());
        repo.update(&session).unwrap();
        assert!(repo.get(session.id).unwrap().is_none());
    }

    #[test]
    fn create_twice_fails() {
        let (_dir, storage) = test_storage();
        let repo = SessionRepository::new(&storage);
        let session = Session::anonymous(Duration::hours(1), &ClientInfo::default());

        repo.create(&session).unwrap();
        assert!(matches!(
            repo.create(&session),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (_dir, storage) = test_storage();
        let repo = SessionRepository::new(&storage);
        assert!(matches!(
            repo.delete(Uuid::new_v4()),
            Err(StorageError::NotFound(_))
        ));
    }
}

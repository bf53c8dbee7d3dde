// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable store of record for users, their profile properties, wallets,
//! role grants and sessions. The session cache in front of it is the hot
//! path; this store is read on cache misses and written on every change.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   users/
//!     {user_id}.json
//!     by-external/{hex(external_id)}.json   # unique provider binding
//!   properties/{user_id}/{KIND}.json         # USER_USERNAME, USER_EMAIL, ...
//!   wallets/{user_id}.json
//!   roles/{user_id}/{ROLE}.json              # grant with validity window
//!   sessions/{session_id}.json               # soft-deleted on logout
//! ```
//!
//! ## Important Notes
//!
//! - All writes are atomic (temp file + rename)
//! - Check-then-insert sequences run under a single process-wide lock
//! - Deletion of sessions, properties and grants is soft

pub mod file_store;
pub mod json_fs;
pub mod paths;
pub mod repository;

pub use file_store::{FileStore, IdentityRepository, SessionPersistence};
pub use json_fs::{JsonStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use repository::{
    PropertyKind, PropertyValue, StoredProperty, StoredRoleGrant, StoredUser, StoredWallet,
};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to JSON storage.
//!
//! Each repository provides operations for a single entity type, using
//! `JsonStorage` for all file operations.

pub mod properties;
pub mod roles;
pub mod sessions;
pub mod users;
pub mod wallets;

pub use properties::{PropertyKind, PropertyRepository, PropertyValue, StoredProperty};
pub use roles::{RoleRepository, StoredRoleGrant};
pub use sessions::SessionRepository;
pub use users::{StoredUser, UserRepository};
pub use wallets::{StoredWallet, WalletRepository};

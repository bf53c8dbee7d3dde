// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the durable store layout.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Default base directory for persistent storage.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== User Paths ==========

    /// Directory containing all users.
    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    /// Path to a user record.
    pub fn user(&self, user_id: Uuid) -> PathBuf {
        self.users_dir().join(format!("{user_id}.json"))
    }

    /// Directory holding the external id to user id bindings.
    pub fn external_bindings_dir(&self) -> PathBuf {
        self.users_dir().join("by-external")
    }

    /// Path to the binding for an external identifier.
    ///
    /// External ids are hex-encoded so that provider-controlled strings can
    /// never escape the bindings directory.
    pub fn external_binding(&self, external_id: &str) -> PathBuf {
        self.external_bindings_dir()
            .join(format!("{}.json", hex::encode(external_id.as_bytes())))
    }

    // ========== Property Paths ==========

    /// Directory containing all profile properties.
    pub fn properties_dir(&self) -> PathBuf {
        self.root.join("properties")
    }

    /// Directory for one user's properties.
    pub fn user_properties_dir(&self, user_id: Uuid) -> PathBuf {
        self.properties_dir().join(user_id.to_string())
    }

    /// Path to a single property value.
    pub fn property(&self, user_id: Uuid, kind: &str) -> PathBuf {
        self.user_properties_dir(user_id).join(format!("{kind}.json"))
    }

    // ========== Wallet Paths ==========

    /// Directory containing all wallets.
    pub fn wallets_dir(&self) -> PathBuf {
        self.root.join("wallets")
    }

    /// Path to a user's wallet.
    pub fn wallet(&self, user_id: Uuid) -> PathBuf {
        self.wallets_dir().join(format!("{user_id}.json"))
    }

    // ========== Role Paths ==========

    /// Directory containing all role grants.
    pub fn roles_dir(&self) -> PathBuf {
        self.root.join("roles")
    }

    /// Directory for one user's role grants.
    pub fn user_roles_dir(&self, user_id: Uuid) -> PathBuf {
        self.roles_dir().join(user_id.to_string())
    }

    /// Path to the grant of a role to a user.
    pub fn role_grant(&self, user_id: Uuid, role: &str) -> PathBuf {
        self.user_roles_dir(user_id).join(format!("{role}.json"))
    }

    // ========== Session Paths ==========

    /// Directory containing all session records.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Path to a session record.
    pub fn session(&self, session_id: Uuid) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }
}

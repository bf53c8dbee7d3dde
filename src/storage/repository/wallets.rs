// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet repository.
//!
//! Each user owns at most one wallet, stored at `wallets/{user_id}.json`.
//! The ledger that moves balances lives outside this service; here a wallet
//! is only ever created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::super::{JsonStorage, StorageResult};

/// Wallet record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredWallet {
    /// Owning user
    pub user_id: Uuid,
    /// Balance in minor units
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Repository for wallets.
pub struct WalletRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> WalletRepository<'a> {
    /// Create a new WalletRepository.
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    /// Get a user's wallet.
    pub fn get(&self, user_id: Uuid) -> StorageResult<Option<StoredWallet>> {
        self.storage.read_json_opt(self.storage.paths().wallet(user_id))
    }

    /// Create a wallet for the user unless one already exists.
    ///
    /// Returns `true` when a wallet was created.
    pub fn create_if_absent(&self, user_id: Uuid, balance: i64) -> StorageResult<bool> {
        let path = self.storage.paths().wallet(user_id);
        if self.storage.exists(&path) {
            return Ok(false);
        }

        self.storage.write_json(
            path,
            &StoredWallet {
                user_id,
                balance,
                created_at: Utc::now(),
            },
        )?;
        Ok(true)
    }
}

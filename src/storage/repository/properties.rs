// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profile property repository.
//!
//! Properties are dynamically-typed values keyed by a closed set of kinds.
//! One file per `(user, kind)`; upserts rewrite it in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::super::{JsonStorage, StorageResult};

/// Kind of a profile property.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKind {
    UserUsername,
    UserEmail,
    UserPhone,
    UserEmailVerified,
}

impl PropertyKind {
    /// Every kind, in storage order.
    pub const ALL: [PropertyKind; 4] = [
        PropertyKind::UserUsername,
        PropertyKind::UserEmail,
        PropertyKind::UserPhone,
        PropertyKind::UserEmailVerified,
    ];

    /// Stable on-disk name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::UserUsername => "USER_USERNAME",
            PropertyKind::UserEmail => "USER_EMAIL",
            PropertyKind::UserPhone => "USER_PHONE",
            PropertyKind::UserEmailVerified => "USER_EMAIL_VERIFIED",
        }
    }
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum PropertyValue {
    Flag(bool),
    Text(String),
}

impl PropertyValue {
    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Flag(_) => None,
        }
    }
}

/// Property record on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredProperty {
    pub user_id: Uuid,
    pub kind: PropertyKind,
    pub value: PropertyValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Repository for profile properties.
pub struct PropertyRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> PropertyRepository<'a> {
    /// Create a new PropertyRepository.
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    /// Get the active value of one property.
    pub fn get(&self, user_id: Uuid, kind: PropertyKind) -> StorageResult<Option<StoredProperty>> {
        let property: Option<StoredProperty> = self
            .storage
            .read_json_opt(self.storage.paths().property(user_id, kind.as_str()))?;
        Ok(property.filter(|p| p.deleted_at.is_none()))
    }

    /// Create the property or update its value in place.
    ///
    /// Returns `true` when the stored value changed.
    pub fn upsert(
        &self,
        user_id: Uuid,
        kind: PropertyKind,
        value: PropertyValue,
    ) -> StorageResult<bool> {
        let path = self.storage.paths().property(user_id, kind.as_str());
        let now = Utc::now();

        let existing: Option<StoredProperty> = self.storage.read_json_opt(&path)?;
        let record = match existing {
            Some(p) if p.deleted_at.is_none() && p.value == value => return Ok(false),
            Some(p) => StoredProperty {
                value,
                updated_at: now,
                deleted_at: None,
                ..p
            },
            None => StoredProperty {
                user_id,
                kind,
                value,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        };

        self.storage.write_json(path, &record)?;
        Ok(true)
    }

    /// Soft-delete a property.
    pub fn delete(&self, user_id: Uuid, kind: PropertyKind) -> StorageResult<()> {
        let path = self.storage.paths().property(user_id, kind.as_str());
        if let Some(mut property) = self.storage.read_json_opt::<StoredProperty>(&path)? {
            if property.deleted_at.is_none() {
                property.deleted_at = Some(Utc::now());
                self.storage.write_json(path, &property)?;
            }
        }
        Ok(())
    }

    /// All active properties of a user.
    pub fn list_active(&self, user_id: Uuid) -> StorageResult<BTreeMap<PropertyKind, PropertyValue>> {
        let mut properties = BTreeMap::new();
        for kind in PropertyKind::ALL {
            if let Some(property) = self.get(user_id, kind)? {
                properties.insert(kind, property.value);
            }
        }
        Ok(properties)
    }
}

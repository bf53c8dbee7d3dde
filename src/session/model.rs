// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session and identity data model.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;
use crate::storage::{PropertyKind, PropertyValue};

/// Username given to every anonymous identity.
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// Identity projection carried by a session.
///
/// For authenticated sessions this is the result of reconciling verified
/// claims with the local store; for anonymous sessions it is synthesized
/// with a fresh ephemeral id and the `ANONYMOUS` role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Identity {
    /// Local user id (ephemeral for anonymous identities)
    pub user_id: Uuid,
    /// Identity provider subject, absent for anonymous identities
    pub external_id: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Issuer of the token this identity was derived from
    pub tenant: Option<String>,
    pub realm: Option<String>,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub properties: BTreeMap<PropertyKind, PropertyValue>,
}

impl Identity {
    /// Synthesize an anonymous identity.
    pub fn anonymous() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            external_id: None,
            username: ANONYMOUS_USERNAME.to_string(),
            email: None,
            phone: None,
            tenant: None,
            realm: None,
            roles: vec![Role::Anonymous],
            properties: BTreeMap::new(),
        }
    }

    /// Whether this identity is anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.external_id.is_none()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.has_privilege(role))
    }
}

/// Request metadata recorded on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Server-side session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    /// Bound local user; `None` for anonymous sessions
    pub user_id: Option<Uuid>,
    /// Identity snapshot, so lookups need no repository round-trip
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    /// New unbound session carrying an anonymous identity.
    pub fn anonymous(ttl: Duration, client: &ClientInfo) -> Self {
        Self::new(None, Identity::anonymous(), ttl, client)
    }

    /// New session bound to an authenticated identity.
    pub fn authenticated(identity: Identity, ttl: Duration, client: &ClientInfo) -> Self {
        Self::new(Some(identity.user_id), identity, ttl, client)
    }

    fn new(user_id: Option<Uuid>, identity: Identity, ttl: Duration, client: &ClientInfo) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            identity,
            expires_at: now + ttl,
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Bind an authenticated identity to this session in place.
    ///
    /// The session id is kept; expiry is pushed out by `ttl` from now.
    pub fn bind(&mut self, identity: Identity, ttl: Duration, client: &ClientInfo) {
        let now = Utc::now();
        self.user_id = Some(identity.user_id);
        self.identity = identity;
        self.expires_at = now + ttl;
        self.updated_at = now;
        if client.ip.is_some() {
            self.ip = client.ip.clone();
        }
        if client.user_agent.is_some() {
            self.user_agent = client.user_agent.clone();
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Usable: not soft-deleted and not expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && !self.is_expired(now)
    }
}

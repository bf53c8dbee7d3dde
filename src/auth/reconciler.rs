// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity reconciliation.
//!
//! Maps verified claims onto the locally-owned user record:
//!
//! 1. Find the user by external id, creating it on first sight
//! 2. Create or update the baseline profile properties from the claims
//! 3. Make sure the user has a wallet
//! 4. Grant every known realm role and every known role of the tenant's
//!    client, skipping grants that are already active
//! 5. Read back active roles and properties into an [`Identity`]
//!
//! Every step is individually idempotent, so a reconcile interrupted by a
//! storage failure is completed by the next one. Nothing is rolled back.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::claims::VerifiedClaims;
use super::tenants::TenantConfig;
use super::AuthError;
use crate::session::Identity;
use crate::storage::{IdentityRepository, PropertyKind, PropertyValue, StorageError, StoredUser};

/// Synchronizes provider identities into the local store.
pub struct IdentityReconciler {
    repo: Arc<dyn IdentityRepository>,
    /// Balance given to newly created wallets
    default_balance: i64,
}

impl IdentityReconciler {
    pub fn new(repo: Arc<dyn IdentityRepository>, default_balance: i64) -> Self {
        Self {
            repo,
            default_balance,
        }
    }

    /// Reconcile verified claims issued by `tenant` into a local identity.
    ///
    /// Storage failures surface as `SyncFailed`.
    pub fn reconcile(
        &self,
        claims: &VerifiedClaims,
        tenant: &TenantConfig,
    ) -> Result<Identity, AuthError> {
        let (external_id, from_sid) = claims.external_id().ok_or(AuthError::Malformed)?;
        if from_sid {
            warn!(
                issuer = %tenant.issuer,
                "Token has no subject, keying identity on provider session id"
            );
        }

        let user = self.find_or_create_user(external_id)?;

        for (kind, value) in baseline_properties(claims) {
            self.repo.upsert_property(user.id, kind, value)?;
        }

        if self.repo.create_wallet_if_absent(user.id, self.default_balance)? {
            debug!(user_id = %user.id, "Wallet created");
        }

        for role in claims.roles_for_client(&tenant.client_id) {
            if self.repo.grant_role_if_absent(user.id, role)? {
                info!(user_id = %user.id, role = %role, "Role granted");
            }
        }

        let roles = self.repo.active_roles(user.id)?;
        let properties = self.repo.properties(user.id)?;

        let text = |kind: PropertyKind| {
            properties
                .get(&kind)
                .and_then(PropertyValue::as_text)
                .map(str::to_string)
        };

        Ok(Identity {
            user_id: user.id,
            external_id: Some(user.external_id.clone()),
            username: text(PropertyKind::UserUsername).unwrap_or_else(|| user.external_id.clone()),
            email: text(PropertyKind::UserEmail),
            phone: text(PropertyKind::UserPhone),
            tenant: Some(tenant.issuer.clone()),
            realm: Some(tenant.realm.clone()),
            roles,
            properties,
        })
    }

    fn find_or_create_user(&self, external_id: &str) -> Result<StoredUser, AuthError> {
        if let Some(user) = self.repo.find_user_by_external_id(external_id)? {
            return Ok(user);
        }

        match self.repo.create_user(external_id) {
            Ok(user) => {
                info!(user_id = %user.id, "User created");
                Ok(user)
            }
            // Lost a race with a concurrent request for the same identity
            Err(StorageError::AlreadyExists(_)) => self
                .repo
                .find_user_by_external_id(external_id)?
                .ok_or_else(|| AuthError::SyncFailed("user binding vanished".to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Profile properties carried by the claims; missing fields are skipped.
fn baseline_properties(claims: &VerifiedClaims) -> Vec<(PropertyKind, PropertyValue)> {
    let mut properties = Vec::with_capacity(4);

    let texts = [
        (PropertyKind::UserUsername, &claims.preferred_username),
        (PropertyKind::UserEmail, &claims.email),
        (PropertyKind::UserPhone, &claims.phone_number),
    ];
    for (kind, value) in texts {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            properties.push((kind, PropertyValue::Text(value.to_string())));
        }
    }

    if let Some(verified) = claims.email_verified {
        properties.push((PropertyKind::UserEmailVerified, PropertyValue::Flag(verified)));
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::repository::UserRepository;
    use crate::storage::FileStore;
    use crate::test_support::{claims, tenant, test_store};

    fn verified(value: serde_json::Value) -> VerifiedClaims {
        serde_json::from_value(value).unwrap()
    }

    fn reconciler(store: &Arc<FileStore>) -> IdentityReconciler {
        IdentityReconciler::new(Arc::clone(store) as Arc<dyn IdentityRepository>, 0)
    }

    #[test]
    fn reconcile_twice_creates_one_user_wallet_and_grant_set() {
        let (_dir, store) = test_store();
        let reconciler = reconciler(&store);
        let tenant = tenant("foo");
        let c = verified(claims("https://idp/realms/foo", "alice", 300));

        let first = reconciler.reconcile(&c, &tenant).unwrap();
        let second = reconciler.reconcile(&c, &tenant).unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(
            UserRepository::new(store.storage()).list_ids().unwrap().len(),
            1
        );
        assert!(store.wallet(first.user_id).unwrap().is_some());
        assert_eq!(
            store
                .storage()
                .list_files(store.storage().paths().wallets_dir(), "json")
                .unwrap()
                .len(),
            1
        );
        assert_eq!(second.roles, vec![Role::Manager, Role::Viewer]);
        assert_eq!(
            store
                .storage()
                .list_files(store.storage().paths().user_roles_dir(first.user_id), "json")
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn projection_carries_profile_and_tenant() {
        let (_dir, store) = test_store();
        let identity = reconciler(&store)
            .reconcile(
                &verified(claims("https://idp/realms/foo", "alice", 300)),
                &tenant("foo"),
            )
            .unwrap();

        assert_eq!(identity.external_id.as_deref(), Some("alice"));
        assert_eq!(identity.username, "user-alice");
        assert_eq!(identity.email.as_deref(), Some("alice@example.com"));
        assert_eq!(identity.phone, None);
        assert_eq!(identity.tenant.as_deref(), Some("https://idp/realms/foo"));
        assert_eq!(identity.realm.as_deref(), Some("foo"));
        assert_eq!(
            identity.properties.get(&PropertyKind::UserEmailVerified),
            Some(&PropertyValue::Flag(true))
        );
    }

    #[test]
    fn missing_profile_fields_are_tolerated() {
        let (_dir, store) = test_store();
        let c = verified(serde_json::json!({
            "sub": "bare", "iss": "https://idp/realms/foo", "exp": 2000000000
        }));

        let identity = reconciler(&store).reconcile(&c, &tenant("foo")).unwrap();
        assert_eq!(identity.username, "bare");
        assert!(identity.properties.is_empty());
        assert!(identity.roles.is_empty());
        assert!(store.wallet(identity.user_id).unwrap().is_some());
    }

    #[test]
    fn updated_claims_update_properties_in_place() {
        let (_dir, store) = test_store();
        let reconciler = reconciler(&store);
        let tenant = tenant("foo");

        let mut c = claims("https://idp/realms/foo", "alice", 300);
        reconciler.reconcile(&verified(c.clone()), &tenant).unwrap();

        c["email"] = serde_json::json!("new@example.com");
        let identity = reconciler.reconcile(&verified(c), &tenant).unwrap();
        assert_eq!(identity.email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn roles_of_other_clients_and_unknown_roles_are_ignored() {
        let (_dir, store) = test_store();
        let c = verified(serde_json::json!({
            "sub": "bob",
            "iss": "https://idp/realms/foo",
            "exp": 2000000000,
            "realm_access": {"roles": ["default-roles-foo", "superuser"]},
            "resource_access": {"someone-else": {"roles": ["admin"]}}
        }));

        let identity = reconciler(&store).reconcile(&c, &tenant("foo")).unwrap();
        assert!(identity.roles.is_empty());
    }

    #[test]
    fn session_id_is_used_when_subject_is_missing() {
        let (_dir, store) = test_store();
        let c = verified(serde_json::json!({
            "sid": "kc-session-1", "iss": "https://idp/realms/foo", "exp": 2000000000
        }));

        let identity = reconciler(&store).reconcile(&c, &tenant("foo")).unwrap();
        assert_eq!(identity.external_id.as_deref(), Some("kc-session-1"));
    }

    #[test]
    fn no_identifier_is_malformed() {
        let (_dir, store) = test_store();
        let c = verified(serde_json::json!({"iss": "https://idp/realms/foo", "exp": 2000000000}));

        let err = reconciler(&store).reconcile(&c, &tenant("foo")).unwrap_err();
        assert!(matches!(err, AuthError::Malformed));
    }

    #[test]
    fn concurrent_reconciles_converge_on_one_user() {
        let (_dir, store) = test_store();
        let reconciler = Arc::new(reconciler(&store));
        let c = verified(claims("https://idp/realms/foo", "racer", 300));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reconciler = Arc::clone(&reconciler);
                let c = c.clone();
                std::thread::spawn(move || reconciler.reconcile(&c, &tenant("foo")).unwrap())
            })
            .collect();

        let ids: std::collections::HashSet<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().user_id)
            .collect();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn storage_failure_is_sync_failed() {
        struct Broken;
        impl IdentityRepository for Broken {
            fn find_user_by_external_id(&self, _: &str) -> crate::storage::StorageResult<Option<StoredUser>> {
                Err(StorageError::NotInitialized)
            }
            fn create_user(&self, _: &str) -> crate::storage::StorageResult<StoredUser> {
                unreachable!()
            }
            fn upsert_property(&self, _: uuid::Uuid, _: PropertyKind, _: PropertyValue) -> crate::storage::StorageResult<bool> {
                unreachable!()
            }
            fn properties(&self, _: uuid::Uuid) -> crate::storage::StorageResult<std::collections::BTreeMap<PropertyKind, PropertyValue>> {
                unreachable!()
            }
            fn create_wallet_if_absent(&self, _: uuid::Uuid, _: i64) -> crate::storage::StorageResult<bool> {
                unreachable!()
            }
            fn wallet(&self, _: uuid::Uuid) -> crate::storage::StorageResult<Option<crate::storage::StoredWallet>> {
                unreachable!()
            }
            fn grant_role_if_absent(&self, _: uuid::Uuid, _: Role) -> crate::storage::StorageResult<bool> {
                unreachable!()
            }
            fn active_roles(&self, _: uuid::Uuid) -> crate::storage::StorageResult<Vec<Role>> {
                unreachable!()
            }
        }

        let reconciler = IdentityReconciler::new(Arc::new(Broken), 0);
        let err = reconciler
            .reconcile(&verified(claims("https://idp/realms/foo", "x", 300)), &tenant("foo"))
            .unwrap_err();
        assert!(matches!(err, AuthError::SyncFailed(_)));
    }
}

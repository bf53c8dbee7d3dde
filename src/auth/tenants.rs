// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant registry.
//!
//! Maps a token issuer to the identity-provider realm that issued it. Built
//! once at startup from configuration plus one synthesized entry for the
//! default realm, then shared read-only.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::AuthError;

/// Placeholder substituted with the realm name in URL templates.
pub const REALM_PLACEHOLDER: &str = "{realm}";

/// Configuration of one tenant (identity-provider realm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConfig {
    /// Issuer (`iss`) of tokens minted for this tenant
    pub issuer: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    /// Issuer template, `{realm}` is substituted
    pub jwt_issuer_template: String,
    /// Key set endpoint template, `{realm}` is substituted
    pub cert_endpoint_template: String,
}

impl TenantConfig {
    /// Build a tenant whose issuer is derived from the issuer template.
    pub fn from_templates(
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        jwt_issuer_template: impl Into<String>,
        cert_endpoint_template: impl Into<String>,
    ) -> Self {
        let realm = realm.into();
        let jwt_issuer_template = jwt_issuer_template.into();
        Self {
            issuer: normalize_issuer(&fill(&jwt_issuer_template, &realm)),
            realm,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            jwt_issuer_template,
            cert_endpoint_template: cert_endpoint_template.into(),
        }
    }

    /// URL of the realm's key set.
    pub fn cert_endpoint(&self) -> String {
        fill(&self.cert_endpoint_template, &self.realm)
    }

    /// URL of the realm's token endpoint, used for code exchange.
    ///
    /// Built from the issuer template, so an explicit `issuer` override only
    /// changes token routing.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/protocol/openid-connect/token",
            normalize_issuer(&fill(&self.jwt_issuer_template, &self.realm))
        )
    }
}

/// Entry of the `KEYCLOAK_TENANTS` JSON array.
///
/// Templates default to the ones of the default tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntry {
    pub realm: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub jwt_issuer_template: Option<String>,
    #[serde(default)]
    pub cert_endpoint_template: Option<String>,
}

impl TenantEntry {
    /// Resolve into a tenant, borrowing missing templates from `defaults`.
    pub fn into_config(self, defaults: &TenantConfig) -> TenantConfig {
        let jwt_issuer_template = self
            .jwt_issuer_template
            .unwrap_or_else(|| defaults.jwt_issuer_template.clone());
        let cert_endpoint_template = self
            .cert_endpoint_template
            .unwrap_or_else(|| defaults.cert_endpoint_template.clone());

        let mut tenant = TenantConfig::from_templates(
            self.realm,
            self.client_id,
            self.client_secret,
            jwt_issuer_template,
            cert_endpoint_template,
        );
        if let Some(issuer) = self.issuer {
            tenant.issuer = normalize_issuer(&issuer);
        }
        tenant
    }
}

/// Read-only issuer → tenant map.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    tenants: HashMap<String, Arc<TenantConfig>>,
    default_issuer: String,
}

impl TenantRegistry {
    /// Build the registry. The default tenant always wins on issuer clashes.
    pub fn new(default: TenantConfig, extra: impl IntoIterator<Item = TenantConfig>) -> Self {
        let mut tenants: HashMap<String, Arc<TenantConfig>> = extra
            .into_iter()
            .map(|t| (t.issuer.clone(), Arc::new(t)))
            .collect();

        let default_issuer = default.issuer.clone();
        tenants.insert(default_issuer.clone(), Arc::new(default));

        Self {
            tenants,
            default_issuer,
        }
    }

    /// Resolve a token issuer to its tenant.
    pub fn resolve(&self, issuer: &str) -> Result<Arc<TenantConfig>, AuthError> {
        self.tenants
            .get(&normalize_issuer(issuer))
            .cloned()
            .ok_or(AuthError::UnknownTenant)
    }

    /// The synthesized default tenant.
    pub fn default_tenant(&self) -> Arc<TenantConfig> {
        // Inserted in `new` and never removed
        Arc::clone(&self.tenants[&self.default_issuer])
    }

    /// All registered tenants.
    pub fn tenants(&self) -> impl Iterator<Item = &Arc<TenantConfig>> {
        self.tenants.values()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

fn fill(template: &str, realm: &str) -> String {
    template.replace(REALM_PLACEHOLDER, realm)
}

fn normalize_issuer(issuer: &str) -> String {
    issuer.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER_TEMPLATE: &str = "https://idp/realms/{realm}";
    const CERT_TEMPLATE: &str = "https://idp/realms/{realm}/protocol/openid-connect/certs";

    fn default_tenant() -> TenantConfig {
        TenantConfig::from_templates("parier", "parier-api", "s3cret", ISSUER_TEMPLATE, CERT_TEMPLATE)
    }

    #[test]
    fn templates_are_filled_with_realm() {
        let tenant = default_tenant();
        assert_eq!(tenant.issuer, "https://idp/realms/parier");
        assert_eq!(
            tenant.cert_endpoint(),
            "https://idp/realms/parier/protocol/openid-connect/certs"
        );
        assert_eq!(
            tenant.token_endpoint(),
            "https://idp/realms/parier/protocol/openid-connect/token"
        );
    }

    #[test]
    fn resolve_known_and_unknown_issuers() {
        let foo = TenantConfig::from_templates("foo", "foo-api", "", ISSUER_TEMPLATE, CERT_TEMPLATE);
        let registry = TenantRegistry::new(default_tenant(), [foo]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("https://idp/realms/foo").unwrap().realm, "foo");
        assert_eq!(registry.resolve("https://idp/realms/foo/").unwrap().realm, "foo");
        assert!(matches!(
            registry.resolve("https://idp/realms/bar"),
            Err(AuthError::UnknownTenant)
        ));
    }

    #[test]
    fn default_tenant_always_exists() {
        let registry = TenantRegistry::new(default_tenant(), []);
        assert_eq!(registry.default_tenant().realm, "parier");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn default_wins_on_issuer_clash() {
        let clash =
            TenantConfig::from_templates("parier", "other-client", "", ISSUER_TEMPLATE, CERT_TEMPLATE);
        let registry = TenantRegistry::new(default_tenant(), [clash]);
        assert_eq!(
            registry.resolve("https://idp/realms/parier").unwrap().client_id,
            "parier-api"
        );
    }

    #[test]
    fn tenant_entry_inherits_templates() {
        let entry: TenantEntry = serde_json::from_value(serde_json::json!({
            "realm": "foo",
            "client_id": "foo-api"
        }))
        .unwrap();
        let tenant = entry.into_config(&default_tenant());
        assert_eq!(tenant.issuer, "https://idp/realms/foo");
        assert_eq!(tenant.client_secret, "");
        assert_eq!(
            tenant.cert_endpoint(),
            "https://idp/realms/foo/protocol/openid-connect/certs"
        );
    }

    #[test]
    fn tenant_entry_explicit_issuer_overrides_template() {
        let entry: TenantEntry = serde_json::from_value(serde_json::json!({
            "realm": "foo",
            "client_id": "foo-api",
            "issuer": "https://public.example/realms/foo/"
        }))
        .unwrap();
        let tenant = entry.into_config(&default_tenant());
        assert_eq!(tenant.issuer, "https://public.example/realms/foo");
        // Code exchange still goes to the templated realm URL
        assert_eq!(
            tenant.token_endpoint(),
            "https://idp/realms/foo/protocol/openid-connect/token"
        );
    }
}

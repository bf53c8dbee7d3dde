// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session lifecycle.
//!
//! Every request passes through [`SessionService::handle`]:
//!
//! ```text
//! cookie ──verify──▶ cache ──miss──▶ durable store ──▶ (NoSession | Anonymous | Authenticated)
//!                                                            │
//! bearer ──validate──▶ reconcile ──▶ bind identity ◀─────────┘
//!                                         │
//!            no bearer, no session ──▶ new anonymous session
//! ```
//!
//! A new session is persisted before the request continues, because the
//! response hands out a cookie for it. Binding an identity to an existing
//! session mutates it in place, keeps its id and persists it through the
//! background queue. The interactive login flow is the exception: it
//! persists the binding synchronously.

use std::sync::Arc;

use axum_extra::extract::cookie::Cookie;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::persist::PersistQueue;
use super::store::SessionStore;
use super::{ClientInfo, Identity, Session};
use crate::auth::cookie::MAX_AGE_LIMIT_SECS;
use crate::auth::{
    AuthError, CodeExchanger, CookieSettings, CookieSigner, IdentityReconciler, Role,
    TokenValidator,
};
use crate::storage::{PropertyKind, PropertyValue, SessionPersistence, StorageError};

/// What a route requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Token failures are fatal and an authenticated session is required.
    Required,
    /// Token failures fall back to the cookie session or a new anonymous one.
    Optional,
}

/// Per-request view of the resolved session, for downstream handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    session: Session,
}

impl RequestContext {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn identity(&self) -> &Identity {
        &self.session.identity
    }

    /// Bound local user, `None` for anonymous sessions.
    pub fn user_id(&self) -> Option<Uuid> {
        self.session.user_id
    }

    pub fn external_id(&self) -> Option<&str> {
        self.session.identity.external_id.as_deref()
    }

    pub fn roles(&self) -> &[Role] {
        &self.session.identity.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.session.identity.has_role(role)
    }

    pub fn properties(&self) -> &std::collections::BTreeMap<PropertyKind, PropertyValue> {
        &self.session.identity.properties
    }

    pub fn tenant(&self) -> Option<&str> {
        self.session.identity.tenant.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.session.identity.username
    }

    pub fn email(&self) -> Option<&str> {
        self.session.identity.email.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }
}

/// Collaborators of the lifecycle controller.
pub struct SessionServiceParts {
    pub validator: Arc<TokenValidator>,
    pub reconciler: Arc<IdentityReconciler>,
    pub exchanger: Arc<dyn CodeExchanger>,
    pub cache: Arc<SessionStore>,
    pub durable: Arc<dyn SessionPersistence>,
    pub queue: PersistQueue,
    pub signer: CookieSigner,
    pub cookies: CookieSettings,
}

/// Session lifecycle controller.
pub struct SessionService {
    validator: Arc<TokenValidator>,
    reconciler: Arc<IdentityReconciler>,
    exchanger: Arc<dyn CodeExchanger>,
    cache: Arc<SessionStore>,
    durable: Arc<dyn SessionPersistence>,
    queue: PersistQueue,
    signer: CookieSigner,
    cookies: CookieSettings,
    ttl: chrono::Duration,
}

impl SessionService {
    pub fn new(parts: SessionServiceParts) -> Self {
        // Session lifetime follows the cookie max-age
        let ttl =
            chrono::Duration::seconds(parts.cookies.max_age_secs.clamp(1, MAX_AGE_LIMIT_SECS));
        Self {
            validator: parts.validator,
            reconciler: parts.reconciler,
            exchanger: parts.exchanger,
            cache: parts.cache,
            durable: parts.durable,
            queue: parts.queue,
            signer: parts.signer,
            cookies: parts.cookies,
            ttl,
        }
    }

    pub fn cookie_settings(&self) -> &CookieSettings {
        &self.cookies
    }

    pub fn validator(&self) -> &Arc<TokenValidator> {
        &self.validator
    }

    pub fn cache(&self) -> &Arc<SessionStore> {
        &self.cache
    }

    /// Set-Cookie carrying the signed reference to `session`.
    pub fn signed_cookie(&self, session: &Session) -> Cookie<'static> {
        self.cookies.session_cookie(self.signer.sign(session.id))
    }

    /// Set-Cookie clearing the session reference.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        self.cookies.removal_cookie()
    }

    /// Resolve the session referenced by a cookie value.
    ///
    /// Tampered, malformed, unknown, expired and deleted references all
    /// resolve to `None`.
    pub fn resolve_session(&self, cookie_value: Option<&str>) -> Option<Session> {
        match self.lookup_session(cookie_value?) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(reason = e.error_code(), "Session cookie not usable");
                None
            }
        }
    }

    fn lookup_session(&self, cookie_value: &str) -> Result<Session, AuthError> {
        let id = self.signer.verify(cookie_value)?;

        if let Some(session) = self.cache.get(id) {
            return Ok(session);
        }

        match self.durable.find_session(id) {
            Ok(Some(session)) if session.is_live(Utc::now()) => {
                debug!(session_id = %id, "Session loaded from durable store");
                self.cache.set(session.clone());
                Ok(session)
            }
            Ok(_) => Err(AuthError::SessionNotFound),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Session lookup failed");
                Err(AuthError::SessionNotFound)
            }
        }
    }

    /// Run the per-request state machine.
    pub async fn handle(
        &self,
        cookie_value: Option<&str>,
        bearer: Option<&str>,
        policy: AuthPolicy,
        client: &ClientInfo,
    ) -> Result<RequestContext, AuthError> {
        let existing = self.resolve_session(cookie_value);

        if let Some(token) = bearer {
            match self.authenticate(token).await {
                Ok(identity) => {
                    let session = self.bind_async(existing, identity, client)?;
                    return Ok(RequestContext::new(session));
                }
                Err(e) if policy == AuthPolicy::Required || !e.is_token_rejection() => {
                    return Err(e);
                }
                Err(e) => {
                    debug!(error_code = e.error_code(), "Bearer token ignored on optional route");
                }
            }
        }

        match (existing, policy) {
            (Some(session), AuthPolicy::Required) if !session.is_authenticated() => {
                Err(AuthError::Unauthenticated)
            }
            (Some(session), _) => Ok(RequestContext::new(session)),
            (None, AuthPolicy::Required) => Err(AuthError::Unauthenticated),
            (None, AuthPolicy::Optional) => {
                let session = Session::anonymous(self.ttl, client);
                self.persist_new(&session)?;
                debug!(session_id = %session.id, "Anonymous session created");
                Ok(RequestContext::new(session))
            }
        }
    }

    /// Validate a bearer token and reconcile its identity.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let validated = self.validator.validate(token).await?;
        self.reconciler.reconcile(&validated.claims, &validated.tenant)
    }

    /// Interactive login: exchange an authorization code, validate the
    /// returned access token and bind its identity to the current session.
    ///
    /// The binding is persisted before returning.
    pub async fn login_with_code(
        &self,
        current: Option<Session>,
        issuer: &str,
        code: &str,
        redirect_uri: &str,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        let tenant = self.validator.tenants().resolve(issuer)?;
        let tokens = self.exchanger.exchange(&tenant, code, redirect_uri).await?;
        let claims = self
            .validator
            .validate_for(&tokens.access_token, &tenant)
            .await?;
        let identity = self.reconciler.reconcile(&claims, &tenant)?;

        let session = match current {
            Some(mut session) => {
                session.bind(identity, self.ttl, client);
                self.durable
                    .update_session(&session)
                    .map_err(persist_failed)?;
                self.cache.set(session.clone());
                session
            }
            None => {
                let session = Session::authenticated(identity, self.ttl, client);
                self.persist_new(&session)?;
                session
            }
        };

        info!(
            session_id = %session.id,
            user_id = ?session.user_id,
            realm = %tenant.realm,
            "Login completed"
        );
        Ok(session)
    }

    /// End a session: soft-delete the durable record and evict the cache entry.
    ///
    /// Updates already queued for the session are written first, so none of
    /// them lands after the delete.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.cache.delete(session_id);
        self.queue.flush().await;
        let result = match self.durable.soft_delete_session(session_id) {
            Ok(()) | Err(StorageError::NotFound(_)) => {
                info!(session_id = %session_id, "Session ended");
                Ok(())
            }
            Err(e) => Err(persist_failed(e)),
        };
        // A concurrent request may have re-cached it from the durable copy
        self.cache.delete(session_id);
        result
    }

    fn bind_async(
        &self,
        existing: Option<Session>,
        identity: Identity,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        match existing {
            Some(mut session) => {
                let upgraded = !session.is_authenticated();
                session.bind(identity, self.ttl, client);
                self.cache.set(session.clone());
                self.queue.update(session.clone());
                if upgraded {
                    info!(session_id = %session.id, user_id = ?session.user_id, "Session authenticated");
                }
                Ok(session)
            }
            None => {
                let session = Session::authenticated(identity, self.ttl, client);
                self.persist_new(&session)?;
                debug!(session_id = %session.id, user_id = ?session.user_id, "Session created");
                Ok(session)
            }
        }
    }

    fn persist_new(&self, session: &Session) -> Result<(), AuthError> {
        self.durable.create_session(session).map_err(persist_failed)?;
        self.cache.set(session.clone());
        Ok(())
    }
}

fn persist_failed(e: StorageError) -> AuthError {
    warn!(error = %e, "Session not persisted");
    AuthError::SessionPersistFailed(e.to_string())
}

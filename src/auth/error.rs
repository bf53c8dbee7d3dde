// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Display strings are fixed and safe to return to clients. Variants that
//! carry a `String` keep the underlying cause for logs only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StorageError;

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Authorization header is not `Bearer <token>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Endpoint requires an authenticated identity and none was presented
    #[error("Authentication is required")]
    Unauthenticated,
    /// Token could not be decoded
    #[error("Token is malformed")]
    Malformed,
    /// Token signature did not verify against any known key
    #[error("Token signature is invalid")]
    InvalidSignature,
    /// Token algorithm is not accepted for the signing key
    #[error("Token algorithm is not supported")]
    UnsupportedAlgorithm,
    /// Token has expired
    #[error("Token has expired")]
    Expired,
    /// Token is not yet valid
    #[error("Token is not yet valid")]
    NotYetValid,
    /// Token issuer does not match the resolved tenant
    #[error("Token issuer is invalid")]
    InvalidIssuer,
    /// Token issuer is not a registered tenant
    #[error("Token issuer is not a known tenant")]
    UnknownTenant,
    /// Key set could not be fetched and nothing is cached
    #[error("Signing keys are unavailable")]
    KeyFetchFailed(String),
    /// Identity could not be synchronized into the local store
    #[error("Identity synchronization failed")]
    SyncFailed(String),
    /// Session does not exist or is no longer live
    #[error("Session not found")]
    SessionNotFound,
    /// A new session could not be persisted
    #[error("Session could not be created")]
    SessionPersistFailed(String),
    /// Cookie MAC did not verify
    #[error("Session cookie is invalid")]
    CookieTampered,
    /// Cookie value is not `<id>.<hex mac>`
    #[error("Session cookie is invalid")]
    CookieMalformed,
    /// Authorization code exchange failed or timed out
    #[error("Authorization code exchange failed")]
    CodeExchangeFailed(String),
    /// Internal error
    #[error("Internal authentication error")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Malformed => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::UnsupportedAlgorithm => "unsupported_algorithm",
            AuthError::Expired => "token_expired",
            AuthError::NotYetValid => "token_not_yet_valid",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::UnknownTenant => "unknown_tenant",
            AuthError::KeyFetchFailed(_) => "key_fetch_failed",
            AuthError::SyncFailed(_) => "sync_failed",
            AuthError::SessionNotFound => "session_not_found",
            AuthError::SessionPersistFailed(_) => "session_persist_failed",
            AuthError::CookieTampered => "cookie_tampered",
            AuthError::CookieMalformed => "cookie_malformed",
            AuthError::CodeExchangeFailed(_) => "code_exchange_failed",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::SyncFailed(_)
            | AuthError::SessionPersistFailed(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Token-level and tenant-resolution failures.
    ///
    /// Soft-auth endpoints swallow these and fall back to the session.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidAuthHeader
                | AuthError::Malformed
                | AuthError::InvalidSignature
                | AuthError::UnsupportedAlgorithm
                | AuthError::Expired
                | AuthError::NotYetValid
                | AuthError::InvalidIssuer
                | AuthError::UnknownTenant
                | AuthError::KeyFetchFailed(_)
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        AuthError::SyncFailed(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthenticated_returns_401() {
        let response = AuthError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "unauthenticated");
    }

    #[tokio::test]
    async fn sync_failure_is_500_without_detail() {
        let response =
            AuthError::SyncFailed("disk full at /data/users/x.json".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(!text.contains("/data/users"));
        assert!(text.contains("sync_failed"));
    }

    #[test]
    fn key_fetch_failure_is_an_auth_failure() {
        assert_eq!(
            AuthError::KeyFetchFailed("timeout".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn cookie_and_session_misses_are_401() {
        for e in [
            AuthError::CookieTampered,
            AuthError::CookieMalformed,
            AuthError::SessionNotFound,
        ] {
            assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
            assert!(!e.is_token_rejection());
        }
    }

    #[test]
    fn token_rejections_exclude_server_failures() {
        assert!(AuthError::Expired.is_token_rejection());
        assert!(AuthError::UnknownTenant.is_token_rejection());
        assert!(!AuthError::SyncFailed(String::new()).is_token_rejection());
        assert!(!AuthError::CodeExchangeFailed(String::new()).is_token_rejection());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login, profile and logout endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;
use crate::error::ApiError;
use crate::session::{ClientInfo, CurrentSession, Session, SessionEnded};
use crate::state::AppState;

/// Authorization-code login request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginCodeRequest {
    /// Authorization code returned by the identity provider
    pub code: String,
    /// Issuer of the tenant the code belongs to
    pub iss: String,
    /// Redirect URI used in the authorization request
    pub redirect_uri: String,
}

/// Profile of the current session.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    /// Session id
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub realm: Option<String>,
    /// Issuer of the tenant
    pub tenant: Option<String>,
    pub roles: Vec<Role>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for ProfileResponse {
    fn from(session: &Session) -> Self {
        let identity = &session.identity;
        Self {
            id: session.id,
            user_id: session.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            realm: identity.realm.clone(),
            tenant: identity.tenant.clone(),
            roles: identity.roles.clone(),
            expires_at: session.expires_at,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Exchange an authorization code and bind the identity to the current session.
#[utoipa::path(
    put,
    path = "/v1/auth/login-code",
    tag = "Auth",
    request_body = LoginCodeRequest,
    responses(
        (status = 200, description = "Session bound to the authenticated identity", body = ProfileResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Unknown tenant, rejected code or invalid token"),
        (status = 500, description = "Identity sync or session persistence failed")
    )
)]
pub async fn login_code(
    State(state): State<AppState>,
    CurrentSession(ctx): CurrentSession,
    Extension(client): Extension<ClientInfo>,
    Json(payload): Json<LoginCodeRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    if payload.code.trim().is_empty() {
        return Err(ApiError::bad_request("code is required"));
    }
    if payload.iss.trim().is_empty() {
        return Err(ApiError::bad_request("iss is required"));
    }
    if payload.redirect_uri.trim().is_empty() {
        return Err(ApiError::bad_request("redirect_uri is required"));
    }

    let session = state
        .sessions
        .login_with_code(
            Some(ctx.into_session()),
            payload.iss.trim(),
            &payload.code,
            &payload.redirect_uri,
            &client,
        )
        .await?;

    // Bound in place, so the cookie the middleware sets still names this session.
    Ok(Json(ProfileResponse::from(&session)))
}

/// Profile of the authenticated session.
#[utoipa::path(
    get,
    path = "/v1/auth/profile",
    tag = "Auth",
    responses(
        (status = 200, description = "Current profile", body = ProfileResponse),
        (status = 401, description = "No authenticated session")
    )
)]
pub async fn profile(CurrentSession(ctx): CurrentSession) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(ctx.session()))
}

/// End the current session and clear its cookie.
#[utoipa::path(
    put,
    path = "/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "No authenticated session"),
        (status = 500, description = "Session could not be deleted")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(ctx): CurrentSession,
) -> Result<Response, ApiError> {
    state.sessions.logout(ctx.session().id).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.extensions_mut().insert(SessionEnded);
    Ok(response)
}

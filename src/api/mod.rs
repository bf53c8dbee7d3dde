// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::Role,
    session::{optional_session, required_session, Identity},
    state::AppState,
};

pub mod auth;
pub mod health;

pub fn router(state: AppState) -> Router {
    // Soft auth: anonymous sessions are created on first contact
    let soft = Router::new()
        .route("/auth/login-code", put(auth::login_code))
        .route_layer(from_fn_with_state(
            state.sessions.clone(),
            optional_session,
        ));

    let strict = Router::new()
        .route("/auth/profile", get(auth::profile).post(auth::profile))
        .route("/auth/logout", put(auth::logout))
        .route_layer(from_fn_with_state(
            state.sessions.clone(),
            required_session,
        ));

    let app = Router::new()
        .nest("/v1", soft.merge(strict))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    // Credentialed CORS: the session travels in a cookie
    app.merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::very_permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_code,
        auth::profile,
        auth::logout,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            auth::LoginCodeRequest,
            auth::ProfileResponse,
            Identity,
            Role,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Token login and session management"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

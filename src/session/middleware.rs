// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum integration of the session lifecycle.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/profile", get(profile))
//!     .layer(axum::middleware::from_fn_with_state(service.clone(), required_session));
//!
//! async fn profile(CurrentSession(ctx): CurrentSession) -> impl IntoResponse { ... }
//! ```
//!
//! Both middlewares resolve the session, insert a [`RequestContext`] and the
//! caller's [`ClientInfo`] into the request extensions and re-sign the session cookie into the response.
//! On required routes an authentication failure clears the cookie.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, USER_AGENT},
        request::Parts,
        HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use super::service::{AuthPolicy, RequestContext, SessionService};
use super::ClientInfo;
use crate::auth::AuthError;

/// Response extension set by handlers that ended the session; the
/// middleware then clears the cookie instead of re-signing it.
#[derive(Debug, Clone, Copy)]
pub struct SessionEnded;

/// Soft authentication: bad tokens fall back to the cookie session or a new
/// anonymous one.
pub async fn optional_session(
    State(service): State<Arc<SessionService>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    run(&service, AuthPolicy::Optional, jar, request, next).await
}

/// Strict authentication: requires an authenticated session or a valid
/// bearer token.
pub async fn required_session(
    State(service): State<Arc<SessionService>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    run(&service, AuthPolicy::Required, jar, request, next).await
}

async fn run(
    service: &SessionService,
    policy: AuthPolicy,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_value = jar
        .get(&service.cookie_settings().name)
        .map(|c| c.value().to_string());

    let bearer = match bearer_token(request.headers()) {
        Ok(token) => token,
        Err(e) if policy == AuthPolicy::Required => {
            return (jar.add(service.removal_cookie()), e).into_response();
        }
        Err(_) => None,
    };

    let client = client_info(&request);

    let ctx = match service
        .handle(cookie_value.as_deref(), bearer.as_deref(), policy, &client)
        .await
    {
        Ok(ctx) => ctx,
        Err(e) if policy == AuthPolicy::Required && e.status_code().is_client_error() => {
            return (jar.add(service.removal_cookie()), e).into_response();
        }
        Err(e) => return e.into_response(),
    };

    let cookie = service.signed_cookie(ctx.session());
    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(client);

    let response = next.run(request).await;

    let jar = if response.extensions().get::<SessionEnded>().is_some() {
        jar.add(service.removal_cookie())
    } else {
        jar.add(cookie)
    };
    (jar, response).into_response()
}

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(Some(token.to_string()))
}

/// Client address and user agent of a request.
///
/// The address is the first `X-Forwarded-For` entry, else `X-Real-IP`,
/// else the socket peer.
pub fn client_info(request: &Request) -> ClientInfo {
    let headers = request.headers();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let ip = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ClientInfo { ip, user_agent }
}

/// Extractor for the session resolved by the middleware.
///
/// Rejects with 401 when no session middleware ran for the route.
pub struct CurrentSession(pub RequestContext);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(CurrentSession)
            .ok_or(AuthError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::session::service::tests::{harness, FOO};
    use crate::test_support::{claims, mint_token, KEY_A};
    use axum::{
        body::Body,
        http::{header::COOKIE, header::SET_COOKIE, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Json, Router,
    };
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    async fn whoami(CurrentSession(ctx): CurrentSession) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "session": ctx.session().id,
            "authenticated": ctx.is_authenticated(),
            "roles": ctx.roles(),
        }))
    }

    async fn bye(CurrentSession(_ctx): CurrentSession) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        response.extensions_mut().insert(SessionEnded);
        response
    }

    fn app(service: Arc<SessionService>) -> Router {
        let soft = Router::new()
            .route("/soft", get(whoami))
            .layer(from_fn_with_state(service.clone(), optional_session));
        let strict = Router::new()
            .route("/strict", get(whoami))
            .route("/bye", get(bye))
            .layer(from_fn_with_state(service, required_session));
        soft.merge(strict)
    }

    fn set_cookie(response: &Response) -> Option<String> {
        response
            .headers()
            .get(SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string())
    }

    async fn json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn soft_route_sets_anonymous_cookie() {
        let h = harness();
        let response = app(h.service.clone())
            .oneshot(HttpRequest::builder().uri("/soft").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = set_cookie(&response).unwrap();
        assert!(cookie.starts_with("parier-session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));

        let body = json(response).await;
        assert_eq!(body["authenticated"], false);
        assert_eq!(body["roles"], serde_json::json!(["ANONYMOUS"]));
    }

    #[tokio::test]
    async fn strict_route_rejects_and_clears_cookie() {
        let h = harness();
        let response = app(h.service.clone())
            .oneshot(HttpRequest::builder().uri("/strict").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cookie = set_cookie(&response).unwrap();
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(json(response).await["error_code"], "unauthenticated");
    }

    #[tokio::test]
    async fn strict_route_rejects_malformed_header() {
        let h = harness();
        let response = app(h.service.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/strict")
                    .header(AUTHORIZATION, "Basic abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bearer_upgrades_cookie_session() {
        let h = harness();
        let app = app(h.service.clone());

        let first = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/soft").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = set_cookie(&first).unwrap();
        let pair = cookie.split(';').next().unwrap().to_string();
        let anon_id = json(first).await["session"].clone();

        let token = mint_token(&KEY_A, Some("a"), &claims(FOO, "alice", 300));
        let second = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/strict")
                    .header(COOKIE, &pair)
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        let body = json(second).await;
        assert_eq!(body["session"], anon_id);
        assert_eq!(body["authenticated"], true);
        assert!(body["roles"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!(Role::Viewer.as_str())));
    }

    #[tokio::test]
    async fn ended_session_clears_cookie() {
        let h = harness();
        let token = mint_token(&KEY_A, Some("a"), &claims(FOO, "alice", 300));
        let response = app(h.service.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/bye")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap(), None);

        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap().as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, "bearer  abc ".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap().as_deref(), Some("abc"));

        for bad in ["Basic abc", "Bearer", "Bearer   "] {
            headers.insert(AUTHORIZATION, bad.parse().unwrap());
            assert!(matches!(
                bearer_token(&headers),
                Err(AuthError::InvalidAuthHeader)
            ));
        }
    }

    #[test]
    fn client_address_precedence() {
        let peer: SocketAddr = "198.51.100.1:4000".parse().unwrap();
        let build = |headers: &[(&str, &str)]| {
            let mut builder = HttpRequest::builder().uri("/").header(USER_AGENT, "ua");
            for (k, v) in headers {
                builder = builder.header(*k, *v);
            }
            let mut request = builder.body(Body::empty()).unwrap();
            request.extensions_mut().insert(ConnectInfo(peer));
            request
        };

        let info = client_info(&build(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("x-real-ip", "192.0.2.1"),
        ]));
        assert_eq!(info.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(info.user_agent.as_deref(), Some("ua"));

        let info = client_info(&build(&[("x-real-ip", "192.0.2.1")]));
        assert_eq!(info.ip.as_deref(), Some("192.0.2.1"));

        let info = client_info(&build(&[]));
        assert_eq!(info.ip.as_deref(), Some("198.51.100.1"));
    }
}

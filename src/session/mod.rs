// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sessions
//!
//! Server-side sessions referenced by a signed cookie.
//!
//! - [`model`]: `Session` and the `Identity` snapshot it carries
//! - [`store`]: in-memory cache with expiry and idle eviction
//! - [`persist`]: background queue for durable session updates
//! - [`service`]: per-request lifecycle (anonymous bootstrap, upgrade, login, logout)
//! - [`middleware`]: axum middleware and the `CurrentSession` extractor

pub mod middleware;
pub mod model;
pub mod persist;
pub mod service;
pub mod store;

pub use middleware::{optional_session, required_session, CurrentSession, SessionEnded};
pub use model::{ClientInfo, Identity, Session, ANONYMOUS_USERNAME};
pub use persist::{PersistQueue, PersistWorker};
pub use service::{AuthPolicy, RequestContext, SessionService, SessionServiceParts};
pub use store::{SessionStore, SessionSweeper};

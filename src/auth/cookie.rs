// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed session cookie.
//!
//! The cookie carries only the session id, bound to the server secret:
//!
//! ```text
//! <session uuid>.<hex(HMAC-SHA256(secret, session uuid))>
//! ```
//!
//! Verification never errors. Any malformed, tampered or foreign value is
//! reported as `None`, which callers treat exactly like a missing cookie.

use axum_extra::extract::cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the id and the MAC.
const SEPARATOR: char = '.';

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Upper bound for the session cookie max-age (ten years).
pub const MAX_AGE_LIMIT_SECS: i64 = 10 * 365 * 86_400;

/// HMAC signer/verifier for session ids.
#[derive(Clone)]
pub struct CookieSigner {
    key: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    /// Create a signer. Returns `None` if the secret is shorter than
    /// [`MIN_SECRET_LEN`].
    pub fn new(secret: &[u8]) -> Option<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return None;
        }
        // HMAC accepts keys of any length
        let key = HmacSha256::new_from_slice(secret).ok()?;
        Some(Self { key })
    }

    /// Sign a session id.
    pub fn sign(&self, session_id: Uuid) -> String {
        let id = session_id.to_string();
        let mut mac = self.key.clone();
        mac.update(id.as_bytes());
        let tag = hex::encode(mac.finalize().into_bytes());
        format!("{id}{SEPARATOR}{tag}")
    }

    /// Verify a cookie value and return the session id it binds.
    ///
    /// Callers treat either error exactly like a missing cookie.
    pub fn verify(&self, value: &str) -> Result<Uuid, AuthError> {
        let (id, tag) = value
            .split_once(SEPARATOR)
            .ok_or(AuthError::CookieMalformed)?;
        // Lower-case hex only, so each cookie has exactly one valid spelling
        if tag.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(AuthError::CookieMalformed);
        }
        let tag = hex::decode(tag).map_err(|_| AuthError::CookieMalformed)?;

        let mut mac = self.key.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&tag).map_err(|_| AuthError::CookieTampered)?;

        // Only the canonical hyphenated form is ever signed
        let session_id = Uuid::parse_str(id).map_err(|_| AuthError::CookieMalformed)?;
        if session_id.to_string() != id {
            return Err(AuthError::CookieMalformed);
        }
        Ok(session_id)
    }
}

/// Attributes of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// Max-age in seconds
    pub max_age_secs: i64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "parier-session".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            max_age_secs: 86_400,
        }
    }
}

impl CookieSettings {
    /// Cookie carrying a signed session reference.
    pub fn session_cookie(&self, signed_value: String) -> Cookie<'static> {
        self.builder(signed_value)
            .max_age(time::Duration::seconds(self.max_age_secs))
            .build()
    }

    /// Expired cookie that clears the session reference.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        self.builder(String::new())
            .max_age(time::Duration::ZERO)
            .build()
    }

    fn builder(&self, value: String) -> cookie::CookieBuilder<'static> {
        let builder = Cookie::build((self.name.clone(), value))
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(SameSite::Lax);

        match &self.domain {
            Some(domain) => builder.domain(domain.clone()),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CookieSigner {
        CookieSigner::new(b"0123456789abcdef-test-secret").unwrap()
    }

    #[test]
    fn rejects_short_secret() {
        assert!(CookieSigner::new(b"short").is_none());
    }

    #[test]
    fn sign_verify_round_trip() {
        let signer = signer();
        for _ in 0..32 {
            let id = Uuid::new_v4();
            assert_eq!(signer.verify(&signer.sign(id)).ok(), Some(id));
        }
    }

    #[test]
    fn signed_value_shape() {
        let id = Uuid::new_v4();
        let value = signer().sign(id);
        let (left, right) = value.split_once('.').unwrap();
        assert_eq!(left, id.to_string());
        assert_eq!(right.len(), 64);
        assert!(right.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let signer = signer();
        let id = Uuid::new_v4();
        let value = signer.sign(id);

        for i in 0..value.len() {
            let mut bytes = value.clone().into_bytes();
            if bytes[i] == b'.' {
                continue;
            }
            // Flip to another character of the same class so the value stays parseable
            bytes[i] = match bytes[i] {
                b'0' => b'1',
                b'-' => b'0',
                _ => b'0',
            };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(signer.verify(&tampered).is_err(), "byte {i} accepted");
        }
    }

    #[test]
    fn upper_case_mac_is_rejected() {
        let signer = signer();
        let value = signer.sign(Uuid::new_v4());
        let (id, tag) = value.split_once('.').unwrap();
        assert!(matches!(
            signer.verify(&format!("{id}.{}", tag.to_uppercase())),
            Err(AuthError::CookieMalformed)
        ));
    }

    #[test]
    fn other_secret_is_rejected() {
        let other = CookieSigner::new(b"another-secret-of-16+bytes").unwrap();
        let value = other.sign(Uuid::new_v4());
        assert!(matches!(
            signer().verify(&value),
            Err(AuthError::CookieTampered)
        ));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let signer = signer();
        for value in ["", "no-separator", "abc.zz"] {
            assert!(
                matches!(signer.verify(value), Err(AuthError::CookieMalformed)),
                "{value:?} accepted"
            );
        }
        // Empty MAC decodes but cannot verify
        assert!(matches!(
            signer.verify(&format!("{}.", Uuid::new_v4())),
            Err(AuthError::CookieTampered)
        ));
    }

    #[test]
    fn session_cookie_carries_settings() {
        let settings = CookieSettings {
            domain: Some("example.com".into()),
            secure: true,
            ..CookieSettings::default()
        };
        let cookie = settings.session_cookie("v".into());
        assert_eq!(cookie.name(), "parier-session");
        assert_eq!(cookie.value(), "v");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(86_400)));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = CookieSettings::default().removal_cookie();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}

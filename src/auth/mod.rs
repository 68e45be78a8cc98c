//! Caller authentication.
//!
//! A request is authenticated before any streaming starts; the core only
//! ever sees an opaque [`AuthenticatedUser`]. Bearer tokens are JWTs:
//! the gateway validates shape, subject, expiry, and audience. Signature
//! verification is the fronting identity provider's job and is not
//! reimplemented here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use thiserror::Error;

/// Fixed identity used when authentication is disabled (development mode).
const DEV_USER_ID: &str = "test-user-dev";

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub claims: serde_json::Value,
}

/// Authentication failures, all rejected before the relay ever runs.
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("authorization header must be a Bearer token")]
    MalformedHeader,
    #[error("token is not a well-formed JWT: {0}")]
    MalformedToken(String),
    #[error("token expired")]
    Expired,
    #[error("token has an invalid audience")]
    InvalidAudience,
    #[error("token missing subject")]
    MissingSubject,
}

/// Credential-resolution collaborator.
pub trait Authenticator: Send + Sync {
    /// Resolve the caller from an `Authorization` header value, or fail
    /// with a structured error.
    fn resolve_user(&self, authorization: Option<&str>) -> Result<AuthenticatedUser, AuthError>;
}

/// Bearer-JWT authenticator.
#[derive(Debug, Clone, Default)]
pub struct JwtAuthenticator {
    audience: Vec<String>,
}

impl JwtAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict accepted tokens to these audiences. Comma-separated
    /// values are split, empty entries ignored.
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = audience
            .split(',')
            .map(str::trim)
            .filter(|aud| !aud.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    fn check_audience(&self, claims: &serde_json::Value) -> Result<(), AuthError> {
        if self.audience.is_empty() {
            return Ok(());
        }
        let accepted = match claims.get("aud") {
            Some(serde_json::Value::String(aud)) => self.audience.iter().any(|a| a == aud),
            Some(serde_json::Value::Array(auds)) => auds
                .iter()
                .filter_map(|v| v.as_str())
                .any(|aud| self.audience.iter().any(|a| a == aud)),
            _ => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(AuthError::InvalidAudience)
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn resolve_user(&self, authorization: Option<&str>) -> Result<AuthenticatedUser, AuthError> {
        let token = resolve_bearer_token(authorization)?;
        let claims = decode_claims(&token)?;

        if let Some(exp) = claims.get("exp").and_then(|v| v.as_i64()) {
            if exp < Utc::now().timestamp() {
                return Err(AuthError::Expired);
            }
        }
        self.check_audience(&claims)?;

        let user_id = claims
            .get("sub")
            .or_else(|| claims.get("user_id"))
            .and_then(|v| v.as_str())
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::MissingSubject)?
            .to_string();

        Ok(AuthenticatedUser { user_id, claims })
    }
}

/// Development-mode authenticator: every request resolves to a fixed
/// test user without inspecting the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAuthenticator;

impl Authenticator for StaticAuthenticator {
    fn resolve_user(&self, _authorization: Option<&str>) -> Result<AuthenticatedUser, AuthError> {
        Ok(AuthenticatedUser {
            user_id: DEV_USER_ID.to_string(),
            claims: serde_json::json!({"sub": DEV_USER_ID, "role": "authenticated"}),
        })
    }
}

fn resolve_bearer_token(authorization: Option<&str>) -> Result<String, AuthError> {
    let header = authorization
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingCredential)?;
    let (scheme, value) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    let value = value.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || value.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(value.to_string())
}

fn decode_claims(token: &str) -> Result<serde_json::Value, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|error| AuthError::MalformedToken(error.to_string()))?;
    serde_json::from_slice(&decoded)
        .map_err(|error| AuthError::MalformedToken(format!("claims are not JSON: {error}")))
}

use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::schema::OwnerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing session token")]
    MissingToken,

    #[error("Invalid session; {0}")]
    InvalidToken(String),

    #[error("Invalid session; Token expired")]
    Expired,

    #[error("Invalid session; Token carries no user_id")]
    MissingOwner,

    #[error("Invalid session; user_id must be an integer")]
    MalformedOwner,

    #[error("Invalid signing key")]
    InvalidKey,
}

/// Claims carried by a session token. Only `user_id` is required; `exp` is
/// checked when present.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl SessionClaims {
    pub fn new(owner: OwnerId, lifetime: Duration) -> Self {
        let now = Local::now();

        Self {
            user_id: Some(Value::from(owner.0)),
            iat: Some(now.timestamp()),
            exp: Some((now + lifetime).timestamp()),
        }
    }

    /// Reads `user_id` as an owner id. Integral floats such as `7.0` are
    /// accepted because some issuers encode every number as a double.
    pub fn owner_id(&self) -> Result<OwnerId, AuthError> {
        let number = match self.user_id.as_ref() {
            Some(Value::Number(number)) => number,
            Some(_) => return Err(AuthError::MalformedOwner),
            None => return Err(AuthError::MissingOwner),
        };

        if let Some(id) = number.as_i64() {
            return Ok(OwnerId(id));
        }

        match number.as_f64() {
            Some(id) if id.fract() == 0. && id.abs() < i64::MAX as f64 => Ok(OwnerId(id as i64)),
            _ => Err(AuthError::MalformedOwner),
        }
    }
}

/// HS256 key used to verify (and, for tooling and tests, issue) tokens.
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
}

impl SessionKeys {
    pub fn new(secret: &[u8]) -> Result<Self, AuthError> {
        let key: Hmac<Sha256> = Hmac::new_from_slice(secret).map_err(|_| AuthError::InvalidKey)?;
        Ok(Self { key })
    }

    pub fn issue(&self, owner: OwnerId, lifetime: Duration) -> Result<String, AuthError> {
        self.sign(&SessionClaims::new(owner, lifetime))
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        claims
            .sign_with_key(&self.key)
            .map_err(|e| AuthError::InvalidToken(format!("{e}")))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let claims: SessionClaims = token
            .verify_with_key(&self.key)
            .map_err(|e| AuthError::InvalidToken(format!("{e}")))?;

        if let Some(exp) = claims.exp {
            let now = Local::now().timestamp();
            if (exp - now).is_negative() {
                return Err(AuthError::Expired);
            }
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Resolves the owner of a request from its `Authorization: Bearer` header,
/// falling back to the session cookie.
pub fn extract_owner_id(
    keys: &SessionKeys,
    authorization: Option<&str>,
    cookie: Option<&str>,
) -> Result<OwnerId, AuthError> {
    let token = match authorization {
        Some(header) => bearer_token(header)?,
        None => cookie.ok_or(AuthError::MissingToken)?,
    };

    keys.verify(token)?.owner_id()
}

fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidToken(format!("Malformed authorization header")))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidToken(format!(
            "Unsupported authorization scheme"
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

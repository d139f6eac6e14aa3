use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ClientError, Result};

/// Claims the client reads from an access token. The signature is never
/// checked here; the backend is the only verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        expires_at(&self.access).ok().flatten()
    }
}

pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(ClientError::Token)?;
    Ok(data.claims)
}

/// `Ok(None)` when the token is well formed but carries no `exp`.
pub fn expires_at(token: &str) -> Result<Option<DateTime<Utc>>> {
    let claims = decode_claims(token)?;
    Ok(claims
        .exp
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single()))
}

/// True when the token expires strictly more than `margin` after `now`.
/// Undecodable tokens and tokens without `exp` are never fresh.
pub fn is_fresh_at(token: &str, margin: Duration, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Ok(Some(exp)) => exp - now > margin,
        _ => false,
    }
}

pub fn is_fresh(token: &str, margin: Duration) -> bool {
    is_fresh_at(token, margin, Utc::now())
}

/// How long until the proactive refresh should fire, or `None` when the
/// token is already inside the margin.
pub fn refresh_delay_at(
    token: &str,
    margin: Duration,
    now: DateTime<Utc>,
) -> Option<std::time::Duration> {
    let exp = expires_at(token).ok().flatten()?;
    let delay = exp - margin - now;
    if delay <= Duration::zero() {
        return None;
    }
    delay.to_std().ok()
}

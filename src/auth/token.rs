//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the issuer and audience constants plus a
//! `typ` claim that keeps access and refresh tokens apart. Expiry is checked
//! against the injected [`Clock`] rather than the wall clock so it can be
//! exercised deterministically.

use anyhow::{Context, bail};
use chrono::Duration;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::JwtConfig;
use crate::domain::{Role, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is malformed")]
    Malformed,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: TokenKind,
}

impl Claims {
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        UserId::new(self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let access_ttl = parse_ttl(&config.access_ttl).context("Invalid access token TTL")?;
        let refresh_ttl = parse_ttl(&config.refresh_ttl).context("Invalid refresh token TTL")?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        // Expiry is compared against the injected clock in `verify`.
        validation.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl,
            refresh_ttl,
            clock,
        })
    }

    fn claims(
        &self,
        user_id: UserId,
        email: Option<&str>,
        role: Option<Role>,
        kind: TokenKind,
    ) -> Result<Claims, TokenError> {
        let now = self.clock.now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing("token expiry out of range".to_string()))?;

        Ok(Claims {
            user_id: user_id.value(),
            email: email.map(str::to_string),
            role,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: kind,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn issue_access_token(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
    ) -> Result<String, TokenError> {
        self.sign(&self.claims(user_id, Some(email), Some(role), TokenKind::Access)?)
    }

    pub fn issue_refresh_token(&self, user_id: UserId) -> Result<String, TokenError> {
        self.sign(&self.claims(user_id, None, None, TokenKind::Refresh)?)
    }

    pub fn issue_pair(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, email, role)?,
            refresh_token: self.issue_refresh_token(user_id)?,
        })
    }

    /// Checks signature, issuer, audience and expiry, in that order.
    ///
    /// A correctly signed token past its `exp` always yields
    /// [`TokenError::Expired`].
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        if self.clock.now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Refresh)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.typ != kind {
            return Err(TokenError::Malformed);
        }
        Ok(claims)
    }
}

/// Parses a lifetime such as `"7d"`, `"12h"`, `"15m"`, `"900s"` or `"900"`.
pub fn parse_ttl(input: &str) -> anyhow::Result<Duration> {
    let trimmed = input.trim();
    let (digits, unit) = match trimmed.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&trimmed[..trimmed.len() - 1], c),
        Some(_) => (trimmed, 's'),
        None => bail!("Empty duration"),
    };

    let value: i64 = digits
        .parse()
        .with_context(|| format!("Invalid duration: {input}"))?;
    if value <= 0 {
        bail!("Duration must be positive: {input}");
    }

    let multiplier = match unit.to_ascii_lowercase() {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        other => bail!("Unknown duration unit '{other}' in {input}"),
    };

    value
        .checked_mul(multiplier)
        .and_then(Duration::try_seconds)
        .with_context(|| format!("Duration out of range: {input}"))
}

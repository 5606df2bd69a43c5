use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::JwtConfig,
    dto::auth::Claims,
    error::{AppError, AppResult},
    models::Role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn secret<'a>(&self, jwt: &'a JwtConfig) -> &'a str {
        match self {
            TokenKind::Access => &jwt.access_secret,
            TokenKind::Refresh => &jwt.refresh_secret,
        }
    }

    fn ttl(&self, jwt: &JwtConfig) -> Duration {
        match self {
            TokenKind::Access => Duration::minutes(jwt.access_ttl_minutes),
            TokenKind::Refresh => Duration::days(jwt.refresh_ttl_days),
        }
    }
}

pub struct IssuedToken {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub fn issue_token(
    jwt: &JwtConfig,
    user_id: Uuid,
    role: Role,
    kind: TokenKind,
) -> AppResult<IssuedToken> {
    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(kind.ttl(jwt))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        typ: kind.as_str().to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(kind.secret(jwt).as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(IssuedToken { token, expires_at })
}

pub fn decode_token(jwt: &JwtConfig, token: &str, kind: TokenKind) -> AppResult<Claims> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(kind.secret(jwt).as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    if decoded.claims.typ != kind.as_str() {
        return Err(AppError::Unauthorized("Wrong token type".into()));
    }
    Ok(decoded.claims)
}

/// Refresh tokens are stored hashed; the raw token only lives on the client.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl Claims {
    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))
    }

    pub fn role(&self) -> AppResult<Role> {
        self.role
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid role in token".into()))
    }
}

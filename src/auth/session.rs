use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::claims::Claims;
use super::password;
use super::revocation::RevocationList;
use super::tokens::TokenCodec;
use crate::db::models::User;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// A freshly issued session token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: String,
    #[serde(skip)]
    pub claims: Claims,
}

/// The identity behind a token that passed validation.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub admin: bool,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates and revokes session tokens.
pub struct SessionManager {
    codec: TokenCodec,
    revocations: Arc<dyn RevocationList>,
    ttl_minutes: i64,
    // Verified against when the username is unknown so both failure paths cost the same
    dummy_hash: String,
}

impl SessionManager {
    pub fn new(
        secret: &str,
        ttl_minutes: i64,
        bcrypt_cost: u32,
        revocations: Arc<dyn RevocationList>,
    ) -> AppResult<Self> {
        let dummy_hash = bcrypt::hash("alchemax-dummy-password", bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("Failed to prepare dummy hash: {}", e)))?;
        Ok(Self {
            codec: TokenCodec::new(secret),
            revocations,
            ttl_minutes,
            dummy_hash,
        })
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// Check credentials and issue a token. Unknown users and wrong passwords
    /// fail identically.
    pub async fn login(&self, pool: &DbPool, username: &str, password: &str) -> AppResult<IssuedToken> {
        let user = {
            let conn = pool.get()?;
            users::find_by_username(&conn, username)?
        };

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let matched = password::verify(password.to_string(), hash).await?;

        match user {
            Some(user) if matched => self.issue_at(&user, Utc::now()),
            _ => {
                tracing::warn!(username = %username, "Login failed");
                Err(AppError::Authentication)
            }
        }
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> AppResult<IssuedToken> {
        let claims = Claims::new(
            &user.id,
            &user.username,
            user.is_admin,
            now.timestamp(),
            self.ttl_minutes,
        );
        let token = self.codec.encode(&claims)?;
        Ok(IssuedToken {
            token,
            user_id: user.id.clone(),
            claims,
        })
    }

    /// Validate a presented token: revocation first, then signature and
    /// expiry, then the subject.
    pub async fn validate(&self, token: Option<&str>) -> AppResult<Session> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::InvalidToken("Token is missing".into()))?;

        if self.revocations.is_revoked(token).await? {
            return Err(AppError::RevokedToken);
        }

        let claims = self.codec.decode(token)?;

        let user_id = claims.subject().ok_or(AppError::MalformedToken)?.to_string();
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AppError::InvalidToken("Token is invalid".into()))?;

        Ok(Session {
            user_id,
            username: claims.user,
            admin: claims.admin,
            token: token.to_string(),
            expires_at,
        })
    }

    pub async fn logout(&self, session: &Session) -> AppResult<()> {
        self.revocations
            .revoke(&session.token, session.expires_at)
            .await?;
        tracing::info!(username = %session.username, "Session revoked");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}

/// Decode an HTTP Basic `Authorization` header into username and password.
pub fn parse_basic(header: Option<&str>) -> AppResult<(String, String)> {
    let missing = || AppError::Validation("Missing or malformed login credentials".into());

    let encoded = header
        .and_then(|h| h.strip_prefix("Basic ").or_else(|| h.strip_prefix("basic ")))
        .ok_or_else(missing)?;
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| missing())?;
    let decoded = String::from_utf8(decoded).map_err(|_| missing())?;
    let (username, password) = decoded.split_once(':').ok_or_else(missing)?;

    if username.is_empty() {
        return Err(missing());
    }
    Ok((username.to_string(), password.to_string()))
}

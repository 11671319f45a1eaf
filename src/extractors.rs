use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};

use crate::auth::Session;
use crate::db;
use crate::error::AppError;
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "x-access-token";

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for CurrentUser {
    fn from(session: Session) -> Self {
        Self {
            id: session.user_id,
            username: session.username,
            is_admin: session.admin,
            token: session.token,
            expires_at: session.expires_at,
        }
    }
}

impl CurrentUser {
    pub fn session(&self) -> Session {
        Session {
            user_id: self.id.clone(),
            username: self.username.clone(),
            admin: self.is_admin,
            token: self.token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Extractor that requires a valid session token.
/// Returns 401 if the token is missing, invalid or revoked, has no subject,
/// or names an account that has since been deleted.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());

        let session = state.sessions.validate(token).await.inspect_err(|e| {
            tracing::info!("Rejected session token: {}", e);
        })?;

        // Tokens outlive accounts deleted by an admin
        let conn = state.db.get()?;
        if db::users::find_by_id(&conn, &session.user_id)?.is_none() {
            tracing::info!(username = %session.username, "Token for a deleted account");
            return Err(AppError::InvalidToken("Account no longer exists".into()));
        }
        drop(conn);

        tracing::Span::current().record("user", session.username.as_str());
        let user = CurrentUser::from(session);
        parts.extensions.insert(user.clone());

        Ok(user)
    }
}

/// An authenticated user whose token carries the admin flag.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(username = %user.username, "Admin access denied");
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        Ok(AdminUser(user))
    }
}

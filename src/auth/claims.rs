//! Payload carried inside a session token.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Database id of the account. Tokens without one are rejected as malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_db_id: Option<String>,
    /// Username at issue time.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub admin: bool,
    /// Issued-at, UTC seconds.
    pub iat: i64,
    /// Expiry, UTC seconds.
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: &str, username: &str, admin: bool, iat: i64, ttl_minutes: i64) -> Self {
        Self {
            user_db_id: Some(user_id.to_string()),
            user: username.to_string(),
            admin,
            iat,
            exp: iat + ttl_minutes * 60,
        }
    }

    /// The subject id, if present and non-empty.
    pub fn subject(&self) -> Option<&str> {
        self.user_db_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_ttl_after_issue() {
        let claims = Claims::new("id", "alice", false, 1_000, 60);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn empty_subject_is_treated_as_missing() {
        let mut claims = Claims::new("", "alice", false, 0, 1);
        assert!(claims.subject().is_none());
        claims.user_db_id = None;
        assert!(claims.subject().is_none());
    }

    #[test]
    fn missing_user_db_id_deserializes() {
        let claims: Claims =
            serde_json::from_str(r#"{"user":"alice","admin":false,"iat":1,"exp":2}"#).unwrap();
        assert!(claims.user_db_id.is_none());
    }
}

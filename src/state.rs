use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::{RevocationList, SessionManager};
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub sessions: Arc<SessionManager>,
    pub revocations: Arc<dyn RevocationList>,
}

impl AppState {
    /// Wire up the session layer on top of an already migrated pool.
    pub fn new(db: DbPool, config: Config, secret: &str) -> crate::error::AppResult<Self> {
        let revocations: Arc<dyn RevocationList> =
            Arc::new(crate::auth::SqliteRevocationList::new(db.clone()));
        let sessions = SessionManager::new(
            secret,
            config.auth.token_ttl_minutes,
            config.auth.bcrypt_cost,
            revocations.clone(),
        )?;

        Ok(Self {
            db,
            config,
            sessions: Arc::new(sessions),
            revocations,
        })
    }
}

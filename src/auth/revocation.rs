// Revoked session tokens, kept until their own expiry passes
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::state::DbPool;

#[async_trait]
pub trait RevocationList: Send + Sync {
    /// Revoke a token until `expires_at`. Revoking twice is a no-op.
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> AppResult<()>;

    async fn is_revoked(&self, token: &str) -> AppResult<bool>;

    /// Drop entries whose expiry is at or before `now` (returns count deleted)
    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

pub struct SqliteRevocationList {
    pool: DbPool,
}

impl SqliteRevocationList {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationList for SqliteRevocationList {
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT OR IGNORE INTO revoked_tokens (token, expires_at) VALUES (?1, ?2)",
            params![token, expires_at.timestamp()],
        )?;
        conn.execute(
            "DELETE FROM revoked_tokens WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;

        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;

        let revoked: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM revoked_tokens WHERE token = ?1",
            params![token],
            |row| row.get(0),
        )?;

        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let conn = self.pool.get()?;

        let deleted = conn.execute(
            "DELETE FROM revoked_tokens WHERE expires_at <= ?1",
            params![now.timestamp()],
        )?;

        Ok(deleted)
    }
}

/// Periodically evict expired entries for the life of the process.
pub fn spawn_sweep(list: Arc<dyn RevocationList>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match list.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Evicted {} expired revoked tokens", n),
                Err(e) => tracing::warn!("Revocation sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_pool;
    use chrono::Duration;

    fn count(pool: &DbPool) -> i64 {
        pool.get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM revoked_tokens", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn revoked_token_is_reported() {
        let pool = migrated_pool();
        let list = SqliteRevocationList::new(pool.clone());

        assert!(!list.is_revoked("tok").await.unwrap());
        list.revoke("tok", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert!(list.is_revoked("tok").await.unwrap());
    }

    #[tokio::test]
    async fn revoking_twice_is_idempotent() {
        let pool = migrated_pool();
        let list = SqliteRevocationList::new(pool.clone());
        let exp = Utc::now() + Duration::minutes(5);

        list.revoke("tok", exp).await.unwrap();
        list.revoke("tok", exp).await.unwrap();
        assert_eq!(count(&pool), 1);
    }

    #[tokio::test]
    async fn purge_evicts_only_expired_entries() {
        let pool = migrated_pool();
        let list = SqliteRevocationList::new(pool.clone());
        let now = Utc::now();

        list.revoke("live", now + Duration::minutes(5)).await.unwrap();
        // Inserted directly, revoke() would evict it immediately
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO revoked_tokens (token, expires_at) VALUES ('stale', ?1)",
                params![(now - Duration::minutes(1)).timestamp()],
            )
            .unwrap();

        assert_eq!(list.purge_expired(now).await.unwrap(), 1);
        assert!(list.is_revoked("live").await.unwrap());
        assert!(!list.is_revoked("stale").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_evicts_stale_entries() {
        let pool = migrated_pool();
        let list = SqliteRevocationList::new(pool.clone());
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO revoked_tokens (token, expires_at) VALUES ('stale', 0)",
                [],
            )
            .unwrap();

        list.revoke("fresh", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(count(&pool), 1);
    }

    #[tokio::test]
    async fn sweep_runs_in_background() {
        let pool = migrated_pool();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO revoked_tokens (token, expires_at) VALUES ('stale', 0)",
                [],
            )
            .unwrap();

        let list: Arc<dyn RevocationList> = Arc::new(SqliteRevocationList::new(pool.clone()));
        let handle = spawn_sweep(list, std::time::Duration::from_millis(10));

        let mut remaining = 1;
        for _ in 0..50 {
            remaining = count(&pool);
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(remaining, 0);
    }
}

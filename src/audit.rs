// Audit trail of account and group activity. Writes are fire-and-forget.
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::timestamp;
use crate::error::AppResult;
use crate::state::DbPool;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: &'static str,
    pub account: String,
    pub message: String,
}

impl AuditEntry {
    pub fn new(action: &'static str, account: &str, message: impl Into<String>) -> Self {
        Self {
            action,
            account: account.to_string(),
            message: message.into(),
        }
    }
}

pub fn write(conn: &Connection, entry: &AuditEntry) -> AppResult<()> {
    conn.execute(
        "INSERT INTO audit_log (occurred_at, action, account, message) VALUES (?1, ?2, ?3, ?4)",
        params![
            timestamp(Utc::now()),
            entry.action,
            entry.account,
            entry.message
        ],
    )?;
    Ok(())
}

/// Queue an audit row on the blocking pool. Failures are logged and dropped.
pub fn record(pool: &DbPool, entry: AuditEntry) {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let result = pool
            .get()
            .map_err(Into::into)
            .and_then(|conn| write(&conn, &entry));
        if let Err(e) = result {
            tracing::warn!(action = entry.action, "Failed to write audit entry: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_pool;

    #[test]
    fn write_appends_row() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        write(&conn, &AuditEntry::new("Login", "alice", "Login successful")).unwrap();

        let (action, account): (String, String) = conn
            .query_row("SELECT action, account FROM audit_log", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(action, "Login");
        assert_eq!(account, "alice");
    }

    #[tokio::test]
    async fn record_eventually_writes() {
        let pool = migrated_pool();
        record(&pool, AuditEntry::new("Logout", "bob", "Logout successful"));

        let mut rows = 0;
        for _ in 0..50 {
            rows = pool
                .get()
                .unwrap()
                .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get::<_, i64>(0))
                .unwrap();
            if rows == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(rows, 1);
    }
}

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::User;
use crate::db::{groups, new_id, posts, timestamp};
use crate::error::{AppError, AppResult};

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
    pub is_admin: bool,
}

/// Row counts removed by a cascading user deletion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeletionReport {
    pub groups: usize,
    pub posts: usize,
    pub comments: usize,
}

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_admin, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: row.get(5)?,
        is_admin: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Insert a new account. Username and email must both be unused.
pub fn insert(conn: &mut Connection, user: &NewUser<'_>) -> AppResult<String> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let username_taken: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![user.username],
        |row| row.get(0),
    )?;
    if username_taken {
        return Err(AppError::Conflict("username already taken".into()));
    }

    let email_taken: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![user.email],
        |row| row.get(0),
    )?;
    if email_taken {
        return Err(AppError::Conflict("Email already in use".into()));
    }

    let id = new_id();
    tx.execute(
        "INSERT INTO users (id, username, email, first_name, last_name, password_hash, is_admin, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            user.username,
            user.email,
            user.first_name,
            user.last_name,
            user.password_hash,
            user.is_admin,
            timestamp(Utc::now())
        ],
    )?;
    tx.commit()?;

    Ok(id)
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn set_admin(conn: &Connection, id: &str, is_admin: bool) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE users SET is_admin = ?1 WHERE id = ?2",
        params![is_admin, id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound("Can not find the user".into()));
    }
    Ok(())
}

pub fn update_password_hash(conn: &Connection, id: &str, password_hash: &str) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound("Can not find the user".into()));
    }
    Ok(())
}

/// Delete a user and everything that references them, children before parents,
/// inside one transaction: owned groups (with their posts), posts authored
/// elsewhere, comments authored elsewhere, then the user's own rows.
pub fn delete_cascade(conn: &mut Connection, user_id: &str) -> AppResult<DeletionReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound("Can not find the user".into()));
    }

    let mut report = DeletionReport::default();

    let owned: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT group_id FROM memberships WHERE user_id = ?1 AND role = 'owner'",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        ids
    };
    for group_id in &owned {
        let purged = groups::purge(&tx, group_id)?;
        report.groups += 1;
        report.posts += purged.posts;
        report.comments += purged.comments;
    }

    let authored: Vec<String> = {
        let mut stmt = tx.prepare("SELECT id FROM posts WHERE creator_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        ids
    };
    for post_id in &authored {
        report.comments += posts::purge(&tx, post_id)?;
        report.posts += 1;
    }

    report.comments += tx.execute("DELETE FROM comments WHERE user_id = ?1", params![user_id])?;
    tx.execute(
        "DELETE FROM event_attendees WHERE user_id = ?1",
        params![user_id],
    )?;
    tx.execute(
        "DELETE FROM join_requests WHERE user_id = ?1",
        params![user_id],
    )?;
    tx.execute("DELETE FROM memberships WHERE user_id = ?1", params![user_id])?;
    tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;

    tx.commit()?;
    Ok(report)
}

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::Post;
use crate::db::{new_id, timestamp};
use crate::error::{AppError, AppResult};

/// Format accepted from clients for event dates.
pub const EVENT_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Format event dates are stored and returned in.
pub const EVENT_STORED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct PostFields<'a> {
    pub title: &'a str,
    pub message: &'a str,
    pub event_date: Option<NaiveDateTime>,
}

pub fn parse_event_date(raw: &str) -> AppResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), EVENT_INPUT_FORMAT).map_err(|_| {
        AppError::Validation("Date format is incorrect, please try again".into())
    })
}

fn format_event_date(date: &NaiveDateTime) -> String {
    date.format(EVENT_STORED_FORMAT).to_string()
}

const POST_SELECT: &str = "SELECT p.id, p.group_id, g.name, p.creator_id, u.username, p.title, p.message,
            p.is_event, p.event_date, p.date_posted, p.edited_at
     FROM posts p
     LEFT JOIN groups g ON g.id = p.group_id
     LEFT JOIN users u ON u.id = p.creator_id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        group_id: row.get(1)?,
        group_name: row.get(2)?,
        creator: row.get(3)?,
        creator_username: row.get(4)?,
        post_title: row.get(5)?,
        post_message: row.get(6)?,
        event_button: row.get(7)?,
        event_date: row.get(8)?,
        date_posted: row.get(9)?,
        edited_at: row.get(10)?,
    })
}

pub fn insert(
    conn: &Connection,
    group_id: &str,
    creator_id: &str,
    fields: &PostFields<'_>,
) -> AppResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO posts (id, group_id, creator_id, title, message, is_event, event_date, date_posted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            group_id,
            creator_id,
            fields.title,
            fields.message,
            fields.event_date.is_some(),
            fields.event_date.as_ref().map(format_event_date),
            timestamp(Utc::now())
        ],
    )?;
    Ok(id)
}

pub fn find(conn: &Connection, post_id: &str) -> AppResult<Option<Post>> {
    let post = conn
        .query_row(
            &format!("{} WHERE p.id = ?1", POST_SELECT),
            params![post_id],
            post_from_row,
        )
        .optional()?;
    Ok(post)
}

/// Look up a post that must live in the given group.
pub fn require_in_group(conn: &Connection, group_id: &str, post_id: &str) -> AppResult<Post> {
    find(conn, post_id)?
        .filter(|post| post.group_id == group_id)
        .ok_or_else(|| AppError::NotFound("Unable to find the post".into()))
}

pub fn update(conn: &Connection, post_id: &str, fields: &PostFields<'_>) -> AppResult<()> {
    conn.execute(
        "UPDATE posts SET title = ?1, message = ?2, is_event = ?3, event_date = ?4, edited_at = ?5
         WHERE id = ?6",
        params![
            fields.title,
            fields.message,
            fields.event_date.is_some(),
            fields.event_date.as_ref().map(format_event_date),
            timestamp(Utc::now()),
            post_id
        ],
    )?;
    // A post that stops being an event keeps no attendees
    if fields.event_date.is_none() {
        conn.execute(
            "DELETE FROM event_attendees WHERE post_id = ?1",
            params![post_id],
        )?;
    }
    Ok(())
}

/// Remove a post with its attendees and comments inside the caller's
/// transaction. Returns the number of comments removed.
pub fn purge(conn: &Connection, post_id: &str) -> AppResult<usize> {
    conn.execute(
        "DELETE FROM event_attendees WHERE post_id = ?1",
        params![post_id],
    )?;
    let comments = conn.execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
    conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    Ok(comments)
}

pub fn delete(conn: &mut Connection, post_id: &str) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    purge(&tx, post_id)?;
    tx.commit()?;
    Ok(())
}

/// Posts of one group, newest first.
pub fn feed_for_group(conn: &Connection, group_id: &str) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE p.group_id = ?1 ORDER BY p.date_posted DESC, p.id DESC",
        POST_SELECT
    ))?;
    let posts = stmt
        .query_map(params![group_id], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Posts from every group the user owns or belongs to, newest first.
pub fn feed_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE p.group_id IN (SELECT group_id FROM memberships WHERE user_id = ?1)
         ORDER BY p.date_posted DESC, p.id DESC",
        POST_SELECT
    ))?;
    let posts = stmt
        .query_map(params![user_id], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Record an RSVP. A second RSVP from the same user is a conflict.
pub fn add_attendee(conn: &Connection, post_id: &str, user_id: &str) -> AppResult<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO event_attendees (post_id, user_id, rsvp_at) VALUES (?1, ?2, ?3)",
        params![post_id, user_id, timestamp(Utc::now())],
    )?;
    if inserted == 0 {
        return Err(AppError::Conflict(
            "User has already RSVP'd to this event".into(),
        ));
    }
    Ok(())
}

/// Usernames attending an event, in RSVP order.
pub fn attendee_usernames(conn: &Connection, post_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT u.username FROM event_attendees a
         JOIN users u ON u.id = a.user_id
         WHERE a.post_id = ?1
         ORDER BY a.rsvp_at, u.username",
    )?;
    let names = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Events the user RSVP'd to happening at or after `from`, soonest first.
pub fn calendar_for_user(
    conn: &Connection,
    user_id: &str,
    from: NaiveDateTime,
) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{} JOIN event_attendees a ON a.post_id = p.id
         WHERE a.user_id = ?1 AND p.is_event = 1 AND p.event_date >= ?2
         ORDER BY p.event_date ASC, p.id",
        POST_SELECT
    ))?;
    let posts = stmt
        .query_map(params![user_id, format_event_date(&from)], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

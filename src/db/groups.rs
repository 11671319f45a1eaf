use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{Group, GroupAccess, GroupSummary};
use crate::db::{new_id, posts, timestamp};
use crate::error::{AppError, AppResult};

pub struct GroupFields<'a> {
    pub name: &'a str,
    pub category: &'a str,
    pub description: &'a str,
    pub location: Option<&'a str>,
    pub access: GroupAccess,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub posts: usize,
    pub comments: usize,
}

/// One page of a search, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub const MAX_SIZE: u32 = 100;

    pub fn new(number: Option<u32>, size: Option<u32>) -> AppResult<Self> {
        let number = number.unwrap_or(1);
        let size = size.unwrap_or(10);
        if number == 0 {
            return Err(AppError::Validation("Page number must be at least 1".into()));
        }
        if size == 0 || size > Self::MAX_SIZE {
            return Err(AppError::Validation(format!(
                "Page size must be between 1 and {}",
                Self::MAX_SIZE
            )));
        }
        Ok(Self { number, size })
    }

    fn offset(&self) -> i64 {
        i64::from(self.size) * i64::from(self.number - 1)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SearchField {
    Name,
    Category,
}

const GROUP_SELECT: &str = "SELECT g.id, g.name, g.category, g.description, g.location, g.access, m.user_id, g.created_at
     FROM groups g
     JOIN memberships m ON m.group_id = g.id AND m.role = 'owner'";

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    let access: String = row.get(5)?;
    let group_access = access.parse::<GroupAccess>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;
    Ok(Group {
        id: row.get(0)?,
        group_name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        group_access,
        group_owner: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Create a group together with its owner row.
pub fn insert(conn: &mut Connection, owner_id: &str, fields: &GroupFields<'_>) -> AppResult<String> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = new_id();
    let now = timestamp(Utc::now());

    tx.execute(
        "INSERT INTO groups (id, name, category, description, location, access, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            fields.name,
            fields.category,
            fields.description,
            fields.location,
            fields.access.as_str(),
            now
        ],
    )?;
    tx.execute(
        "INSERT INTO memberships (group_id, user_id, role, joined_at) VALUES (?1, ?2, 'owner', ?3)",
        params![id, owner_id, now],
    )?;

    tx.commit()?;
    Ok(id)
}

pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Group>> {
    let group = conn
        .query_row(
            &format!("{} WHERE g.id = ?1", GROUP_SELECT),
            params![id],
            group_from_row,
        )
        .optional()?;
    Ok(group)
}

pub fn require(conn: &Connection, id: &str) -> AppResult<Group> {
    find(conn, id)?.ok_or_else(|| AppError::NotFound("Unable to find the group".into()))
}

pub fn update(conn: &Connection, id: &str, fields: &GroupFields<'_>) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE groups SET name = ?1, category = ?2, description = ?3, location = ?4, access = ?5
         WHERE id = ?6",
        params![
            fields.name,
            fields.category,
            fields.description,
            fields.location,
            fields.access.as_str(),
            id
        ],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound("Unable to find the group".into()));
    }
    Ok(())
}

/// Remove a group and every row hanging off it. Runs inside the caller's
/// transaction; children are removed before parents.
pub fn purge(conn: &Connection, group_id: &str) -> AppResult<PurgeReport> {
    let post_ids: Vec<String> = {
        let mut stmt = conn.prepare("SELECT id FROM posts WHERE group_id = ?1")?;
        let ids = stmt
            .query_map(params![group_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        ids
    };

    let mut report = PurgeReport::default();
    for post_id in &post_ids {
        report.comments += posts::purge(conn, post_id)?;
        report.posts += 1;
    }

    conn.execute(
        "DELETE FROM join_requests WHERE group_id = ?1",
        params![group_id],
    )?;
    conn.execute(
        "DELETE FROM memberships WHERE group_id = ?1",
        params![group_id],
    )?;
    conn.execute("DELETE FROM groups WHERE id = ?1", params![group_id])?;

    Ok(report)
}

pub fn delete(conn: &mut Connection, group_id: &str) -> AppResult<PurgeReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let report = purge(&tx, group_id)?;
    tx.commit()?;
    Ok(report)
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Case-insensitive substring search over group names or categories.
pub fn search(
    conn: &Connection,
    field: SearchField,
    term: &str,
    page: Page,
) -> AppResult<Vec<Group>> {
    let column = match field {
        SearchField::Name => "g.name",
        SearchField::Category => "g.category",
    };
    let sql = format!(
        "{} WHERE {} LIKE ?1 ESCAPE '\\' ORDER BY g.name COLLATE NOCASE, g.id LIMIT ?2 OFFSET ?3",
        GROUP_SELECT, column
    );
    let mut stmt = conn.prepare(&sql)?;
    let groups = stmt
        .query_map(
            params![like_pattern(term), i64::from(page.size), page.offset()],
            group_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

/// Groups a user belongs to, split into joined (member) and owned.
pub fn for_user(conn: &Connection, user_id: &str) -> AppResult<(Vec<GroupSummary>, Vec<GroupSummary>)> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.name, m.role FROM memberships m
         JOIN groups g ON g.id = m.group_id
         WHERE m.user_id = ?1
         ORDER BY m.joined_at",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                GroupSummary {
                    id: row.get(0)?,
                    group_name: row.get(1)?,
                },
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let (owned, joined): (Vec<_>, Vec<_>) = rows.into_iter().partition(|(_, role)| role == "owner");
    Ok((
        joined.into_iter().map(|(g, _)| g).collect(),
        owned.into_iter().map(|(g, _)| g).collect(),
    ))
}

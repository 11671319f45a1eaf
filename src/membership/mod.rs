//! Group membership authority.
//!
//! Membership lives in a single `memberships` table. Every mutation that
//! touches more than one row runs in one immediate transaction.

pub mod protocol;

pub use protocol::{accept, join, leave, list_requests, reject, transfer_ownership, JoinOutcome};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Member,
    Outsider,
}

impl Role {
    pub fn is_member(self) -> bool {
        matches!(self, Role::Owner | Role::Member)
    }
}

fn group_exists(conn: &Connection, group_id: &str) -> AppResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM groups WHERE id = ?1",
        params![group_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// The user's standing in a group. A missing group is `NotFound`.
pub fn role(conn: &Connection, group_id: &str, user_id: &str) -> AppResult<Role> {
    if !group_exists(conn, group_id)? {
        return Err(AppError::NotFound("Unable to find the group".into()));
    }

    let stored: Option<String> = conn
        .query_row(
            "SELECT role FROM memberships WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match stored.as_deref() {
        Some("owner") => Role::Owner,
        Some(_) => Role::Member,
        None => Role::Outsider,
    })
}

pub fn require_member(conn: &Connection, group_id: &str, user_id: &str) -> AppResult<Role> {
    let role = role(conn, group_id, user_id)?;
    if !role.is_member() {
        tracing::warn!(group_id, user_id, "Denied non-member access");
        return Err(AppError::Forbidden(
            "You must be a member of this group".into(),
        ));
    }
    Ok(role)
}

pub fn require_owner(conn: &Connection, group_id: &str, user_id: &str) -> AppResult<()> {
    if role(conn, group_id, user_id)? != Role::Owner {
        tracing::warn!(group_id, user_id, "Denied non-owner access");
        return Err(AppError::Forbidden(
            "Only the group owner can do that".into(),
        ));
    }
    Ok(())
}

use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};

use super::{require_owner, role, Role};
use crate::db::models::{GroupAccess, JoinRequest};
use crate::db::timestamp;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Public group: the user is now a member.
    Joined,
    /// Private group: a request is waiting for the owner.
    Requested,
}

fn group_access(conn: &Connection, group_id: &str) -> AppResult<GroupAccess> {
    let access: String = conn.query_row(
        "SELECT access FROM groups WHERE id = ?1",
        params![group_id],
        |row| row.get(0),
    )?;
    access.parse().map_err(AppError::Internal)
}

fn has_request(conn: &Connection, group_id: &str, user_id: &str) -> AppResult<bool> {
    let pending: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM join_requests WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, user_id],
        |row| row.get(0),
    )?;
    Ok(pending)
}

/// Join a public group or ask to join a private one.
pub fn join(conn: &mut Connection, group_id: &str, user_id: &str) -> AppResult<JoinOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if role(&tx, group_id, user_id)?.is_member() {
        return Err(AppError::Conflict(
            "User is already a member of this group".into(),
        ));
    }

    let now = timestamp(Utc::now());
    let outcome = match group_access(&tx, group_id)? {
        GroupAccess::Public => {
            // A request left over from when the group was private
            tx.execute(
                "DELETE FROM join_requests WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
            )?;
            tx.execute(
                "INSERT INTO memberships (group_id, user_id, role, joined_at) VALUES (?1, ?2, 'member', ?3)",
                params![group_id, user_id, now],
            )?;
            JoinOutcome::Joined
        }
        GroupAccess::Private => {
            if has_request(&tx, group_id, user_id)? {
                return Err(AppError::Conflict(
                    "User has already sent a join request".into(),
                ));
            }
            tx.execute(
                "INSERT INTO join_requests (group_id, user_id, requested_at) VALUES (?1, ?2, ?3)",
                params![group_id, user_id, now],
            )?;
            JoinOutcome::Requested
        }
    };

    tx.commit()?;
    tracing::info!(group_id, user_id, ?outcome, "Join processed");
    Ok(outcome)
}

/// Pending requests for a group, oldest first. Owner only.
pub fn list_requests(conn: &Connection, group_id: &str, owner_id: &str) -> AppResult<Vec<JoinRequest>> {
    require_owner(conn, group_id, owner_id)?;

    let mut stmt = conn.prepare(
        "SELECT r.user_id, u.username FROM join_requests r
         JOIN users u ON u.id = r.user_id
         WHERE r.group_id = ?1
         ORDER BY r.requested_at, r.user_id",
    )?;
    let requests = stmt
        .query_map(params![group_id], |row| {
            Ok(JoinRequest {
                user_id: row.get(0)?,
                username: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(requests)
}

fn take_request(conn: &Connection, group_id: &str, requester_id: &str) -> AppResult<()> {
    let removed = conn.execute(
        "DELETE FROM join_requests WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, requester_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound("Can not find user request".into()));
    }
    Ok(())
}

/// Turn a pending request into a membership.
pub fn accept(
    conn: &mut Connection,
    group_id: &str,
    owner_id: &str,
    requester_id: &str,
) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_owner(&tx, group_id, owner_id)?;
    take_request(&tx, group_id, requester_id)?;
    if role(&tx, group_id, requester_id)?.is_member() {
        tx.commit()?;
        return Err(AppError::Conflict(
            "User is already a member of this group".into(),
        ));
    }
    tx.execute(
        "INSERT INTO memberships (group_id, user_id, role, joined_at) VALUES (?1, ?2, 'member', ?3)",
        params![group_id, requester_id, timestamp(Utc::now())],
    )?;

    tx.commit()?;
    tracing::info!(group_id, requester_id, "Join request accepted");
    Ok(())
}

pub fn reject(
    conn: &mut Connection,
    group_id: &str,
    owner_id: &str,
    requester_id: &str,
) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_owner(&tx, group_id, owner_id)?;
    take_request(&tx, group_id, requester_id)?;

    tx.commit()?;
    tracing::info!(group_id, requester_id, "Join request rejected");
    Ok(())
}

/// Leave a group. Owners must transfer ownership or delete the group instead.
pub fn leave(conn: &mut Connection, group_id: &str, user_id: &str) -> AppResult<()> {
    match role(conn, group_id, user_id)? {
        Role::Owner => Err(AppError::Validation(
            "The group owner can not leave; transfer ownership or delete the group".into(),
        )),
        Role::Outsider => Err(AppError::NotFound(
            "User is not a member of this group".into(),
        )),
        Role::Member => {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM event_attendees WHERE user_id = ?1
                 AND post_id IN (SELECT id FROM posts WHERE group_id = ?2)",
                params![user_id, group_id],
            )?;
            tx.execute(
                "DELETE FROM memberships WHERE group_id = ?1 AND user_id = ?2 AND role = 'member'",
                params![group_id, user_id],
            )?;
            tx.commit()?;
            Ok(())
        }
    }
}

/// Hand a group to one of its members. The old owner stays on as a member.
pub fn transfer_ownership(
    conn: &mut Connection,
    group_id: &str,
    owner_id: &str,
    new_owner_id: &str,
) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    require_owner(&tx, group_id, owner_id)?;
    if role(&tx, group_id, new_owner_id)? != Role::Member {
        return Err(AppError::Validation(
            "The new owner must be a member of the group".into(),
        ));
    }

    // Demote first: the one-owner index is checked per statement
    tx.execute(
        "UPDATE memberships SET role = 'member' WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, owner_id],
    )?;
    tx.execute(
        "UPDATE memberships SET role = 'owner' WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, new_owner_id],
    )?;

    tx.commit()?;
    tracing::info!(group_id, owner_id, new_owner_id, "Ownership transferred");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::groups::{self, GroupFields};
    use crate::db::posts::{self, PostFields};
    use crate::db::test_support::{insert_user, migrated_pool};

    fn group(conn: &mut Connection, owner: &str, access: GroupAccess) -> String {
        groups::insert(
            conn,
            owner,
            &GroupFields {
                name: "Hikers",
                category: "outdoors",
                description: "Hills",
                location: Some("Mournes"),
                access,
            },
        )
        .unwrap()
    }

    fn count(conn: &Connection, table: &str, group_id: &str) -> i64 {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE group_id = ?1", table),
            params![group_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn joining_public_group_twice_conflicts() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Public);

        assert_eq!(join(&mut conn, &g, &user).unwrap(), JoinOutcome::Joined);
        assert!(matches!(
            join(&mut conn, &g, &user),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(count(&conn, "memberships", &g), 2);
    }

    #[test]
    fn owner_joining_own_group_conflicts() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let g = group(&mut conn, &owner, GroupAccess::Private);

        assert!(matches!(
            join(&mut conn, &g, &owner),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(count(&conn, "join_requests", &g), 0);
    }

    #[test]
    fn requesting_private_group_twice_conflicts() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Private);

        assert_eq!(join(&mut conn, &g, &user).unwrap(), JoinOutcome::Requested);
        assert!(matches!(
            join(&mut conn, &g, &user),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(count(&conn, "join_requests", &g), 1);
        assert_eq!(role(&conn, &g, &user).unwrap(), Role::Outsider);
    }

    #[test]
    fn accept_moves_request_into_membership() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Private);
        join(&mut conn, &g, &user).unwrap();

        accept(&mut conn, &g, &owner, &user).unwrap();
        assert_eq!(count(&conn, "join_requests", &g), 0);
        assert_eq!(count(&conn, "memberships", &g), 2);
        assert_eq!(role(&conn, &g, &user).unwrap(), Role::Member);

        assert!(matches!(
            accept(&mut conn, &g, &owner, &user),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn reject_only_removes_request() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Private);
        join(&mut conn, &g, &user).unwrap();

        reject(&mut conn, &g, &owner, &user).unwrap();
        assert_eq!(count(&conn, "join_requests", &g), 0);
        assert_eq!(count(&conn, "memberships", &g), 1);
    }

    #[test]
    fn only_owner_handles_requests() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Private);
        join(&mut conn, &g, &user).unwrap();

        assert!(matches!(
            accept(&mut conn, &g, &user, &user),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            list_requests(&conn, &g, &user),
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(count(&conn, "join_requests", &g), 1);
    }

    #[test]
    fn request_accept_scenario() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let a = insert_user(&conn, "a");
        let b = insert_user(&conn, "b");
        let g = group(&mut conn, &a, GroupAccess::Private);

        join(&mut conn, &g, &b).unwrap();
        let pending = list_requests(&conn, &g, &a).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].username, "b");

        accept(&mut conn, &g, &a, &b).unwrap();
        let (joined, _) = groups::for_user(&conn, &b).unwrap();
        assert!(joined.iter().any(|s| s.id == g));
        assert!(list_requests(&conn, &g, &a).unwrap().is_empty());
    }

    #[test]
    fn leave_rules() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Public);

        assert!(matches!(
            leave(&mut conn, &g, &user),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            leave(&mut conn, &g, &owner),
            Err(AppError::Validation(_))
        ));

        join(&mut conn, &g, &user).unwrap();
        leave(&mut conn, &g, &user).unwrap();
        assert_eq!(role(&conn, &g, &user).unwrap(), Role::Outsider);
    }

    #[test]
    fn transfer_keeps_exactly_one_owner() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let stranger = insert_user(&conn, "stranger");
        let g = group(&mut conn, &owner, GroupAccess::Public);
        join(&mut conn, &g, &user).unwrap();

        assert!(matches!(
            transfer_ownership(&mut conn, &g, &owner, &stranger),
            Err(AppError::Validation(_))
        ));

        transfer_ownership(&mut conn, &g, &owner, &user).unwrap();
        assert_eq!(role(&conn, &g, &user).unwrap(), Role::Owner);
        assert_eq!(role(&conn, &g, &owner).unwrap(), Role::Member);
        let owners: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memberships WHERE group_id = ?1 AND role = 'owner'",
                params![g],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(owners, 1);
        assert_eq!(groups::require(&conn, &g).unwrap().group_owner, user);
    }

    #[test]
    fn request_from_private_days_is_cleared_on_public_join() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Private);
        join(&mut conn, &g, &user).unwrap();

        groups::update(
            &conn,
            &g,
            &GroupFields {
                name: "Hikers",
                category: "outdoors",
                description: "Hills",
                location: Some("Mournes"),
                access: GroupAccess::Public,
            },
        )
        .unwrap();

        assert_eq!(join(&mut conn, &g, &user).unwrap(), JoinOutcome::Joined);
        assert_eq!(count(&conn, "join_requests", &g), 0);
        assert!(list_requests(&conn, &g, &owner).unwrap().is_empty());
        assert!(matches!(
            accept(&mut conn, &g, &owner, &user),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(role(&conn, &g, &user).unwrap(), Role::Member);
    }

    #[test]
    fn accepting_request_of_existing_member_conflicts() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let g = group(&mut conn, &owner, GroupAccess::Public);
        join(&mut conn, &g, &user).unwrap();
        conn.execute(
            "INSERT INTO join_requests (group_id, user_id, requested_at) VALUES (?1, ?2, ?3)",
            params![g, user, timestamp(Utc::now())],
        )
        .unwrap();

        assert!(matches!(
            accept(&mut conn, &g, &owner, &user),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(count(&conn, "join_requests", &g), 0);
        assert_eq!(count(&conn, "memberships", &g), 2);
    }

    #[test]
    fn leaving_drops_rsvps_in_that_group_only() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let owner = insert_user(&conn, "owner");
        let user = insert_user(&conn, "user");
        let left = group(&mut conn, &owner, GroupAccess::Public);
        let kept = group(&mut conn, &owner, GroupAccess::Public);
        join(&mut conn, &left, &user).unwrap();
        join(&mut conn, &kept, &user).unwrap();

        let event = PostFields {
            title: "Walk",
            message: "Bring boots",
            event_date: Some(posts::parse_event_date("2030-05-01 09:30").unwrap()),
        };
        let left_post = posts::insert(&conn, &left, &owner, &event).unwrap();
        let kept_post = posts::insert(&conn, &kept, &owner, &event).unwrap();
        posts::add_attendee(&conn, &left_post, &user).unwrap();
        posts::add_attendee(&conn, &kept_post, &user).unwrap();

        leave(&mut conn, &left, &user).unwrap();

        assert!(posts::attendee_usernames(&conn, &left_post).unwrap().is_empty());
        assert_eq!(
            posts::attendee_usernames(&conn, &kept_post).unwrap(),
            vec!["user".to_string()]
        );
    }
}

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Comment;
use crate::db::{new_id, timestamp};
use crate::error::{AppError, AppResult};

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.username, c.body, c.date_posted, c.last_edited
     FROM comments c
     JOIN users u ON u.id = c.user_id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        comment_text: row.get(4)?,
        date_posted: row.get(5)?,
        last_edited: row.get(6)?,
    })
}

pub fn insert(conn: &Connection, post_id: &str, user_id: &str, text: &str) -> AppResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, body, date_posted) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, user_id, text, timestamp(Utc::now())],
    )?;
    Ok(id)
}

pub fn find(conn: &Connection, comment_id: &str) -> AppResult<Option<Comment>> {
    let comment = conn
        .query_row(
            &format!("{} WHERE c.id = ?1", COMMENT_SELECT),
            params![comment_id],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

/// Look up a comment that must belong to the given post.
pub fn require_on_post(conn: &Connection, post_id: &str, comment_id: &str) -> AppResult<Comment> {
    find(conn, comment_id)?
        .filter(|comment| comment.post_id == post_id)
        .ok_or_else(|| AppError::NotFound("Unable to find the comment".into()))
}

pub fn update(conn: &Connection, comment_id: &str, text: &str) -> AppResult<()> {
    let rows = conn.execute(
        "UPDATE comments SET body = ?1, last_edited = ?2 WHERE id = ?3",
        params![text, timestamp(Utc::now()), comment_id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound("Unable to find the comment".into()));
    }
    Ok(())
}

pub fn delete(conn: &Connection, comment_id: &str) -> AppResult<()> {
    let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    if rows == 0 {
        return Err(AppError::NotFound("Unable to find the comment".into()));
    }
    Ok(())
}

/// Comments on a post, newest first.
pub fn list_for_post(conn: &Connection, post_id: &str) -> AppResult<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.date_posted DESC, c.id DESC",
        COMMENT_SELECT
    ))?;
    let comments = stmt
        .query_map(params![post_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::groups::{self, GroupFields};
    use crate::db::models::GroupAccess;
    use crate::db::posts::{self, PostFields};
    use crate::db::test_support::{insert_user, migrated_pool};

    fn post(conn: &mut Connection) -> (String, String) {
        let user = insert_user(conn, "writer");
        let group = groups::insert(
            conn,
            &user,
            &GroupFields {
                name: "Book club",
                category: "books",
                description: "Reading",
                location: None,
                access: GroupAccess::Private,
            },
        )
        .unwrap();
        let post = posts::insert(
            conn,
            &group,
            &user,
            &PostFields {
                title: "This month",
                message: "Dune",
                event_date: None,
            },
        )
        .unwrap();
        (user, post)
    }

    #[test]
    fn comments_list_newest_first() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let (user, post_id) = post(&mut conn);

        let first = insert(&conn, &post_id, &user, "first").unwrap();
        let second = insert(&conn, &post_id, &user, "second").unwrap();

        let listed = list_for_post(&conn, &post_id).unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(listed[0].username, "writer");
    }

    #[test]
    fn update_sets_last_edited() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let (user, post_id) = post(&mut conn);
        let id = insert(&conn, &post_id, &user, "typo").unwrap();
        assert!(find(&conn, &id).unwrap().unwrap().last_edited.is_none());

        update(&conn, &id, "fixed").unwrap();
        let comment = find(&conn, &id).unwrap().unwrap();
        assert_eq!(comment.comment_text, "fixed");
        assert!(comment.last_edited.is_some());
    }

    #[test]
    fn comment_on_other_post_is_not_found() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let (user, post_id) = post(&mut conn);
        let id = insert(&conn, &post_id, &user, "hello").unwrap();

        assert!(require_on_post(&conn, &post_id, &id).is_ok());
        assert!(matches!(
            require_on_post(&conn, "elsewhere", &id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn delete_missing_comment_is_not_found() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        assert!(matches!(delete(&conn, "nope"), Err(AppError::NotFound(_))));
    }
}

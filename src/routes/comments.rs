use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post, put};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{self, AuditEntry};
use crate::db::models::Comment;
use crate::db::{comments, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::membership;
use crate::routes::required;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CommentForm {
    pub comment_text: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/groups/{group_id}/{post_id}/add_comment",
            post(add_comment),
        )
        .route(
            "/api/groups/{group_id}/{post_id}/{comment_id}/edit",
            put(edit_comment),
        )
        .route(
            "/api/groups/{group_id}/{post_id}/{comment_id}/delete",
            delete(delete_comment),
        )
}

fn own_comment(
    conn: &rusqlite::Connection,
    group_id: &str,
    post_id: &str,
    comment_id: &str,
    user: &CurrentUser,
) -> AppResult<Comment> {
    posts::require_in_group(conn, group_id, post_id)?;
    let comment = comments::require_on_post(conn, post_id, comment_id)?;
    if comment.user_id != user.id {
        return Err(AppError::Forbidden(
            "Only the author of this comment can do that".into(),
        ));
    }
    Ok(comment)
}

async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id)): Path<(String, String)>,
    Form(form): Form<CommentForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let text = required(&form.comment_text)?;
    let conn = state.db.get()?;
    membership::require_member(&conn, &group_id, &user.id)?;
    posts::require_in_group(&conn, &group_id, &post_id)?;
    let id = comments::insert(&conn, &post_id, &user.id, text)?;

    audit::record(
        &state.db,
        AuditEntry::new("Add Comment", &user.username, "Comment added"),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Comment added", "comment_id": id })),
    ))
}

async fn edit_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id, comment_id)): Path<(String, String, String)>,
    Form(form): Form<CommentForm>,
) -> AppResult<Json<Value>> {
    let text = required(&form.comment_text)?;
    let conn = state.db.get()?;
    own_comment(&conn, &group_id, &post_id, &comment_id, &user)?;
    comments::update(&conn, &comment_id, text)?;

    audit::record(
        &state.db,
        AuditEntry::new("Edit Comment", &user.username, "Comment edited"),
    );
    Ok(Json(json!({ "message": "Comment updated" })))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id, comment_id)): Path<(String, String, String)>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    own_comment(&conn, &group_id, &post_id, &comment_id, &user)?;
    comments::delete(&conn, &comment_id)?;

    audit::record(
        &state.db,
        AuditEntry::new("Delete Comment", &user.username, "Comment deleted"),
    );
    Ok(Json(json!({ "message": "Comment deleted" })))
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{self, AuditEntry};
use crate::db::models::Post;
use crate::db::posts::{self, PostFields};
use crate::db::comments;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::membership;
use crate::routes::{flag, optional, required};
use crate::state::AppState;

// --- Forms ---

#[derive(Deserialize)]
pub struct PostForm {
    pub group_id: Option<String>,
    pub post_title: Option<String>,
    pub post_message: Option<String>,
    pub event_button: Option<String>,
    pub event_date: Option<String>,
}

impl PostForm {
    fn fields(&self) -> AppResult<PostFields<'_>> {
        let event_date = if flag(&self.event_button) {
            let raw = optional(&self.event_date).ok_or_else(|| {
                AppError::Validation("An event needs a date".into())
            })?;
            Some(posts::parse_event_date(raw)?)
        } else {
            None
        };
        Ok(PostFields {
            title: required(&self.post_title)?,
            message: required(&self.post_message)?,
            event_date,
        })
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/home", get(home))
        .route("/api/create_post", post(create_post))
        .route("/api/groups/{group_id}/{post_id}", get(view_post))
        .route("/api/groups/{group_id}/{post_id}/edit_post", put(edit_post))
        .route(
            "/api/groups/{group_id}/{post_id}/delete_post",
            delete(delete_post),
        )
        .route("/api/groups/{group_id}/{post_id}/rsvp", put(rsvp))
        .route("/api/groups/{group_id}/{post_id}/attendees", get(attendees))
}

/// Load a post the user created. Anyone else gets 403.
fn own_post(
    conn: &rusqlite::Connection,
    group_id: &str,
    post_id: &str,
    user: &CurrentUser,
) -> AppResult<Post> {
    let post = posts::require_in_group(conn, group_id, post_id)?;
    if post.creator != user.id {
        tracing::warn!(username = %user.username, post_id, "Denied post access to non-creator");
        return Err(AppError::Forbidden(
            "Only the creator of this post can do that".into(),
        ));
    }
    Ok(post)
}

// --- Handlers ---

async fn home(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let feed = posts::feed_for_user(&conn, &user.id)?;
    Ok(Json(json!({ "posts": feed })))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<PostForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let group_id = required(&form.group_id)?;
    let fields = form.fields()?;

    let conn = state.db.get()?;
    membership::require_member(&conn, group_id, &user.id)?;
    let id = posts::insert(&conn, group_id, &user.id, &fields)?;

    audit::record(
        &state.db,
        AuditEntry::new("Create Post", &user.username, "Post created"),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created", "post_id": id })),
    ))
}

async fn view_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    membership::require_member(&conn, &group_id, &user.id)?;
    let post = posts::require_in_group(&conn, &group_id, &post_id)?;
    let comments = comments::list_for_post(&conn, &post_id)?;

    Ok(Json(json!({ "post": post, "comments": comments })))
}

async fn edit_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id)): Path<(String, String)>,
    Form(form): Form<PostForm>,
) -> AppResult<Json<Value>> {
    let fields = form.fields()?;
    let conn = state.db.get()?;
    own_post(&conn, &group_id, &post_id, &user)?;
    posts::update(&conn, &post_id, &fields)?;

    audit::record(
        &state.db,
        AuditEntry::new("Edit Post", &user.username, "Post edited"),
    );
    Ok(Json(json!({ "message": "Post updated" })))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    own_post(&conn, &group_id, &post_id, &user)?;
    posts::delete(&mut conn, &post_id)?;

    audit::record(
        &state.db,
        AuditEntry::new("Delete Post", &user.username, "Post deleted"),
    );
    Ok(Json(json!({ "message": "Post deleted" })))
}

async fn rsvp(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    membership::require_member(&conn, &group_id, &user.id)?;
    let post = posts::require_in_group(&conn, &group_id, &post_id)?;
    if !post.event_button {
        return Err(AppError::Validation("This post is not an event".into()));
    }
    posts::add_attendee(&conn, &post_id, &user.id)?;

    audit::record(
        &state.db,
        AuditEntry::new("RSVP", &user.username, "RSVP'd to event"),
    );
    Ok(Json(json!({ "message": "RSVP successful" })))
}

async fn attendees(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, post_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    own_post(&conn, &group_id, &post_id, &user)?;
    let names = posts::attendee_usernames(&conn, &post_id)?;
    Ok(Json(json!({ "attendees": names })))
}

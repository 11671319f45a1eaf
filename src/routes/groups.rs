use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{self, AuditEntry};
use crate::db::groups::{self, GroupFields, Page, SearchField};
use crate::db::models::GroupAccess;
use crate::db::posts;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::membership::{self, JoinOutcome};
use crate::routes::{optional, required};
use crate::state::AppState;

// --- Forms ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupForm {
    pub group_name: Option<String>,
    pub group_location: Option<String>,
    pub group_category: Option<String>,
    pub group_description: Option<String>,
    pub group_access: Option<String>,
}

impl GroupForm {
    fn fields(&self) -> AppResult<GroupFields<'_>> {
        let access = required(&self.group_access)?
            .parse::<GroupAccess>()
            .map_err(AppError::Validation)?;
        Ok(GroupFields {
            name: required(&self.group_name)?,
            category: required(&self.group_category)?,
            description: required(&self.group_description)?,
            location: optional(&self.group_location),
            access,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferForm {
    pub new_owner_id: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub pn: Option<u32>,
    pub ps: Option<u32>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/create_group", post(create_group))
        .route("/api/{group_id}/join", put(join_group))
        .route("/api/get_user_groups", get(user_groups))
        .route("/api/groups/{group_id}", get(group_page))
        .route(
            "/api/groups/{group_id}/requests_to_join",
            get(requests_to_join),
        )
        .route(
            "/api/groups/{group_id}/requests_to_join/{request_id}/accepted",
            put(accept_request),
        )
        .route(
            "/api/groups/{group_id}/requests_to_join/{request_id}/rejected",
            put(reject_request),
        )
        .route("/api/groups/{group_id}/leave", put(leave_group))
        .route(
            "/api/groups/{group_id}/settings/edit_group",
            put(edit_group),
        )
        .route(
            "/api/groups/{group_id}/settings/delete_group",
            delete(delete_group),
        )
        .route(
            "/api/groups/{group_id}/settings/transfer_ownership",
            put(transfer_ownership),
        )
        .route(
            "/api/search_for_groups/group_name/{name}",
            get(search_by_name),
        )
        .route(
            "/api/search_for_groups/category/{category}",
            get(search_by_category),
        )
}

// --- Handlers ---

async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<GroupForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let fields = form.fields()?;
    let mut conn = state.db.get()?;
    let id = groups::insert(&mut conn, &user.id, &fields)?;

    audit::record(
        &state.db,
        AuditEntry::new("Create Group", &user.username, "Group created"),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Group was created",
            "group_id": id,
            "url": format!("/api/groups/{}", id),
        })),
    ))
}

async fn join_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let outcome = membership::join(&mut conn, &group_id, &user.id)?;

    let message = match outcome {
        JoinOutcome::Joined => "Joined Group",
        JoinOutcome::Requested => "Requested to join group",
    };
    audit::record(&state.db, AuditEntry::new("Join Group", &user.username, message));
    Ok(Json(json!({ "message": message })))
}

async fn user_groups(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let (joined, owned) = groups::for_user(&conn, &user.id)?;
    Ok(Json(json!({ "joined_groups": joined, "owned_groups": owned })))
}

async fn group_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let role = membership::require_member(&conn, &group_id, &user.id).inspect_err(|_| {
        audit::record(
            &state.db,
            AuditEntry::new("View Group Page", &user.username, "Access denied"),
        );
    })?;

    let group = groups::require(&conn, &group_id)?;
    let feed = posts::feed_for_group(&conn, &group_id)?;

    Ok(Json(json!({
        "group": group,
        "is_owner": role == membership::Role::Owner,
        "posts": feed,
    })))
}

async fn requests_to_join(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let requests = membership::list_requests(&conn, &group_id, &user.id)?;
    Ok(Json(json!({ "requests": requests })))
}

async fn accept_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, request_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    membership::accept(&mut conn, &group_id, &user.id, &request_id)?;

    audit::record(
        &state.db,
        AuditEntry::new("Join Group", &user.username, "Request to join accepted"),
    );
    Ok(Json(json!({ "message": "Request to join accepted" })))
}

async fn reject_request(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, request_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    membership::reject(&mut conn, &group_id, &user.id, &request_id)?;

    audit::record(
        &state.db,
        AuditEntry::new("Join Group", &user.username, "Request to join rejected"),
    );
    Ok(Json(json!({ "message": "User has been rejected" })))
}

async fn leave_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    membership::leave(&mut conn, &group_id, &user.id)?;

    audit::record(
        &state.db,
        AuditEntry::new("Leave Group", &user.username, "Successfully left group"),
    );
    Ok(Json(json!({ "message": "Successfully left group" })))
}

async fn edit_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
    Form(form): Form<GroupForm>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    membership::require_owner(&conn, &group_id, &user.id)?;
    groups::update(&conn, &group_id, &form.fields()?)?;

    audit::record(
        &state.db,
        AuditEntry::new("Edit Group", &user.username, "Group edited"),
    );
    Ok(Json(json!({ "message": "Group updated" })))
}

async fn delete_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    membership::require_owner(&conn, &group_id, &user.id)?;
    let report = groups::delete(&mut conn, &group_id)?;

    audit::record(
        &state.db,
        AuditEntry::new("Delete Group", &user.username, "Group deleted"),
    );
    Ok(Json(json!({
        "message": "Group deleted",
        "deleted": { "posts": report.posts, "comments": report.comments },
    })))
}

async fn transfer_ownership(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<String>,
    Form(form): Form<TransferForm>,
) -> AppResult<Json<Value>> {
    let new_owner = required(&form.new_owner_id)?;
    let mut conn = state.db.get()?;
    membership::transfer_ownership(&mut conn, &group_id, &user.id, new_owner)?;

    audit::record(
        &state.db,
        AuditEntry::new("Transfer Ownership", &user.username, "Group ownership transferred"),
    );
    Ok(Json(json!({ "message": "Ownership transferred" })))
}

fn search(state: &AppState, field: SearchField, term: &str, query: &SearchQuery) -> AppResult<Json<Value>> {
    let page = Page::new(query.pn, query.ps)?;
    let conn = state.db.get()?;
    let found = groups::search(&conn, field, term.trim(), page)?;

    if found.is_empty() {
        return Err(AppError::NotFound("No groups found".into()));
    }
    Ok(Json(json!({
        "groups": found,
        "page": page.number,
        "page_size": page.size,
    })))
}

async fn search_by_name(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(name): Path<String>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    search(&state, SearchField::Name, &name, &query)
}

async fn search_by_category(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(category): Path<String>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    search(&state, SearchField::Category, &category, &query)
}

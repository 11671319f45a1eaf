use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{self, AuditEntry};
use crate::auth::session::parse_basic;
use crate::auth::{password, IssuedToken};
use crate::db::users::{self, DeletionReport, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser};
use crate::routes::required;
use crate::state::AppState;

// --- Forms ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordForm {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", get(login))
        .route("/api/logout", get(logout))
        .route("/api/delete_account", delete(delete_account))
        .route("/api/change_password", put(change_password))
        .route("/api/admin/create_admin", post(create_admin))
        .route("/api/admin/users/{user_id}", delete(admin_delete_user))
}

// --- Handlers ---

async fn create_account(state: &AppState, form: &RegisterForm, is_admin: bool) -> AppResult<String> {
    let first_name = required(&form.first_name)?;
    let last_name = required(&form.last_name)?;
    let username = required(&form.username)?;
    let email = required(&form.email)?;
    let password = required(&form.password)?;
    let confirm = required(&form.confirm_password)?;

    if password != confirm {
        audit::record(
            &state.db,
            AuditEntry::new("Register new user", "", "Registration fail, passwords do not match"),
        );
        return Err(AppError::Validation(
            "Passwords do not match, please check the passwords entered".into(),
        ));
    }

    let password_hash = password::hash(password.to_string(), state.config.auth.bcrypt_cost).await?;

    let mut conn = state.db.get()?;
    let id = users::insert(
        &mut conn,
        &NewUser {
            username,
            email,
            first_name,
            last_name,
            password_hash: &password_hash,
            is_admin,
        },
    )
    .inspect_err(|e| {
        if let AppError::Conflict(msg) = e {
            audit::record(
                &state.db,
                AuditEntry::new("Register new user", "", format!("Registration fail, {}", msg)),
            );
        }
    })?;

    Ok(id)
}

async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = create_account(&state, &form, false).await?;
    let username = form.username.as_deref().unwrap_or_default().trim();

    tracing::info!(username, "Registered new user");
    audit::record(
        &state.db,
        AuditEntry::new("Register new user", username, "Registration successful"),
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "user_id": id })),
    ))
}

async fn login(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<IssuedToken>> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let (username, password) = parse_basic(authorization)?;

    match state.sessions.login(&state.db, &username, &password).await {
        Ok(issued) => {
            audit::record(&state.db, AuditEntry::new("Login", &username, "Login successful"));
            Ok(Json(issued))
        }
        Err(e) => {
            audit::record(
                &state.db,
                AuditEntry::new("Login", &username, "Login unsuccessful, incorrect details entered"),
            );
            Err(e)
        }
    }
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    state.sessions.logout(&user.session()).await?;
    audit::record(
        &state.db,
        AuditEntry::new("Logout", &user.username, "Logout successful"),
    );
    Ok(Json(json!({ "message": "Logout successful" })))
}

fn deletion_body(message: &str, report: DeletionReport) -> Json<Value> {
    Json(json!({
        "message": message,
        "deleted": {
            "groups": report.groups,
            "posts": report.posts,
            "comments": report.comments,
        }
    }))
}

async fn delete_account(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let report = {
        let mut conn = state.db.get()?;
        users::delete_cascade(&mut conn, &user.id)?
    };

    // The account is gone, so its token must stop working too
    state.sessions.logout(&user.session()).await?;

    tracing::info!(username = %user.username, ?report, "Account deleted");
    audit::record(
        &state.db,
        AuditEntry::new("Delete Account", &user.username, "Account successfully deleted"),
    );
    Ok(deletion_body("User was deleted", report))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> AppResult<Json<Value>> {
    let current = required(&form.current_password)?;
    let new_password = required(&form.new_password)?;
    let confirm = required(&form.confirm_password)?;

    if new_password != confirm {
        return Err(AppError::Validation(
            "Passwords do not match, please check the passwords entered".into(),
        ));
    }

    let stored = {
        let conn = state.db.get()?;
        users::find_by_id(&conn, &user.id)?
            .ok_or_else(|| AppError::NotFound("Can not find the user".into()))?
    };
    if !password::verify(current.to_string(), stored.password_hash).await? {
        audit::record(
            &state.db,
            AuditEntry::new("Change Password", &user.username, "Current password incorrect"),
        );
        return Err(AppError::Validation("Current password is incorrect".into()));
    }

    let hash = password::hash(new_password.to_string(), state.config.auth.bcrypt_cost).await?;
    {
        let conn = state.db.get()?;
        users::update_password_hash(&conn, &user.id, &hash)?;
    }

    audit::record(
        &state.db,
        AuditEntry::new("Change Password", &user.username, "Account successfully edited"),
    );
    Ok(Json(json!({ "message": "Password changed" })))
}

async fn create_admin(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Form(form): Form<RegisterForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = create_account(&state, &form, true).await?;
    let username = form.username.as_deref().unwrap_or_default().trim();

    tracing::info!(admin = %admin.username, username, "Created admin account");
    audit::record(
        &state.db,
        AuditEntry::new(
            "Create Admin",
            &admin.username,
            format!("Admin account {} created", username),
        ),
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Admin registered successfully", "user_id": id })),
    ))
}

async fn admin_delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let report = {
        let mut conn = state.db.get()?;
        users::delete_cascade(&mut conn, &user_id)?
    };

    tracing::info!(admin = %admin.username, user_id = %user_id, ?report, "Admin deleted account");
    audit::record(
        &state.db,
        AuditEntry::new(
            "Admin Delete Account",
            &admin.username,
            format!("Account {} deleted", user_id),
        ),
    );
    Ok(deletion_body("User was deleted", report))
}

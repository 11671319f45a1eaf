use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveTime, Utc};
use serde_json::{json, Value};

use crate::db::posts;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/my_calendar", get(my_calendar))
}

/// Events the user has RSVP'd to, from the start of today (UTC), soonest first.
async fn my_calendar(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let today = Utc::now().date_naive().and_time(NaiveTime::MIN);
    let conn = state.db.get()?;
    let events = posts::calendar_for_user(&conn, &user.id, today)?;
    Ok(Json(json!({ "events": events })))
}

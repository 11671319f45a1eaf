pub mod auth;
pub mod calendar;
pub mod comments;
pub mod groups;
pub mod health;
pub mod posts;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::extractors::TOKEN_HEADER;
use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(groups::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(calendar::router())
        .layer(middleware::from_fn_with_state(state.clone(), require_store))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    user = tracing::field::Empty,
                )
            }),
        )
        .layer(cors)
        .with_state(state)
}

/// Answer 503 without touching the handler when the store is down.
async fn require_store(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let pool = state.db.clone();
    tokio::task::spawn_blocking(move || db::ping(&pool))
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))??;
    Ok(next.run(request).await)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(TOKEN_HEADER),
        ])
}

const MISSING_FORM_DATA: &str = "Missing form data, please check all required fields have been entered";

/// A required form field, trimmed. Absent or blank is a validation error.
pub(crate) fn required(value: &Option<String>) -> AppResult<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(MISSING_FORM_DATA.into()))
}

/// An optional form field, trimmed. Blank counts as absent.
pub(crate) fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Checkbox-style form flags.
pub(crate) fn flag(value: &Option<String>) -> bool {
    matches!(
        optional(value).map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "on" | "1" | "yes")
    )
}

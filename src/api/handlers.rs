use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::counter::{Counter, CounterAction};

/// Application state shared across handlers
pub struct AppState {
    pub counter: Counter,
    pub templates: Environment<'static>,
}

impl AppState {
    pub fn new(templates: Environment<'static>) -> Self {
        Self {
            counter: Counter::new(),
            templates,
        }
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Counter Page
// ============================================================================

/// Largest urlencoded body accepted on `POST /`
const MAX_FORM_BYTES: usize = 10 << 20;

pub async fn show_counter(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    render_counter(&state, None)
}

/// Handle a form post. `action` may arrive in the query string, an urlencoded
/// body or a multipart body; the first value wins. A request without a form
/// body simply re-renders the page.
pub async fn submit_counter(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Html<String>, ApiError> {
    let raw = form_action(request).await?;

    let action = raw.as_deref().and_then(CounterAction::parse);
    if action.is_none() {
        tracing::debug!(action = ?raw, "Ignoring unknown counter action");
    }

    render_counter(&state, action)
}

#[derive(Debug, PartialEq)]
enum FormBody {
    UrlEncoded,
    Multipart,
    Other,
}

fn form_body(headers: &HeaderMap) -> FormBody {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase());

    match mime.as_deref() {
        Some("application/x-www-form-urlencoded") => FormBody::UrlEncoded,
        Some("multipart/form-data") => FormBody::Multipart,
        _ => FormBody::Other,
    }
}

/// First `action` value of the request. Urlencoded body values come before
/// query values, multipart values after them.
async fn form_action(request: Request) -> Result<Option<String>, ApiError> {
    let query = decode_form(request.uri().query().unwrap_or_default().as_bytes())?;
    let from_query = first_action(query);

    match form_body(request.headers()) {
        FormBody::UrlEncoded => {
            let bytes = axum::body::to_bytes(request.into_body(), MAX_FORM_BYTES)
                .await
                .map_err(|e| {
                    tracing::warn!(error = %e, "Failed to read counter form");
                    bad_request()
                })?;
            let body = decode_form(&bytes)?;
            Ok(first_action(body).or(from_query))
        }
        FormBody::Multipart if from_query.is_some() => Ok(from_query),
        FormBody::Multipart => Ok(multipart_action(request).await),
        FormBody::Other => Ok(from_query),
    }
}

/// Multipart problems are not fatal: the page renders without an action.
async fn multipart_action(request: Request) -> Option<String> {
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable multipart form");
            return None;
        }
    };

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("action") || field.file_name().is_some() {
                    continue;
                }
                return match field.text().await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        tracing::debug!(error = %e, "Unreadable multipart field");
                        None
                    }
                };
            }
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Unreadable multipart form");
                return None;
            }
        }
    }
}

fn first_action(pairs: Vec<(String, String)>) -> Option<String> {
    pairs
        .into_iter()
        .find(|(key, _)| key == "action")
        .map(|(_, value)| value)
}

/// Decode `application/x-www-form-urlencoded` pairs. Semicolon separators and
/// malformed percent escapes are rejected rather than passed through.
fn decode_form(raw: &[u8]) -> Result<Vec<(String, String)>, ApiError> {
    for segment in raw.split(|b| *b == b'&') {
        if segment.contains(&b';') || !valid_escapes(segment) {
            tracing::warn!(
                segment = %String::from_utf8_lossy(segment),
                "Rejected counter form"
            );
            return Err(bad_request());
        }
    }

    Ok(url::form_urlencoded::parse(raw).into_owned().collect())
}

fn valid_escapes(segment: &[u8]) -> bool {
    let mut i = 0;
    while i < segment.len() {
        if segment[i] == b'%' {
            let hex = segment.get(i + 1..i + 3);
            if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

fn bad_request() -> ApiError {
    ApiError::BadRequest("Bad Request".to_string())
}

/// Mutate and render under a single lock acquisition. The guard is dropped
/// before the response leaves the handler.
fn render_counter(state: &AppState, action: Option<CounterAction>) -> Result<Html<String>, ApiError> {
    let mut value = state.counter.lock();

    if let Some(action) = action {
        let updated = Counter::apply_locked(&mut value, action);
        tracing::debug!(?action, value = updated, "Counter updated");
    }

    let page = state
        .templates
        .get_template("index.html")
        .and_then(|tmpl| tmpl.render(context! { counter => *value }))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to render counter page");
            ApiError::Internal("Internal Server Error".to_string())
        })?;

    drop(value);
    Ok(Html(page))
}

// ============================================================================
// Counter API
// ============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CounterValue {
    pub value: u64,
}

pub async fn counter_value(State(state): State<Arc<AppState>>) -> Json<CounterValue> {
    Json(CounterValue {
        value: state.counter.get(),
    })
}

// ============================================================================
// Fallback
// ============================================================================

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use minijinja::Environment;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::handlers::{
    counter_value, health_check, not_found, show_counter, submit_counter, ApiError, AppState,
};
use crate::config::{optional, parse_or, ConfigError};

// Embed UI files at compile time
const INDEX_HTML: &str = include_str!("../ui/index.html");
const STYLE_CSS: &str = include_str!("../ui/static/style.css");

/// Assets reachable under `/static/`: (file name, content type, body)
const STATIC_ASSETS: &[(&str, &str, &str)] = &[("style.css", "text/css; charset=utf-8", STYLE_CSS)];

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Load from `COUNTER_HOST` and `COUNTER_PORT`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(crate::config::env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: optional(&lookup, "COUNTER_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "COUNTER_PORT", defaults.port)?,
        })
    }
}

/// Build the page template environment
pub fn load_templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("index.html", INDEX_HTML)?;
    Ok(env)
}

async fn serve_static(Path(file): Path<String>) -> Result<Response, ApiError> {
    let (_, content_type, body) = STATIC_ASSETS
        .iter()
        .find(|(name, _, _)| *name == file)
        .ok_or_else(|| ApiError::NotFound(format!("Static file '{}' not found", file)))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, *content_type)], *body).into_response())
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Counter page
        .route("/", get(show_counter).post(submit_counter))
        // Static assets
        .route("/static/*file", get(serve_static))
        // JSON value for pollers
        .route("/api/counter", get(counter_value))
        // Health check
        .route("/health", get(health_check))
        .fallback(not_found)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let templates = load_templates()?;
    let state = Arc::new(AppState::new(templates));

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting counter server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Counter server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let state = Arc::new(AppState::new(load_templates().unwrap()));
        build_router(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_action(action: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("action={}", action)))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_index_renders_zero() {
        let app = create_test_app();

        let response = app.oneshot(get_request("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
        let body = body_string(response).await;
        assert!(body.contains(r#"<span id="counter-value">0</span>"#));
    }

    #[tokio::test]
    async fn test_increment_then_reset() {
        let app = create_test_app();

        for _ in 0..3 {
            let response = app.clone().oneshot(post_action("increment")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(get_request("/")).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains(r#"<span id="counter-value">3</span>"#));

        let response = app.clone().oneshot(get_request("/api/counter")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value, serde_json::json!({ "value": 3 }));

        let response = app.clone().oneshot(post_action("reset")).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains(r#"<span id="counter-value">0</span>"#));
    }

    #[tokio::test]
    async fn test_unknown_action_leaves_value() {
        let app = create_test_app();

        app.clone().oneshot(post_action("increment")).await.unwrap();
        let response = app.clone().oneshot(post_action("explode")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(r#"<span id="counter-value">1</span>"#));
    }

    fn post_raw(uri: &str, content_type: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(body.into()).unwrap()
    }

    async fn api_value(app: &Router) -> serde_json::Value {
        let response = app.clone().oneshot(get_request("/api/counter")).await.unwrap();
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_post_without_form_renders_page() {
        let app = create_test_app();
        app.clone().oneshot(post_action("increment")).await.unwrap();

        let response = app.clone().oneshot(post_raw("/", None, Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(r#"<span id="counter-value">1</span>"#));

        let response = app
            .clone()
            .oneshot(post_raw("/", Some("application/json"), r#"{"action":"reset"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api_value(&app).await, serde_json::json!({ "value": 1 }));
    }

    #[tokio::test]
    async fn test_multipart_form_action() {
        let app = create_test_app();
        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"action\"\r\n\
            \r\n\
            increment\r\n\
            --XBOUNDARY--\r\n";

        let response = app
            .clone()
            .oneshot(post_raw("/", Some("multipart/form-data; boundary=XBOUNDARY"), body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(r#"<span id="counter-value">1</span>"#));
    }

    #[tokio::test]
    async fn test_first_action_value_wins() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(post_action("increment&action=reset"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api_value(&app).await, serde_json::json!({ "value": 1 }));
    }

    #[tokio::test]
    async fn test_query_string_action() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(post_raw("/?action=increment", None, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api_value(&app).await, serde_json::json!({ "value": 1 }));

        // Body values take precedence over the query string
        let response = app
            .clone()
            .oneshot(post_raw(
                "/?action=increment",
                Some("application/x-www-form-urlencoded"),
                "action=reset",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api_value(&app).await, serde_json::json!({ "value": 0 }));
    }

    #[tokio::test]
    async fn test_malformed_form_is_bad_request() {
        let app = create_test_app();

        let response = app.clone().oneshot(post_action("%zz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(post_raw("/?action=%g1", None, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(api_value(&app).await, serde_json::json!({ "value": 0 }));
    }

    #[tokio::test]
    async fn test_static_asset() {
        let app = create_test_app();

        let response = app.clone().oneshot(get_request("/static/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/css; charset=utf-8"
        );

        let response = app.oneshot(get_request("/static/../Cargo.toml")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let app = create_test_app();

        let response = app.oneshot(get_request("/favicon.ico")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "COUNTER_PORT" => Some("9090".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);

        let err = ServerConfig::from_lookup(|key| match key {
            "COUNTER_PORT" => Some("99999".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "COUNTER_PORT", .. }));
    }
}

//! Data sources polled once per cycle

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;

use super::config::MySqlConfig;

const PENDING_TODOS_SQL: &str = "SELECT title FROM todos_todo WHERE isCompleted = 0";

/// Value fetched for a single polling cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    /// Current counter value
    Count(i64),
    /// Titles of unfinished tasks
    Pending(Vec<String>),
}

/// Something the notifier can poll
#[async_trait]
pub trait CountSource: Send + Sync {
    async fn fetch(&self) -> Result<Reading, SourceError>;

    /// Short label for logs
    fn describe(&self) -> String;
}

// ============================================================================
// HTTP counter service
// ============================================================================

/// Counter service response body
#[derive(Debug, Deserialize)]
struct CounterResponse {
    value: i64,
}

/// Polls an HTTP counter service
pub struct HttpCounterSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCounterSource {
    pub fn new(host: &str, path: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };

        Ok(Self {
            client,
            url: format!("{}{}", base, path),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CountSource for HttpCounterSource {
    async fn fetch(&self) -> Result<Reading, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        parse_counter_body(&body).map(Reading::Count)
    }

    fn describe(&self) -> String {
        format!("counter service at {}", self.url)
    }
}

/// Accept either a bare integer or `{"value": N}`
pub fn parse_counter_body(body: &str) -> Result<i64, SourceError> {
    let trimmed = body.trim();

    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }

    serde_json::from_str::<CounterResponse>(trimmed)
        .map(|r| r.value)
        .map_err(|e| SourceError::Decode(format!("unexpected counter body {:?}: {}", trimmed, e)))
}

// ============================================================================
// MySQL todo table
// ============================================================================

/// Lists unfinished rows of the todo table
pub struct MySqlTodoSource {
    pool: MySqlPool,
    label: String,
}

impl MySqlTodoSource {
    /// Create the pool without connecting; connections are opened on first use.
    /// Must be called inside a tokio runtime.
    pub fn connect_lazy(config: &MySqlConfig) -> Self {
        Self::connect_lazy_with_timeout(config, Duration::from_secs(10))
    }

    /// Like [`connect_lazy`](Self::connect_lazy) with a custom wait for a
    /// pooled connection
    pub fn connect_lazy_with_timeout(config: &MySqlConfig, acquire_timeout: Duration) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);

        Self {
            pool,
            label: format!(
                "mysql {}@{}:{}/{}",
                config.user, config.host, config.port, config.database
            ),
        }
    }
}

#[async_trait]
impl CountSource for MySqlTodoSource {
    async fn fetch(&self) -> Result<Reading, SourceError> {
        let rows = sqlx::query(PENDING_TODOS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::Database(e.to_string()))?;

        let titles = collect_titles(rows.iter().map(|row| row.try_get::<String, _>("title")));

        Ok(Reading::Pending(titles))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Keep readable titles in row order, skipping rows that failed to decode
pub fn collect_titles<E>(rows: impl IntoIterator<Item = Result<String, E>>) -> Vec<String>
where
    E: std::fmt::Display,
{
    rows.into_iter()
        .filter_map(|row| match row {
            Ok(title) => Some(title),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable todo row");
                None
            }
        })
        .collect()
}

/// Source errors. A failed fetch skips the cycle.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Counter service returned status {0}")]
    Status(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use tokio::net::TcpListener;

    async fn spawn_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    #[test]
    fn test_parse_counter_body() {
        assert_eq!(parse_counter_body("42").unwrap(), 42);
        assert_eq!(parse_counter_body(" 7\n").unwrap(), 7);
        assert_eq!(parse_counter_body(r#"{"value": 10}"#).unwrap(), 10);
        assert_eq!(parse_counter_body(r#"{"value": 3, "extra": true}"#).unwrap(), 3);

        assert!(matches!(
            parse_counter_body("ten"),
            Err(SourceError::Decode(_))
        ));
        assert!(matches!(
            parse_counter_body(r#"{"count": 1}"#),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn test_url_building() {
        let timeout = Duration::from_secs(1);

        let source = HttpCounterSource::new("counter:8080", "/api/counter", timeout).unwrap();
        assert_eq!(source.url(), "http://counter:8080/api/counter");

        let source = HttpCounterSource::new("https://counter.example.com/", "/", timeout).unwrap();
        assert_eq!(source.url(), "https://counter.example.com/");
    }

    #[tokio::test]
    async fn test_fetch_json_value() {
        let app = Router::new().route(
            "/api/counter",
            get(|| async { Json(serde_json::json!({ "value": 10 })) }),
        );
        let host = spawn_server(app).await;

        let source = HttpCounterSource::new(&host, "/api/counter", Duration::from_secs(5)).unwrap();
        assert_eq!(source.fetch().await.unwrap(), Reading::Count(10));
    }

    #[tokio::test]
    async fn test_fetch_plain_integer_from_root() {
        let app = Router::new().route("/", get(|| async { "5\n" }));
        let host = spawn_server(app).await;

        let source = HttpCounterSource::new(&host, "/", Duration::from_secs(5)).unwrap();
        assert_eq!(source.fetch().await.unwrap(), Reading::Count(5));
    }

    #[tokio::test]
    async fn test_fetch_non_ok_status() {
        let app = Router::new().route(
            "/api/counter",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let host = spawn_server(app).await;

        let source = HttpCounterSource::new(&host, "/api/counter", Duration::from_secs(5)).unwrap();
        assert!(matches!(source.fetch().await, Err(SourceError::Status(_))));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let app = Router::new().route(
            "/api/counter",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "1"
            }),
        );
        let host = spawn_server(app).await;

        let source =
            HttpCounterSource::new(&host, "/api/counter", Duration::from_millis(100)).unwrap();
        assert!(matches!(source.fetch().await, Err(SourceError::Network(_))));
    }

    #[test]
    fn test_collect_titles_skips_bad_rows() {
        let rows: Vec<Result<String, String>> = vec![
            Ok("Buy milk".to_string()),
            Err("column title is NULL".to_string()),
            Ok("Write report".to_string()),
        ];

        assert_eq!(
            collect_titles(rows),
            vec!["Buy milk".to_string(), "Write report".to_string()]
        );
        assert!(collect_titles(Vec::<Result<String, String>>::new()).is_empty());
    }

    #[tokio::test]
    async fn test_mysql_unreachable_is_database_error() {
        // Reserve a port, then free it so nothing is listening there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = MySqlConfig {
            host: "127.0.0.1".to_string(),
            port,
            database: "todos".to_string(),
            user: "notifier".to_string(),
            password: "secret".to_string(),
        };
        let source = MySqlTodoSource::connect_lazy_with_timeout(&config, Duration::from_millis(500));

        assert_eq!(source.describe(), format!("mysql notifier@127.0.0.1:{}/todos", port));
        assert!(matches!(source.fetch().await, Err(SourceError::Database(_))));
    }

    #[tokio::test]
    async fn test_fetch_against_counter_app() {
        use crate::api::{build_router, load_templates, AppState};
        use std::sync::Arc;

        let state = Arc::new(AppState::new(load_templates().unwrap()));
        for _ in 0..4 {
            state.counter.increment();
        }
        let host = spawn_server(build_router(state)).await;

        let source = HttpCounterSource::new(&host, "/api/counter", Duration::from_secs(5)).unwrap();
        assert_eq!(source.fetch().await.unwrap(), Reading::Count(4));
    }
}

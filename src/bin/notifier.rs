//! Notifier daemon
//!
//! Run with: cargo run --bin notifier
//!
//! Required environment variables:
//! - SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS: SMTP relay
//! - EMAIL_TO: Recipient, or a comma-separated list
//! - CHECK_INTERVAL: Polling interval such as `30s` or `5m`
//! - COUNTER_SVC_HOST: Counter service `host[:port]`, or
//!   MYSQL_HOST, MYSQL_DATABASE, MYSQL_USER, MYSQL_PASSWORD for the todo table
//!
//! Optional:
//! - COUNTER_SVC_PATH: Counter endpoint path (default: /api/counter)
//! - ALERT_THRESHOLD: Counter value to alert on (default: 10)
//! - ALERT_MODE: `equals` or `at_least` (default: equals)
//! - HTTP_TIMEOUT: Counter service request timeout (default: 5s)
//! - SMTP_FROM: Sender address (default: SMTP_USER)
//! - SMTP_TLS: `starttls`, `tls` or `none` (default: starttls)
//! - NOTIFY_ON_START: Send a welcome email at startup (default: true for the
//!   counter service, false for MySQL)
//! - RUST_LOG: Log level (default: info)

use counterwatch::notifier::{
    AlertChecker, CountSource, EmailTemplates, HttpCounterSource, MySqlTodoSource, NotifierConfig,
    SmtpMailer, SourceConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counterwatch=info,notifier=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match NotifierConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid notifier configuration");
            std::process::exit(1);
        }
    };

    tracing::info!("Notifier configuration:");
    tracing::info!("  SMTP relay: {}:{} ({:?})", config.smtp.host, config.smtp.port, config.smtp.tls);
    tracing::info!("  Recipients: {}", config.smtp.to.join(", "));
    tracing::info!("  Check interval: {:?}", config.check_interval);
    tracing::info!("  Alert rule: {:?}", config.rule());

    let source: Box<dyn CountSource> = match &config.source {
        SourceConfig::Counter { host, path } => {
            Box::new(HttpCounterSource::new(host, path, config.http_timeout)?)
        }
        SourceConfig::Todos(db) => Box::new(MySqlTodoSource::connect_lazy(db)),
    };

    let mailer = match SmtpMailer::new(&config.smtp) {
        Ok(mailer) => mailer,
        Err(e) => {
            tracing::error!(error = %e, "Invalid SMTP configuration");
            std::process::exit(1);
        }
    };

    let templates = match EmailTemplates::load() {
        Ok(templates) => templates,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load email templates");
            std::process::exit(1);
        }
    };

    let checker = AlertChecker::new(source, Box::new(mailer), templates, config.rule());

    if config.notify_on_start {
        tracing::info!("Sending welcome email...");
        match checker.send_welcome().await {
            Ok(true) => tracing::info!("Welcome email sent successfully"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "Failed to send welcome email"),
        }
    }

    checker.run(config.check_interval, shutdown_signal()).await;

    tracing::info!("Notifier stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received");
}

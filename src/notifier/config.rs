//! Notifier configuration types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::checker::AlertRule;
use crate::config::{
    duration_var, optional, parse_duration, parse_flag, parse_or, parse_value, required,
    ConfigError,
};

const DEFAULT_COUNTER_PATH: &str = "/api/counter";
const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_THRESHOLD: i64 = 10;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Full notifier configuration, read once at startup
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub smtp: SmtpConfig,
    pub source: SourceConfig,
    /// Delay between polling cycles
    pub check_interval: Duration,
    /// Timeout applied to counter service requests
    pub http_timeout: Duration,
    pub threshold: i64,
    pub mode: AlertMode,
    /// Send a welcome email before the first cycle. Defaults to on for the
    /// counter source only.
    pub notify_on_start: bool,
}

impl NotifierConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(crate::config::env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp = SmtpConfig::from_lookup(&lookup)?;
        let check_interval = duration_var(&lookup, "CHECK_INTERVAL")?;
        let source = SourceConfig::from_lookup(&lookup)?;

        let http_timeout = match optional(&lookup, "HTTP_TIMEOUT") {
            Some(raw) => parse_duration(&raw).map_err(|e| ConfigError::Invalid {
                var: "HTTP_TIMEOUT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let notify_on_start = match optional(&lookup, "NOTIFY_ON_START") {
            Some(raw) => parse_flag("NOTIFY_ON_START", &raw)?,
            // The todo notifier never announced itself
            None => matches!(source, SourceConfig::Counter { .. }),
        };

        Ok(Self {
            smtp,
            source,
            check_interval,
            http_timeout,
            threshold: parse_or(&lookup, "ALERT_THRESHOLD", DEFAULT_THRESHOLD)?,
            mode: parse_or(&lookup, "ALERT_MODE", AlertMode::Equals)?,
            notify_on_start,
        })
    }

    /// Alert rule implied by the configured source and mode
    pub fn rule(&self) -> AlertRule {
        match (&self.source, self.mode) {
            (SourceConfig::Counter { .. }, AlertMode::Equals) => AlertRule::CountEquals(self.threshold),
            (SourceConfig::Counter { .. }, AlertMode::AtLeast) => {
                AlertRule::CountAtLeast(self.threshold)
            }
            (SourceConfig::Todos(_), _) => AlertRule::AnyPending,
        }
    }
}

/// SMTP relay settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Sender address, defaults to the SMTP user
    pub from: String,
    pub to: Vec<String>,
    pub tls: TlsMode,
}

impl SmtpConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port_raw = required(lookup, "SMTP_PORT")?;
        let user = required(lookup, "SMTP_USER")?;

        let to: Vec<String> = required(lookup, "EMAIL_TO")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if to.is_empty() {
            return Err(ConfigError::Missing("EMAIL_TO"));
        }

        Ok(Self {
            host: required(lookup, "SMTP_HOST")?,
            port: parse_value("SMTP_PORT", &port_raw)?,
            password: required(lookup, "SMTP_PASS")?,
            from: optional(lookup, "SMTP_FROM").unwrap_or_else(|| user.clone()),
            user,
            to,
            tls: parse_or(lookup, "SMTP_TLS", TlsMode::StartTls)?,
        })
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Transport security for the SMTP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS
    StartTls,
    /// Implicit TLS (usually port 465)
    Tls,
    /// No encryption, for local relays only
    None,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(TlsMode::StartTls),
            "tls" | "ssl" => Ok(TlsMode::Tls),
            "none" | "plain" => Ok(TlsMode::None),
            other => Err(format!(
                "expected starttls, tls or none, got '{}'",
                other
            )),
        }
    }
}

/// How a counter reading is compared to the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    Equals,
    AtLeast,
}

impl FromStr for AlertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equals" | "eq" => Ok(AlertMode::Equals),
            "at_least" | "gte" => Ok(AlertMode::AtLeast),
            other => Err(format!("expected equals or at_least, got '{}'", other)),
        }
    }
}

/// Where each cycle's reading comes from
#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// HTTP counter service
    Counter { host: String, path: String },
    /// Pending rows of the todo table
    Todos(MySqlConfig),
}

impl SourceConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = optional(lookup, "COUNTER_SVC_HOST") {
            let path = optional(lookup, "COUNTER_SVC_PATH")
                .unwrap_or_else(|| DEFAULT_COUNTER_PATH.to_string());
            let path = if path.starts_with('/') {
                path
            } else {
                format!("/{}", path)
            };
            return Ok(SourceConfig::Counter { host, path });
        }

        if optional(lookup, "MYSQL_HOST").is_none() {
            return Err(ConfigError::NoSource);
        }

        Ok(SourceConfig::Todos(MySqlConfig::from_lookup(lookup)?))
    }
}

/// Todo database connection settings
#[derive(Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl MySqlConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (host, port) = split_host_port(&required(lookup, "MYSQL_HOST")?)?;

        Ok(Self {
            host,
            port,
            database: required(lookup, "MYSQL_DATABASE")?,
            user: required(lookup, "MYSQL_USER")?,
            password: required(lookup, "MYSQL_PASSWORD")?,
        })
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Split `host[:port]`
fn split_host_port(raw: &str) -> Result<(String, u16), ConfigError> {
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            Ok((host.to_string(), parse_value("MYSQL_HOST", port)?))
        }
        Some(_) => Err(ConfigError::Invalid {
            var: "MYSQL_HOST",
            reason: format!("missing host in '{}'", raw),
        }),
        None => Ok((raw.to_string(), DEFAULT_MYSQL_PORT)),
    }
}

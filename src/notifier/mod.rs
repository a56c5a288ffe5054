//! Notifier service for threshold-based email alerts
//!
//! Polls a counter service or a todo table on a fixed interval and sends
//! an HTML email through SMTP when the configured rule fires.

pub mod checker;
pub mod config;
pub mod mailer;
pub mod source;

pub use checker::{AlertChecker, AlertRule, AlertState, CheckError, CheckOutcome};
pub use config::{AlertMode, MySqlConfig, NotifierConfig, SmtpConfig, SourceConfig, TlsMode};
pub use mailer::{Email, EmailTemplates, MailError, Mailer, SmtpMailer};
pub use source::{CountSource, HttpCounterSource, MySqlTodoSource, Reading, SourceError};

//! Email rendering and SMTP delivery

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use minijinja::{context, Environment};

use super::config::{SmtpConfig, TlsMode};

const MESSAGE_TEMPLATE: &str = include_str!("templates/message.html");
const PENDING_TEMPLATE: &str = include_str!("templates/pending.html");

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A rendered HTML email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub html_body: String,
}

/// Email templates, parsed once at startup
pub struct EmailTemplates {
    env: Environment<'static>,
}

impl EmailTemplates {
    pub fn load() -> Result<Self, MailError> {
        let mut env = Environment::new();
        env.add_template("message.html", MESSAGE_TEMPLATE)
            .map_err(|e| MailError::Template(e.to_string()))?;
        env.add_template("pending.html", PENDING_TEMPLATE)
            .map_err(|e| MailError::Template(e.to_string()))?;
        Ok(Self { env })
    }

    /// Alert sent when the counter satisfies the threshold
    pub fn counter_alert(&self, count: i64) -> Result<Email, MailError> {
        let message = format!("The counter has reached the target value of {}.", count);
        Ok(Email {
            subject: "Counter Alert!".to_string(),
            html_body: self.render("message.html", context! { message => message })?,
        })
    }

    /// Startup notice for the counter notifier
    pub fn welcome(&self, threshold: i64) -> Result<Email, MailError> {
        let message = format!(
            "Welcome! The notifier service is running and will alert you when the counter reaches {}.",
            threshold
        );
        Ok(Email {
            subject: "Notifier Service Started".to_string(),
            html_body: self.render("message.html", context! { message => message })?,
        })
    }

    /// Summary of unfinished todo titles
    pub fn pending_summary(
        &self,
        titles: &[String],
        now: DateTime<FixedOffset>,
    ) -> Result<Email, MailError> {
        Ok(Email {
            subject: format!(
                "Unfinished TODO List {}",
                now.format("%Y-%m-%d %H:%M:%S %:z")
            ),
            html_body: self.render("pending.html", context! { titles => titles })?,
        })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, MailError> {
        self.env
            .get_template(name)
            .and_then(|tmpl| tmpl.render(ctx))
            .map_err(|e| MailError::Template(e.to_string()))
    }
}

/// Delivery channel for rendered emails
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Mailer backed by an authenticated SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        let builder = match config.tls {
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from, to })
    }

    /// Assemble the MIME message for an email
    pub fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML);

        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(email.html_body.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        tracing::debug!(
            subject = %email.subject,
            recipients = self.to.len(),
            "Email delivered to relay"
        );

        Ok(())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, MailError> {
    raw.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Mail errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Message build error: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

//! Polling loop that evaluates readings and sends alerts

use std::future::Future;
use std::time::Duration;

use chrono::Local;
use tokio::time::{interval, MissedTickBehavior};

use super::mailer::{EmailTemplates, MailError, Mailer};
use super::source::{CountSource, Reading, SourceError};

/// Condition that decides whether a reading triggers an email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertRule {
    /// Trigger when count == target
    CountEquals(i64),
    /// Trigger when count >= threshold
    CountAtLeast(i64),
    /// Trigger when any pending item exists
    AnyPending,
}

impl AlertRule {
    /// Evaluate the rule against a reading
    pub fn evaluate(&self, reading: &Reading) -> Result<bool, CheckError> {
        match (self, reading) {
            (AlertRule::CountEquals(target), Reading::Count(count)) => Ok(count == target),
            (AlertRule::CountAtLeast(threshold), Reading::Count(count)) => Ok(count >= threshold),
            (AlertRule::AnyPending, Reading::Pending(titles)) => Ok(!titles.is_empty()),
            (rule, reading) => Err(CheckError::UnexpectedReading(format!(
                "{:?} cannot evaluate {:?}",
                rule, reading
            ))),
        }
    }

    /// Phrase completing "will alert you ..."
    pub fn describe(&self) -> String {
        match self {
            AlertRule::CountEquals(target) => format!("when the counter reaches {}", target),
            AlertRule::CountAtLeast(threshold) => {
                format!("when the counter reaches at least {}", threshold)
            }
            AlertRule::AnyPending => "when there are unfinished tasks".to_string(),
        }
    }
}

/// Current state of the checker
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    /// Whether the last successful check triggered
    pub firing: bool,
    /// Last check timestamp (unix millis)
    pub last_checked: Option<i64>,
    /// Last triggered timestamp (unix millis)
    pub last_triggered: Option<i64>,
    /// Number of consecutive triggering checks
    pub consecutive_fires: u32,
    /// Last error message
    pub last_error: Option<String>,
}

/// Result of one polling cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Condition did not hold, nothing sent
    Quiet { reading: Reading },
    /// Condition held and one email was sent
    Notified { reading: Reading },
}

/// Polls a source and mails an alert when the rule fires
pub struct AlertChecker {
    source: Box<dyn CountSource>,
    mailer: Box<dyn Mailer>,
    templates: EmailTemplates,
    rule: AlertRule,
    state: AlertState,
}

impl AlertChecker {
    pub fn new(
        source: Box<dyn CountSource>,
        mailer: Box<dyn Mailer>,
        templates: EmailTemplates,
        rule: AlertRule,
    ) -> Self {
        Self {
            source,
            mailer,
            templates,
            rule,
            state: AlertState::default(),
        }
    }

    pub fn rule(&self) -> AlertRule {
        self.rule
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Announce that the notifier is running. Only counter rules have a
    /// welcome message; returns whether an email went out.
    pub async fn send_welcome(&self) -> Result<bool, CheckError> {
        let threshold = match self.rule {
            AlertRule::CountEquals(threshold) | AlertRule::CountAtLeast(threshold) => threshold,
            AlertRule::AnyPending => {
                tracing::info!("No welcome email for the todo notifier");
                return Ok(false);
            }
        };

        let email = self.templates.welcome(threshold)?;
        self.mailer.send(&email).await?;
        Ok(true)
    }

    /// Run a single cycle: fetch, evaluate, notify
    pub async fn check_once(&mut self) -> Result<CheckOutcome, CheckError> {
        let result = self.check_inner().await;
        let now = chrono::Utc::now().timestamp_millis();
        self.state.last_checked = Some(now);

        match &result {
            Ok(CheckOutcome::Notified { .. }) => {
                self.state.firing = true;
                self.state.last_triggered = Some(now);
                self.state.consecutive_fires += 1;
                self.state.last_error = None;
            }
            Ok(CheckOutcome::Quiet { .. }) => {
                self.state.firing = false;
                self.state.consecutive_fires = 0;
                self.state.last_error = None;
            }
            Err(e) => {
                self.state.last_error = Some(e.to_string());
            }
        }

        result
    }

    async fn check_inner(&self) -> Result<CheckOutcome, CheckError> {
        let reading = self.source.fetch().await?;

        match &reading {
            Reading::Count(count) => tracing::info!(count, "Current counter value"),
            Reading::Pending(titles) => tracing::info!(pending = titles.len(), "Pending tasks"),
        }

        if !self.rule.evaluate(&reading)? {
            return Ok(CheckOutcome::Quiet { reading });
        }

        let email = match &reading {
            Reading::Count(count) => self.templates.counter_alert(*count)?,
            Reading::Pending(titles) => self
                .templates
                .pending_summary(titles, Local::now().fixed_offset())?,
        };

        self.mailer.send(&email).await?;
        Ok(CheckOutcome::Notified { reading })
    }

    /// Check immediately, then once per `every`, until `shutdown` resolves.
    /// Failed cycles are logged and skipped.
    pub async fn run<S>(mut self, every: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tracing::info!(
            source = %self.source.describe(),
            rule = ?self.rule,
            "Notifier started with interval {:?}",
            every
        );

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.check_once().await {
                        Ok(CheckOutcome::Notified { .. }) => {
                            tracing::info!(
                                consecutive_fires = self.state.consecutive_fires,
                                "Notification email sent"
                            );
                        }
                        Ok(CheckOutcome::Quiet { .. }) => {
                            tracing::info!(rule = %self.rule.describe(), "Condition not met, skipping email");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Check failed");
                        }
                    }
                    tracing::info!("Check complete. Sleeping for {:?}", every);
                }
                _ = &mut shutdown => {
                    tracing::info!("Notifier shutting down");
                    break;
                }
            }
        }
    }
}

/// Check errors
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Unexpected reading: {0}")]
    UnexpectedReading(String),
}

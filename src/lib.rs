//! Counterwatch: a toy counter web app and a polling email notifier
//!
//! Two independent services live in this crate:
//!
//! - **Counter app** (`counterwatch` binary): renders a page with a counter
//!   that can be incremented or reset through form posts. The value lives in
//!   a single mutex-guarded integer and is also exposed as JSON at
//!   `/api/counter`.
//! - **Notifier** (`notifier` binary): polls the counter service, or a MySQL
//!   todo table, and emails an alert over SMTP when a threshold is reached.
//!
//! # Example
//!
//! ```no_run
//! use counterwatch::notifier::{AlertRule, Reading};
//!
//! let rule = AlertRule::CountAtLeast(10);
//! assert!(rule.evaluate(&Reading::Count(12)).unwrap());
//! ```

pub mod api;
pub mod config;
pub mod counter;
pub mod notifier;

// Re-export commonly used types
pub use config::ConfigError;
pub use counter::{Counter, CounterAction};

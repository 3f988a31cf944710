//! Alerting for events that need a human: reverted settlements.

/// Slack alerts
pub mod slack;

pub use slack::SlackNotifier;

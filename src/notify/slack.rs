use std::time::Duration;

use eyre::{eyre, Result};
use reqwest::Client;
use serde_json::{json, Value};

/// Slack Web API endpoint for posting messages
const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Channel for routine messages
const DEFAULT_CHANNEL: &str = "#hopper";

/// Channel for capital-risk alerts
const ALERT_CHANNEL: &str = "#hopper-alerts";

/// Slack notifier
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    /// The Slack OAuth token
    token: String,
    /// The HTTP client
    client: Client,
}

impl SlackNotifier {
    /// Creates a notifier posting with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            token: token.into(),
            client,
        })
    }

    /// Notifier configured from `SLACK_OAUTH_TOKEN`, `None` if the variable is unset or empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var("SLACK_OAUTH_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Self::new(token).map(Some),
            _ => Ok(None),
        }
    }

    /// Send a message to a specific channel
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Slack rejects the message.
    pub async fn send_to(&self, msg: &str, channel: &str) -> Result<()> {
        let payload = json!({
            "channel": channel,
            "text": msg,
            "username": "Hopper",
            "icon_emoji": ":rabbit2:"
        });

        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?
            .json::<Value>()
            .await?;

        check_response(&response)
    }

    /// Send a message to the default channel
    ///
    /// # Errors
    ///
    /// See [`SlackNotifier::send_to`].
    pub async fn send(&self, msg: &str) -> Result<()> {
        self.send_to(msg, DEFAULT_CHANNEL).await
    }

    /// Send an alert to the alert channel
    ///
    /// # Errors
    ///
    /// See [`SlackNotifier::send_to`].
    pub async fn send_alert(&self, alert: &str) -> Result<()> {
        self.send_to(&format!(":rotating_light: {alert}"), ALERT_CHANNEL)
            .await
    }
}

/// Slack answers 200 with `ok: false` on API errors
fn check_response(response: &Value) -> Result<()> {
    if response["ok"].as_bool().unwrap_or(false) {
        return Ok(());
    }
    Err(eyre!(
        "Slack API error: {}",
        response["error"].as_str().unwrap_or("unknown error")
    ))
}

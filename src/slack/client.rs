//! Thin Slack Web API client.
//!
//! Covers exactly the calls the unfurler makes: `chat.postEphemeral`,
//! `chat.unfurl`, and posts to interaction `response_url`s.

use crate::config::{get_http_timeout_secs, Settings};
use crate::slack::blocks::Attachment;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Errors produced by Slack API calls
#[derive(Error, Debug)]
pub enum SlackError {
    /// The request never produced a usable response
    #[error("Slack API request failed: {0}")]
    Network(String),
    /// Slack answered `ok: false` or a response_url post failed
    #[error("Slack API method {method} returned an error: {error}")]
    Api {
        /// API method or `response_url`
        method: String,
        /// Slack's error code or status
        error: String,
    },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
}

/// Client for the Slack Web API
pub struct SlackClient {
    http: HttpClient,
    token: String,
}

impl SlackClient {
    /// Create a client with the configured bot token and a bounded timeout.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(get_http_timeout_secs()))
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self {
            http,
            token: settings.slack_bot_token.clone(),
        }
    }

    async fn call(&self, method: &str, body: &Value) -> Result<(), SlackError> {
        debug!("Calling Slack API method {method}");
        let response = self
            .http
            .post(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?;
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?;
        if parsed.ok {
            Ok(())
        } else {
            Err(SlackError::Api {
                method: method.to_string(),
                error: parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    /// Post an ephemeral message, visible only to `user` in `channel`.
    ///
    /// # Errors
    ///
    /// Returns a [`SlackError`] on transport failure or an `ok: false`
    /// answer.
    pub async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<(), SlackError> {
        self.call(
            "chat.postEphemeral",
            &json!({
                "channel": channel,
                "user": user,
                "text": text,
                "attachments": attachments,
            }),
        )
        .await
    }

    /// Attach unfurls to a previously posted message.
    ///
    /// # Errors
    ///
    /// Returns a [`SlackError`] on transport failure or an `ok: false`
    /// answer.
    pub async fn unfurl(
        &self,
        channel: &str,
        ts: &str,
        unfurls: &HashMap<String, Attachment>,
    ) -> Result<(), SlackError> {
        self.call(
            "chat.unfurl",
            &json!({
                "channel": channel,
                "ts": ts,
                "unfurls": unfurls,
            }),
        )
        .await
    }

    /// Post to an interaction `response_url` (replace/delete/augment the
    /// ephemeral prompt).
    ///
    /// # Errors
    ///
    /// Returns a [`SlackError`] on transport failure or a non-success
    /// status; response_url posts answer with plain text, not the API
    /// envelope.
    pub async fn respond(&self, response_url: &str, body: &Value) -> Result<(), SlackError> {
        let response = self
            .http
            .post(response_url)
            .json(body)
            .send()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SlackError::Api {
                method: "response_url".to_string(),
                error: status.to_string(),
            })
        }
    }
}

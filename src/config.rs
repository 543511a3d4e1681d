//! Configuration and settings management
//!
//! Loads settings from environment variables and config files, and defines
//! operational constants for the unfurler.

use config::{Config, ConfigError, Environment, File};
use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Application settings loaded from environment variables and config files
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Base URL of the Grafana instance used for rendering and metadata
    pub grafana_url: String,
    /// URL prefix a shared link must start with to be considered ours
    pub grafana_match_url: String,
    /// How long cached images are kept, e.g. "30d" (suffixes: s, m, h, d)
    pub grafana_retention: Option<String>,
    /// How often expired images are swept, e.g. "1d"
    pub grafana_cleanup_interval: Option<String>,
    /// Static headers sent with every Grafana request (auth cookie/token)
    #[serde(default)]
    pub grafana_headers: HashMap<String, String>,

    /// Rendered panel width in pixels
    #[serde(default = "default_render_width")]
    pub render_width: u32,
    /// Rendered panel height in pixels
    #[serde(default = "default_render_height")]
    pub render_height: u32,

    /// S3 bucket holding cached images
    pub s3_bucket: String,
    /// Key prefix under which images are stored
    pub s3_root: Option<String>,
    /// Custom S3 endpoint URL (e.g. an R2 or MinIO deployment)
    pub s3_endpoint_url: Option<String>,
    /// S3 region
    pub s3_region: Option<String>,
    /// Upload access key ID
    pub s3_access_key_id: Option<String>,
    /// Upload secret access key
    pub s3_secret_access_key: Option<String>,
    /// URL-signing access key ID (falls back to the upload key)
    pub s3_url_signing_access_key_id: Option<String>,
    /// URL-signing secret access key (falls back to the upload secret)
    pub s3_url_signing_secret_access_key: Option<String>,

    /// Slack bot token used for chat.postEphemeral / chat.unfurl
    pub slack_bot_token: String,
    /// Slack request signing secret (consumed by the verification middleware)
    pub slack_signing_secret: Option<String>,

    /// Address the webserver binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

const fn default_render_width() -> u32 {
    1000
}

const fn default_render_height() -> u32 {
    500
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// Default image retention when `grafana_retention` is unset
pub const DEFAULT_RETENTION: &str = "30d";
/// Default sweep interval when `grafana_cleanup_interval` is unset
pub const DEFAULT_CLEANUP_INTERVAL: &str = "1d";

/// Time-to-live for pending panel selections
pub const PENDING_SELECTION_TTL_SECS: u64 = 3600;
/// Maximum number of pending panel selections held at once
pub const PENDING_SELECTION_MAX_ENTRIES: u64 = 10_000;

/// Upper bound on upstream error text included in render errors
pub const RENDER_ERROR_SNIPPET_CHARS: usize = 30;

/// Timeout applied to outbound HTTP requests (render, metadata, Slack).
///
/// Overridable via the `HTTP_TIMEOUT_SECS` environment variable.
#[must_use]
pub fn get_http_timeout_secs() -> u64 {
    std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
}

/// Retention parameters resolved once at startup
#[derive(Debug, Clone, Copy)]
pub struct RetentionWindow {
    /// Duration after which a cached image is eligible for deletion
    pub retention: Duration,
    /// Interval between sweeper runs
    pub cleanup_interval: Duration,
}

/// Duration strings are a number followed by a unit suffix
static RE_DURATION: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^(\d+)(s|m|h|d)$");

/// Parse a duration like "30d" or "90s" into a [`Duration`].
///
/// Allowed suffixes are "s" (seconds), "m" (minutes), "h" (hours), "d" (days).
///
/// # Errors
///
/// Returns a `ConfigError` if the string is not a number followed by a
/// recognized suffix.
pub fn parse_duration(value: &str, path: &str) -> Result<Duration, ConfigError> {
    let caps = RE_DURATION.captures(value).ok_or_else(|| {
        ConfigError::Message(format!(
            "the duration '{value}' specified at {path} must be a number followed by a suffix (s, m, h, d)"
        ))
    })?;
    let qty: u64 = caps[1]
        .parse()
        .map_err(|e| ConfigError::Message(format!("invalid duration quantity at {path}: {e}")))?;
    let multiplier = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86400,
    };
    Ok(Duration::from_secs(qty * multiplier))
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use grafana_unfurl::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Grafana base URL, normalized to end with a slash
    #[must_use]
    pub fn grafana_base(&self) -> String {
        ensure_trailing_slash(&self.grafana_url)
    }

    /// Match prefix for shared links, normalized to end with a slash
    #[must_use]
    pub fn match_prefix(&self) -> String {
        ensure_trailing_slash(&self.grafana_match_url)
    }

    /// Storage key prefix: no leading slash, trailing slash when non-empty
    #[must_use]
    pub fn s3_root_prefix(&self) -> String {
        let trimmed = self
            .s3_root
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            ensure_trailing_slash(trimmed)
        }
    }

    /// URL-signing credentials, falling back to the upload credentials
    #[must_use]
    pub fn signing_credentials(&self) -> (Option<&str>, Option<&str>) {
        (
            self.s3_url_signing_access_key_id
                .as_deref()
                .or(self.s3_access_key_id.as_deref()),
            self.s3_url_signing_secret_access_key
                .as_deref()
                .or(self.s3_secret_access_key.as_deref()),
        )
    }

    /// Resolve the retention window from the duration config strings.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if either duration string is malformed.
    pub fn retention_window(&self) -> Result<RetentionWindow, ConfigError> {
        let retention = parse_duration(
            self.grafana_retention
                .as_deref()
                .unwrap_or(DEFAULT_RETENTION),
            "grafana_retention",
        )?;
        let cleanup_interval = parse_duration(
            self.grafana_cleanup_interval
                .as_deref()
                .unwrap_or(DEFAULT_CLEANUP_INTERVAL),
            "grafana_cleanup_interval",
        )?;
        Ok(RetentionWindow {
            retention,
            cleanup_interval,
        })
    }

    /// Returns a copy of the settings with credential fields masked,
    /// suitable for startup debug logging.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.s3_access_key_id = mask_if_set(&masked.s3_access_key_id);
        masked.s3_secret_access_key = mask_if_set(&masked.s3_secret_access_key);
        masked.s3_url_signing_access_key_id = mask_if_set(&masked.s3_url_signing_access_key_id);
        masked.s3_url_signing_secret_access_key =
            mask_if_set(&masked.s3_url_signing_secret_access_key);
        masked.slack_bot_token = "XXXX".to_string();
        masked.slack_signing_secret = mask_if_set(&masked.slack_signing_secret);
        for key in ["Cookie", "Authorization"] {
            if let Some(value) = masked.grafana_headers.get_mut(key) {
                "XXXX".clone_into(value);
            }
        }
        masked
    }
}

fn mask_if_set(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|_| "XXXX".to_string())
}

fn ensure_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

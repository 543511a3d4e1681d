//! Dashboard metadata lookup against the Grafana HTTP API.
//!
//! Metadata is enrichment only: callers treat a failed lookup as a
//! degradation (placeholder titles), never as a hard failure.

use crate::config::{get_http_timeout_secs, Settings};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors produced while fetching dashboard metadata
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The request never produced a response
    #[error("dashboard metadata request to {url} failed: {message}")]
    Network {
        /// Request URL
        url: String,
        /// Transport error description
        message: String,
    },
    /// Grafana answered with a non-success status
    #[error("Grafana API returned {status} for {url}")]
    Status {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },
    /// The response body did not match the expected shape
    #[error("unable to decode dashboard metadata from {url}: {message}")]
    Decode {
        /// Request URL
        url: String,
        /// Deserialization error description
        message: String,
    },
}

/// A dashboard as reported by `api/dashboards/uid/{uid}`
#[derive(Debug, Clone, Deserialize)]
pub struct Dashboard {
    /// Numeric dashboard id
    pub id: Option<i64>,
    /// Dashboard title
    pub title: String,
    /// Panels on the dashboard
    #[serde(default)]
    pub panels: Vec<Panel>,
}

/// A single panel on a dashboard
#[derive(Debug, Clone, Deserialize)]
pub struct Panel {
    /// Panel id, referenced by render URLs
    pub id: u64,
    /// Panel title shown in prompts and attachments
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    dashboard: Dashboard,
}

/// Client for the Grafana metadata API
pub struct GrafanaApi {
    http: HttpClient,
    base_url: String,
}

impl GrafanaApi {
    /// Create a metadata client carrying the configured static headers.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(get_http_timeout_secs()))
            .default_headers(super::static_headers(&settings.grafana_headers))
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self {
            http,
            base_url: settings.grafana_base(),
        }
    }

    /// Fetch a dashboard's metadata by uid.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] on transport failure, a non-success
    /// status, or an unexpected response shape.
    pub async fn dashboard(&self, uid: &str) -> Result<Dashboard, MetadataError> {
        let api_url = format!("{}api/dashboards/uid/{uid}", self.base_url);
        debug!("Fetching dashboard metadata from {api_url}");

        let response = self
            .http
            .get(&api_url)
            .send()
            .await
            .map_err(|e| MetadataError::Network {
                url: api_url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url: api_url,
                status: status.as_u16(),
            });
        }

        let body: DashboardResponse =
            response.json().await.map_err(|e| MetadataError::Decode {
                url: api_url.clone(),
                message: e.to_string(),
            })?;
        Ok(body.dashboard)
    }
}

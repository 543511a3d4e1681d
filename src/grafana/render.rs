//! Panel image fetching via the Grafana render API.
//!
//! Single GET, no retries, no redirects: a redirect from the render
//! endpoint means the request hit a login flow instead of the renderer.

use crate::config::{get_http_timeout_secs, Settings, RENDER_ERROR_SNIPPET_CHARS};
use crate::grafana::url::{panel_image_url, ParseError, PanelUrl};
use crate::utils::truncate_str;
use bytes::Bytes;
use reqwest::redirect::Policy;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors produced while rendering a panel image
#[derive(Error, Debug)]
pub enum RenderError {
    /// The configured base URL does not combine into a render URL
    #[error("invalid render URL: {0}")]
    InvalidUrl(#[from] ParseError),
    /// The render request exceeded the configured timeout
    #[error("render request to {url} timed out")]
    Timeout {
        /// Render URL
        url: String,
    },
    /// The request failed at the transport level
    #[error("render request to {url} failed: {message}")]
    Network {
        /// Render URL
        url: String,
        /// Transport error description
        message: String,
    },
    /// The render endpoint answered with a redirect (auth misconfiguration)
    #[error("Grafana redirected the render request for {url}, check render auth configuration")]
    Redirected {
        /// Render URL
        url: String,
    },
    /// The render endpoint answered with a non-success status
    #[error("Grafana returned an error when rendering {url}: {snippet}...")]
    Upstream {
        /// Render URL
        url: String,
        /// Truncated upstream error text
        snippet: String,
    },
}

/// Fetches rendered panel images
pub struct Renderer {
    http: HttpClient,
    settings: Arc<Settings>,
}

impl Renderer {
    /// Create a renderer with a bounded timeout and redirects disabled.
    #[must_use]
    pub fn new(settings: Arc<Settings>) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(get_http_timeout_secs()))
            .redirect(Policy::none())
            .default_headers(super::static_headers(&settings.grafana_headers))
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { http, settings }
    }

    /// Render a panel to image bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] on timeout, transport failure, a redirect,
    /// or a non-success status. Upstream error bodies are truncated so
    /// large render service errors never leak to callers.
    pub async fn render(&self, panel: &PanelUrl) -> Result<Bytes, RenderError> {
        let image_url = panel_image_url(&self.settings, panel)?;
        debug!("Caching {image_url}");

        let response = self
            .http
            .get(image_url.clone())
            .send()
            .await
            .map_err(|e| transport_error(image_url.as_str(), &e))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(RenderError::Redirected {
                url: image_url.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet = if body.trim().is_empty() {
                status.to_string()
            } else {
                truncate_str(body.trim(), RENDER_ERROR_SNIPPET_CHARS)
            };
            return Err(RenderError::Upstream {
                url: image_url.to_string(),
                snippet,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| transport_error(image_url.as_str(), &e))
    }
}

fn transport_error(url: &str, e: &reqwest::Error) -> RenderError {
    if e.is_timeout() {
        RenderError::Timeout {
            url: url.to_string(),
        }
    } else {
        RenderError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_snippet_is_bounded() {
        let err = RenderError::Upstream {
            url: "https://grafana.internal/render/d-solo/a/b".to_string(),
            snippet: truncate_str("x".repeat(500), RENDER_ERROR_SNIPPET_CHARS),
        };
        let message = err.to_string();
        // 30 chars of body plus the fixed framing, never the full 500
        assert!(message.len() < 200);
        assert!(message.ends_with("..."));
    }
}

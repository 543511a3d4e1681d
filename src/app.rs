//! Shared application state wired once at startup.

use crate::config::Settings;
use crate::grafana::api::GrafanaApi;
use crate::grafana::render::Renderer;
use crate::pending::PendingSelections;
use crate::slack::client::SlackClient;
use crate::storage::ImageStore;
use std::sync::Arc;

/// Everything a request handler needs, injected behind an `Arc`
pub struct App {
    /// Application settings
    pub settings: Arc<Settings>,
    /// Dashboard metadata client
    pub grafana: GrafanaApi,
    /// Panel image renderer
    pub renderer: Renderer,
    /// Image cache store
    pub store: Arc<ImageStore>,
    /// Pending panel selections
    pub pending: PendingSelections,
    /// Slack Web API client
    pub slack: SlackClient,
}

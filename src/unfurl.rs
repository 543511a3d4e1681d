//! The URL-to-cached-image pipeline.
//!
//! Composes the parser, metadata lookup, renderer, and cache store into
//! the flow both the chat-event handler and the direct cache endpoint
//! drive. Metadata failures degrade to placeholder titles; only the
//! render/cache legs are hard failures.

use crate::app::App;
use crate::grafana::api::Dashboard;
use crate::grafana::render::RenderError;
use crate::grafana::url::{parse_url, DashboardUrl, ParseError, PanelUrl};
use crate::pending::PendingSelections;
use crate::slack::blocks::{panel_attachment, panel_selector, Attachment};
use crate::storage::StorageError;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

/// Errors produced by the unfurl pipeline
#[derive(Error, Debug)]
pub enum UnfurlError {
    /// The link matched our prefix but is malformed
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The render service failed
    #[error(transparent)]
    Render(#[from] RenderError),
    /// The cache store failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A selection prompt waiting to be posted
#[derive(Debug, Clone)]
pub struct PanelPrompt {
    /// Token under which the pending selection will be stored
    pub token: String,
    /// The prompt attachment to post ephemerally
    pub attachment: Attachment,
}

/// Outcome of driving the pipeline for one link
#[derive(Debug, Clone)]
pub enum Unfurled {
    /// The panel was rendered and cached; attach this to the message
    Attachment(Attachment),
    /// The dashboard is ambiguous; ask the user to pick a panel
    Prompt(PanelPrompt),
    /// Nothing to do: not our link, or no way to resolve a panel
    Skipped,
}

/// Drive the pipeline for one shared link.
///
/// `panel_id` overrides any panel named in the URL; the selection flow
/// passes the user's choice here.
///
/// # Errors
///
/// Returns an [`UnfurlError`] if the link is malformed or the
/// render/cache leg fails. A failed metadata lookup is not an error;
/// titles degrade and, when no panel can be resolved at all, the result
/// is [`Unfurled::Skipped`].
pub async fn unfurl_url(
    app: &App,
    raw_url: &str,
    panel_id: Option<u64>,
) -> Result<Unfurled, UnfurlError> {
    let Some(parsed) = parse_url(&app.settings.match_prefix(), raw_url)? else {
        return Ok(Unfurled::Skipped);
    };
    let (dashboard_url, url_panel_id) = parsed.into_parts();

    let dashboard = match app.grafana.dashboard(&dashboard_url.dashboard_uid).await {
        Ok(dashboard) => Some(dashboard),
        Err(e) => {
            error!("{e}");
            None
        }
    };

    if let Some(panel_id) = panel_id.or(url_panel_id) {
        let attachment =
            render_and_attach(app, dashboard.as_ref(), dashboard_url, panel_id).await?;
        return Ok(Unfurled::Attachment(attachment));
    }

    let Some(dashboard) = dashboard else {
        warn!("Posted link {raw_url} contains no panel id and the dashboard api request failed");
        return Ok(Unfurled::Skipped);
    };

    match dashboard.panels.as_slice() {
        [] => {
            debug!(
                "No panels found on dashboard {} for link {raw_url}, skipping",
                dashboard.title
            );
            Ok(Unfurled::Skipped)
        }
        [panel] => {
            let panel_id = panel.id;
            let attachment =
                render_and_attach(app, Some(&dashboard), dashboard_url, panel_id).await?;
            Ok(Unfurled::Attachment(attachment))
        }
        _ => {
            let token = PendingSelections::generate_token();
            let attachment = panel_selector(&dashboard, &token);
            Ok(Unfurled::Prompt(PanelPrompt { token, attachment }))
        }
    }
}

async fn render_and_attach(
    app: &App,
    dashboard: Option<&Dashboard>,
    dashboard_url: DashboardUrl,
    panel_id: u64,
) -> Result<Attachment, UnfurlError> {
    let panel_title = dashboard
        .and_then(|d| d.panels.iter().find(|p| p.id == panel_id))
        .map(|p| p.title.as_str());
    let panel = PanelUrl {
        dashboard: dashboard_url,
        panel_id,
    };
    let image_url = create_image(app, &panel).await?;
    Ok(panel_attachment(
        &image_url,
        dashboard.map(|d| d.title.as_str()),
        panel_title,
    ))
}

/// Render a panel, cache the image, and return the signed retrieval URL.
///
/// # Errors
///
/// Returns an [`UnfurlError`] if rendering, the upload, or presigning
/// fails.
pub async fn create_image(app: &App, panel: &PanelUrl) -> Result<Url, UnfurlError> {
    let image = app.renderer.render(panel).await?;
    let key = app.store.put_image(image, "image/png").await?;
    Ok(app.store.signed_url(&key).await?)
}

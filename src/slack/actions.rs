//! Interactive-component handlers: panel selection and prompt removal.
//!
//! The selection token rides in the component's block id. Consumption is
//! exactly-once: the pending entry is atomically removed before the
//! render starts, so two clicks racing on the same prompt cannot both
//! render.

use crate::app::App;
use crate::slack::blocks::block_id_token;
use crate::unfurl::{unfurl_url, Unfurled};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, error};

/// An interactive-component callback payload
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionPayload {
    /// The actions the user took; this service expects exactly one
    pub actions: Vec<InteractionAction>,
    /// URL for replacing or deleting the ephemeral prompt
    pub response_url: String,
}

/// A single action within an interaction payload
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionAction {
    /// Which component was used
    pub action_id: String,
    /// Block id carrying the selection token
    pub block_id: String,
    /// The chosen option, present for select menus
    pub selected_option: Option<SelectedOption>,
}

/// The chosen option of a select menu
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOption {
    /// Option value: the panel id as a string
    pub value: String,
}

/// Handle a `panel_select` interaction.
///
/// Failures are logged and reported back to the requesting user through
/// the `response_url`, best-effort.
pub async fn handle_panel_select(app: &App, payload: InteractionPayload) {
    if let Err(e) = run_panel_select(app, &payload).await {
        error!("Panel selection failed: {e:#}");
        report_failure(app, &payload.response_url, &e).await;
    }
}

/// Handle a `panel_select_remove` interaction.
///
/// Failures are logged and reported back to the requesting user through
/// the `response_url`, best-effort.
pub async fn handle_panel_select_remove(app: &App, payload: InteractionPayload) {
    if let Err(e) = run_panel_select_remove(app, &payload).await {
        error!("Panel selector removal failed: {e:#}");
        report_failure(app, &payload.response_url, &e).await;
    }
}

async fn run_panel_select(app: &App, payload: &InteractionPayload) -> Result<()> {
    debug!("Panel selection payload received: {payload:?}");
    let action = single_action(payload)?;
    let selected = action
        .selected_option
        .as_ref()
        .ok_or_else(|| anyhow!("received unexpected action in payload for panel_select"))?;
    let token = block_id_token(&action.block_id)
        .ok_or_else(|| anyhow!("action block id carries no selection token"))?;
    let panel_id: u64 = selected
        .value
        .parse()
        .context("selected panel id is not numeric")?;

    // Consume the token before rendering: at most one click wins
    let pending = app.pending.take(token).await?;

    app.slack
        .respond(
            &payload.response_url,
            &json!({
                "replace_original": true,
                "text": "Generating the image...",
                "response_type": "ephemeral",
            }),
        )
        .await?;

    let raw_url = html_escape::decode_html_entities(&pending.encoded_url).into_owned();
    let Unfurled::Attachment(attachment) = unfurl_url(app, &raw_url, Some(panel_id)).await? else {
        return Err(anyhow!(
            "unable to unfurl URL for selected panel {panel_id} on URL {raw_url}"
        ));
    };

    let mut unfurls = HashMap::new();
    unfurls.insert(pending.encoded_url.clone(), attachment);
    let delete_body = json!({"delete_original": true, "response_type": "ephemeral"});
    let delete_prompt = app.slack.respond(&payload.response_url, &delete_body);
    let post_unfurl = app
        .slack
        .unfurl(&pending.channel, &pending.message_ts, &unfurls);
    let (deleted, unfurled) = tokio::join!(delete_prompt, post_unfurl);
    deleted?;
    unfurled?;
    Ok(())
}

async fn run_panel_select_remove(app: &App, payload: &InteractionPayload) -> Result<()> {
    debug!("Panel selector removal payload received: {payload:?}");
    let action = single_action(payload)?;

    app.slack
        .respond(
            &payload.response_url,
            &json!({"delete_original": true, "response_type": "ephemeral"}),
        )
        .await?;

    let token = block_id_token(&action.block_id)
        .ok_or_else(|| anyhow!("action block id carries no selection token"))?;
    app.pending.take(token).await?;
    Ok(())
}

fn single_action(payload: &InteractionPayload) -> Result<&InteractionAction> {
    match payload.actions.as_slice() {
        [action] => Ok(action),
        _ => Err(anyhow!(
            "received {} actions in interaction payload, expected exactly one",
            payload.actions.len()
        )),
    }
}

async fn report_failure(app: &App, response_url: &str, error: &anyhow::Error) {
    let body = json!({
        "replace_original": false,
        "response_type": "ephemeral",
        "text": format!("{error:#}"),
    });
    if let Err(e) = app.slack.respond(response_url, &body).await {
        error!("Failed to report interaction error to user: {e}");
    }
}

//! Slack event payloads and the link_shared pipeline.
//!
//! Each link in an event is processed independently and concurrently; a
//! bad link never breaks its siblings. Links that resolve directly are
//! aggregated into one `chat.unfurl` call, links that need
//! disambiguation post their prompt as soon as it is ready.

use crate::app::App;
use crate::pending::PendingSelection;
use crate::slack::blocks::Attachment;
use crate::unfurl::{unfurl_url, Unfurled};
use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error};

/// Top-level Events API envelope
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    /// Slack's endpoint ownership handshake
    UrlVerification {
        /// Challenge string to echo back
        challenge: String,
    },
    /// A workspace event wrapped in the callback envelope
    EventCallback {
        /// The inner event
        event: CallbackEvent,
    },
    /// Any other envelope type; acknowledged and ignored
    #[serde(other)]
    Other,
}

/// Workspace events this service consumes
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackEvent {
    /// One or more links matching our domain were shared
    LinkShared(LinkSharedEvent),
    /// Any other event type; acknowledged and ignored
    #[serde(other)]
    Other,
}

/// A `link_shared` event
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSharedEvent {
    /// Channel the links were shared in
    pub channel: String,
    /// User who shared them
    pub user: String,
    /// Timestamp of the sharing message
    pub message_ts: String,
    /// The shared links
    pub links: Vec<SharedLink>,
}

/// One shared link within a `link_shared` event
#[derive(Debug, Clone, Deserialize)]
pub struct SharedLink {
    /// The link, HTML-entity encoded as Slack delivers it
    pub url: String,
}

/// Process a `link_shared` event end to end.
///
/// Never returns an error: every failure is logged and scoped to the
/// link (or the final batched unfurl call) that caused it.
pub async fn handle_link_shared(app: &App, event: &LinkSharedEvent) {
    debug!("Link shared event received: {event:?}");

    let results = join_all(
        event
            .links
            .iter()
            .map(|link| handle_link(app, event, link)),
    )
    .await;
    let unfurls: HashMap<String, Attachment> = results.into_iter().flatten().collect();

    if unfurls.is_empty() {
        return;
    }
    debug!("Unfurling {} links", unfurls.len());
    if let Err(e) = app
        .slack
        .unfurl(&event.channel, &event.message_ts, &unfurls)
        .await
    {
        error!("Failed to post unfurls: {e}");
    }
}

/// Drive one link through the pipeline, posting a selection prompt if the
/// dashboard is ambiguous. Returns the attachment keyed by the original
/// (still encoded) link for the batched unfurl call.
async fn handle_link(
    app: &App,
    event: &LinkSharedEvent,
    link: &SharedLink,
) -> Option<(String, Attachment)> {
    let raw_url = html_escape::decode_html_entities(&link.url).into_owned();
    match unfurl_url(app, &raw_url, None).await {
        Ok(Unfurled::Attachment(attachment)) => Some((link.url.clone(), attachment)),
        Ok(Unfurled::Prompt(prompt)) => {
            let posted = app
                .slack
                .post_ephemeral(
                    &event.channel,
                    &event.user,
                    " ",
                    std::slice::from_ref(&prompt.attachment),
                )
                .await;
            match posted {
                Ok(()) => {
                    app.pending
                        .insert(
                            prompt.token,
                            PendingSelection {
                                encoded_url: link.url.clone(),
                                channel: event.channel.clone(),
                                message_ts: event.message_ts.clone(),
                            },
                        )
                        .await;
                }
                Err(e) => error!("Failed to post panel selection prompt: {e}"),
            }
            None
        }
        Ok(Unfurled::Skipped) => None,
        Err(e) => {
            error!("Failed to unfurl {raw_url}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_verification_envelope() {
        let body = r#"{"type": "url_verification", "challenge": "abc123"}"#;
        let envelope: EventEnvelope = serde_json::from_str(body).expect("decode");
        match envelope {
            EventEnvelope::UrlVerification { challenge } => assert_eq!(challenge, "abc123"),
            other => panic!("expected url_verification, got {other:?}"),
        }
    }

    #[test]
    fn test_link_shared_envelope() {
        let body = r#"{
            "type": "event_callback",
            "team_id": "T123",
            "event": {
                "type": "link_shared",
                "channel": "C123",
                "user": "U123",
                "message_ts": "1700000000.000100",
                "links": [
                    {"url": "https://g.example/d/abc/name?orgId=1&amp;panelId=7", "domain": "g.example"}
                ]
            }
        }"#;
        let envelope: EventEnvelope = serde_json::from_str(body).expect("decode");
        let EventEnvelope::EventCallback {
            event: CallbackEvent::LinkShared(event),
        } = envelope
        else {
            panic!("expected link_shared callback");
        };
        assert_eq!(event.channel, "C123");
        assert_eq!(event.links.len(), 1);
        assert!(event.links[0].url.contains("&amp;"));
    }

    #[test]
    fn test_unknown_event_types_are_tolerated() {
        let envelope: EventEnvelope =
            serde_json::from_str(r#"{"type": "app_rate_limited"}"#).expect("decode");
        assert!(matches!(envelope, EventEnvelope::Other));

        let body = r#"{
            "type": "event_callback",
            "event": {"type": "reaction_added"}
        }"#;
        let envelope: EventEnvelope = serde_json::from_str(body).expect("decode");
        assert!(matches!(
            envelope,
            EventEnvelope::EventCallback {
                event: CallbackEvent::Other
            }
        ));
    }

    #[test]
    fn test_entity_decoding_of_shared_urls() {
        let encoded = "https://g.example/d/abc/name?orgId=1&amp;panelId=7";
        let decoded = html_escape::decode_html_entities(encoded);
        assert_eq!(decoded, "https://g.example/d/abc/name?orgId=1&panelId=7");
    }
}

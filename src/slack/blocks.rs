//! Block Kit payload types and the attachment builders used by unfurls.
//!
//! Only the shapes this service actually posts are modeled; serialization
//! must match Slack's wire format exactly.

use crate::grafana::api::Dashboard;
use serde::Serialize;
use url::Url;

/// A text object, either `plain_text` or `mrkdwn`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Text {
    /// Text type discriminator
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// The text content
    pub text: String,
    /// Whether emoji shortcodes are rendered (plain_text only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

impl Text {
    /// A `plain_text` object.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: "plain_text",
            text: text.into(),
            emoji: None,
        }
    }

    /// A `mrkdwn` object.
    #[must_use]
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: "mrkdwn",
            text: text.into(),
            emoji: None,
        }
    }
}

/// One choice in a static select menu
#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    /// Option label
    pub text: Text,
    /// Option value delivered back in the interaction payload
    pub value: String,
}

/// A static select menu element
#[derive(Debug, Clone, Serialize)]
pub struct StaticSelect {
    /// Element type discriminator
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Action id delivered back in the interaction payload
    pub action_id: String,
    /// Placeholder shown before a choice is made
    pub placeholder: Text,
    /// The selectable options
    pub options: Vec<SelectOption>,
}

/// A button element
#[derive(Debug, Clone, Serialize)]
pub struct Button {
    /// Element type discriminator
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Action id delivered back in the interaction payload
    pub action_id: String,
    /// Button label
    pub text: Text,
}

/// The Block Kit blocks this service posts
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Block {
    /// An image block carrying the rendered panel
    #[serde(rename = "image")]
    Image {
        /// Signed URL of the cached image
        image_url: String,
        /// Accessibility text
        alt_text: String,
        /// Title shown above the image
        title: Text,
    },
    /// A section block carrying the panel select menu
    #[serde(rename = "section")]
    Section {
        /// Prompt text
        text: Text,
        /// Block id carrying the selection token
        block_id: String,
        /// The select menu
        accessory: StaticSelect,
    },
    /// An actions block carrying the cancel button
    #[serde(rename = "actions")]
    Actions {
        /// Block id carrying the selection token
        block_id: String,
        /// The buttons
        elements: Vec<Button>,
    },
}

/// A message attachment: a list of blocks
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    /// The attachment's blocks
    pub blocks: Vec<Block>,
}

/// Build the unfurl attachment for a rendered panel.
///
/// Missing titles degrade to literal placeholders rather than failing.
#[must_use]
pub fn panel_attachment(
    image_url: &Url,
    dashboard_title: Option<&str>,
    panel_title: Option<&str>,
) -> Attachment {
    let dashboard_title = dashboard_title.unwrap_or("unknown dashboard");
    let panel_title = panel_title.unwrap_or("unknown panel");
    Attachment {
        blocks: vec![Block::Image {
            image_url: image_url.to_string(),
            alt_text: format!("{panel_title} on {dashboard_title}"),
            title: Text::plain(panel_title),
        }],
    }
}

/// Build the panel selection prompt for a multi-panel dashboard.
///
/// The selection token rides in the block ids so the interaction payload
/// can find its pending state again.
#[must_use]
pub fn panel_selector(dashboard: &Dashboard, token: &str) -> Attachment {
    let options = dashboard
        .panels
        .iter()
        .map(|panel| SelectOption {
            text: Text::plain(&panel.title),
            value: panel.id.to_string(),
        })
        .collect();
    Attachment {
        blocks: vec![
            Block::Section {
                text: Text::mrkdwn(format!(
                    "The dashboard \"{}\" has multiple panels, please select which one you would like to show as a preview",
                    dashboard.title
                )),
                block_id: format!("panel_select:{token}"),
                accessory: StaticSelect {
                    kind: "static_select",
                    action_id: "panel_select".to_string(),
                    placeholder: Text::plain("Select a panel"),
                    options,
                },
            },
            Block::Actions {
                block_id: format!("panel_select_remove:{token}"),
                elements: vec![Button {
                    kind: "button",
                    action_id: "panel_select_remove".to_string(),
                    text: Text {
                        kind: "plain_text",
                        text: ":x: Remove".to_string(),
                        emoji: Some(true),
                    },
                }],
            },
        ],
    }
}

/// Extract the selection token from a block id like `panel_select:{token}`.
///
/// Everything after the first colon is the token, which may itself
/// contain colons (base64).
#[must_use]
pub fn block_id_token(block_id: &str) -> Option<&str> {
    block_id.splitn(2, ':').nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grafana::api::Panel;
    use serde_json::json;

    #[test]
    fn test_panel_attachment_shape() {
        let url = Url::parse("https://cache.example/grafana/20240102030405006.png?sig=x")
            .expect("url");
        let attachment = panel_attachment(&url, Some("My dash"), Some("Errors"));
        assert_eq!(
            serde_json::to_value(&attachment).expect("serialize"),
            json!({
                "blocks": [{
                    "type": "image",
                    "image_url": "https://cache.example/grafana/20240102030405006.png?sig=x",
                    "alt_text": "Errors on My dash",
                    "title": {"type": "plain_text", "text": "Errors"}
                }]
            })
        );
    }

    #[test]
    fn test_panel_attachment_placeholder_titles() {
        let url = Url::parse("https://cache.example/i.png").expect("url");
        let attachment = panel_attachment(&url, None, None);
        let value = serde_json::to_value(&attachment).expect("serialize");
        assert_eq!(
            value["blocks"][0]["alt_text"],
            "unknown panel on unknown dashboard"
        );
        assert_eq!(value["blocks"][0]["title"]["text"], "unknown panel");
    }

    #[test]
    fn test_panel_selector_shape() {
        let dashboard = Dashboard {
            id: Some(1),
            title: "My dash".to_string(),
            panels: vec![
                Panel {
                    id: 2,
                    title: "Requests".to_string(),
                },
                Panel {
                    id: 7,
                    title: "Errors".to_string(),
                },
            ],
        };
        let value =
            serde_json::to_value(panel_selector(&dashboard, "tok123")).expect("serialize");

        assert_eq!(value["blocks"][0]["type"], "section");
        assert_eq!(value["blocks"][0]["block_id"], "panel_select:tok123");
        assert_eq!(
            value["blocks"][0]["accessory"]["action_id"],
            "panel_select"
        );
        assert_eq!(
            value["blocks"][0]["accessory"]["options"],
            json!([
                {"text": {"type": "plain_text", "text": "Requests"}, "value": "2"},
                {"text": {"type": "plain_text", "text": "Errors"}, "value": "7"}
            ])
        );
        assert_eq!(value["blocks"][1]["type"], "actions");
        assert_eq!(value["blocks"][1]["block_id"], "panel_select_remove:tok123");
        assert_eq!(
            value["blocks"][1]["elements"][0]["action_id"],
            "panel_select_remove"
        );
        assert_eq!(value["blocks"][1]["elements"][0]["text"]["emoji"], true);
    }

    #[test]
    fn test_block_id_token_extraction() {
        assert_eq!(block_id_token("panel_select:abc"), Some("abc"));
        // Base64 tokens can contain further separators
        assert_eq!(block_id_token("panel_select:a:b=="), Some("a:b=="));
        assert_eq!(block_id_token("panel_select"), None);
    }
}

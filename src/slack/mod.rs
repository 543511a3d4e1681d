//! Slack integration: Block Kit payloads, the Web API client, and the
//! event/interaction handlers.

/// Interactive-component (panel selection) handlers
pub mod actions;
/// Block Kit types and attachment builders
pub mod blocks;
/// Slack Web API client
pub mod client;
/// Event payload types and the link_shared pipeline
pub mod events;

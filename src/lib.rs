#![deny(missing_docs)]
//! Grafana link unfurler for Slack.
//!
//! Parses shared dashboard links, renders the referenced panel through
//! Grafana's render API, caches the image in object storage behind a
//! signed URL, and answers with a rich unfurl, asking the user to pick
//! a panel when the dashboard has several.

/// Shared application state.
pub mod app;
/// Background deletion of expired cached images.
pub mod cleanup;
/// Configuration management.
pub mod config;
/// Grafana integration: parsing, metadata, rendering.
pub mod grafana;
/// Ephemeral pending-selection state.
pub mod pending;
/// HTTP surface.
pub mod server;
/// Slack integration.
pub mod slack;
/// Object storage for cached images.
pub mod storage;
/// The URL-to-cached-image pipeline.
pub mod unfurl;
/// Small shared helpers.
pub mod utils;

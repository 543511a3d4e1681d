//! Grafana integration: link parsing, metadata lookup, panel rendering.

/// Dashboard metadata client
pub mod api;
/// Panel image fetching via the render API
pub mod render;
/// Link parsing and render URL construction
pub mod url;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use tracing::warn;

/// Build the static header set sent with every Grafana request.
///
/// Malformed header names or values are skipped with a warning rather than
/// failing startup.
pub(crate) fn static_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let parsed_name = name.parse::<HeaderName>();
        let parsed_value = value.parse::<HeaderValue>();
        match (parsed_name, parsed_value) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!("Ignoring malformed Grafana header {name}"),
        }
    }
    map
}

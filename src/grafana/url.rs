//! Dashboard URL parsing and render URL construction.
//!
//! Pure functions: a shared link is turned into a structured dashboard or
//! panel reference, and a panel reference is turned back into the render
//! service URL. The render URL's query parameter order is a contract with
//! the rendering service and is reproduced exactly.

use crate::config::Settings;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Query parameters accepted on a dashboard link besides `var-*` ones
const KNOWN_PARAMETERS: &[&str] = &[
    "orgId",
    "refresh",
    "from",
    "to",
    "viewPanel",
    "panelId",
    "theme",
    "tz",
];

/// Errors produced while parsing a dashboard link
#[derive(Error, Debug)]
pub enum ParseError {
    /// The string is not a URL at all
    #[error("invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    /// The path has no `/d/` or `/d-solo/` segment
    #[error("unable to parse graph URL, it must contain a /d/ or /d-solo/ segment: {0}")]
    MissingDashboardSegment(String),
    /// The path lacks the dashboard uid or name after the `d` segment
    #[error("URL {0} is missing the dashboard uid or name")]
    MissingDashboardPath(String),
    /// The query string carries parameters outside the known set
    #[error("unknown parameters in URL: {0:?}")]
    UnknownParameters(Vec<String>),
    /// The mandatory `orgId` parameter is absent
    #[error("no orgId found in graph URL {0}")]
    MissingOrgId(String),
    /// A numeric parameter did not parse as a number
    #[error("non-numeric {name} value: {value}")]
    InvalidNumber {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

/// A dashboard reference derived from a shared link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardUrl {
    /// Host the link points at
    pub hostname: String,
    /// URL scheme of the link
    pub protocol: String,
    /// Path segments preceding the `d`/`d-solo` segment, `/`-prefixed when non-empty
    pub base_path: String,
    /// Dashboard uid from the path
    pub dashboard_uid: String,
    /// Dashboard slug from the path
    pub dashboard_name: String,
    /// Grafana organization id
    pub org_id: u64,
    /// Time range start, verbatim
    pub from: Option<String>,
    /// Time range end, verbatim
    pub to: Option<String>,
    /// Timezone, verbatim
    pub tz: Option<String>,
    /// All `var-*` query parameters, keys including the prefix, in query order
    pub variables: Vec<(String, String)>,
}

/// A dashboard reference that names a specific panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelUrl {
    /// The dashboard the panel belongs to
    pub dashboard: DashboardUrl,
    /// Panel id within the dashboard
    pub panel_id: u64,
}

/// Result of parsing a matching link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrafanaUrl {
    /// The link references a dashboard without naming a panel
    Dashboard(DashboardUrl),
    /// The link names a specific panel
    Panel(PanelUrl),
}

impl GrafanaUrl {
    /// The dashboard reference, regardless of variant
    #[must_use]
    pub fn dashboard(&self) -> &DashboardUrl {
        match self {
            Self::Dashboard(d) => d,
            Self::Panel(p) => &p.dashboard,
        }
    }

    /// Split into the dashboard reference and the panel id, if any
    #[must_use]
    pub fn into_parts(self) -> (DashboardUrl, Option<u64>) {
        match self {
            Self::Dashboard(d) => (d, None),
            Self::Panel(p) => (p.dashboard, Some(p.panel_id)),
        }
    }
}

/// Parse a shared link into a dashboard or panel reference.
///
/// Returns `Ok(None)` when the link does not start with the configured
/// match prefix; the link is simply not ours to handle.
///
/// # Errors
///
/// Returns a [`ParseError`] when the link matches the prefix but is not a
/// well-formed dashboard link: no `/d/` or `/d-solo/` segment, unknown
/// query parameters, a missing `orgId`, or non-numeric numeric fields.
pub fn parse_url(match_prefix: &str, raw_url: &str) -> Result<Option<GrafanaUrl>, ParseError> {
    if !raw_url.starts_with(match_prefix) {
        warn!("URL {raw_url} does not match {match_prefix}, skipping");
        return Ok(None);
    }
    let graph_url = Url::parse(raw_url)?;

    // Ignore the leading slash and the empty segment before it
    let path_parts: Vec<&str> = graph_url.path().split('/').skip(1).collect();
    let d_idx = path_parts
        .iter()
        .position(|s| *s == "d")
        .or_else(|| path_parts.iter().position(|s| *s == "d-solo"))
        .ok_or_else(|| ParseError::MissingDashboardSegment(raw_url.to_string()))?;

    let unknown: Vec<String> = graph_url
        .query_pairs()
        .filter(|(k, _)| !KNOWN_PARAMETERS.contains(&k.as_ref()) && !k.starts_with("var-"))
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if !unknown.is_empty() {
        return Err(ParseError::UnknownParameters(unknown));
    }

    let base_path = if d_idx > 0 {
        // Re-add the leading slash if the base path is non-empty
        format!("/{}", path_parts[..d_idx].join("/"))
    } else {
        String::new()
    };

    let dashboard_uid = path_parts
        .get(d_idx + 1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError::MissingDashboardPath(raw_url.to_string()))?;
    let dashboard_name = path_parts
        .get(d_idx + 2)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError::MissingDashboardPath(raw_url.to_string()))?;

    let variables: Vec<(String, String)> = graph_url
        .query_pairs()
        .filter(|(k, _)| k.starts_with("var-"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let query_value = |name: &str| {
        graph_url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    };

    let org_id = graph_url
        .query_pairs()
        .find(|(k, _)| k == "orgId")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| ParseError::MissingOrgId(raw_url.to_string()))?;
    let org_id: u64 = org_id.parse().map_err(|_| ParseError::InvalidNumber {
        name: "orgId",
        value: org_id.clone(),
    })?;

    let panel_id = query_value("viewPanel").or_else(|| query_value("panelId"));
    let panel_id = match panel_id {
        Some(value) => Some(value.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
            name: "panelId",
            value,
        })?),
        None => None,
    };

    let dashboard = DashboardUrl {
        hostname: graph_url.host_str().unwrap_or_default().to_string(),
        protocol: graph_url.scheme().to_string(),
        base_path,
        dashboard_uid: (*dashboard_uid).to_string(),
        dashboard_name: (*dashboard_name).to_string(),
        org_id,
        from: query_value("from"),
        to: query_value("to"),
        tz: query_value("tz"),
        variables,
    };

    Ok(Some(match panel_id {
        Some(panel_id) => GrafanaUrl::Panel(PanelUrl {
            dashboard,
            panel_id,
        }),
        None => GrafanaUrl::Dashboard(dashboard),
    }))
}

/// Build the render service URL for a panel.
///
/// The query parameters are appended in a fixed order: `orgId`, `panelId`,
/// `theme`, `from`, `to`, `width`, `height`, `tz`, then every `var-*`
/// parameter in the order it appeared on the shared link.
///
/// # Errors
///
/// Returns a [`ParseError`] if the configured Grafana base URL does not
/// combine into a valid URL.
pub fn panel_image_url(settings: &Settings, panel: &PanelUrl) -> Result<Url, ParseError> {
    let dashboard = &panel.dashboard;
    let mut image_url = Url::parse(&format!(
        "{}render/d-solo/{}/{}",
        settings.grafana_base(),
        dashboard.dashboard_uid,
        dashboard.dashboard_name
    ))?;
    {
        let mut query = image_url.query_pairs_mut();
        query.append_pair("orgId", &dashboard.org_id.to_string());
        query.append_pair("panelId", &panel.panel_id.to_string());
        query.append_pair("theme", "light");
        if let Some(from) = &dashboard.from {
            query.append_pair("from", from);
        }
        if let Some(to) = &dashboard.to {
            query.append_pair("to", to);
        }
        query.append_pair("width", &settings.render_width.to_string());
        query.append_pair("height", &settings.render_height.to_string());
        if let Some(tz) = &dashboard.tz {
            query.append_pair("tz", tz);
        }
        for (key, value) in &dashboard.variables {
            query.append_pair(key, value);
        }
    }
    Ok(image_url)
}

//! HTTP surface: the direct cache endpoint, the Slack callbacks, and
//! liveness probes.
//!
//! Slack callbacks are acknowledged immediately and processed on spawned
//! tasks; Slack retries callbacks that are not answered quickly.

use crate::app::App;
use crate::grafana::url::{parse_url, GrafanaUrl, ParseError};
use crate::slack::actions::{
    handle_panel_select, handle_panel_select_remove, InteractionPayload,
};
use crate::slack::events::{handle_link_shared, CallbackEvent, EventEnvelope};
use crate::unfurl::{create_image, UnfurlError};
use axum::extract::{Form, Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Body of a direct cache request
#[derive(Debug, Deserialize)]
pub struct CacheRequest {
    /// The dashboard link to cache; must name a specific panel
    pub url: String,
}

/// Response of a successful cache request
#[derive(Debug, Serialize)]
pub struct CacheResponse {
    /// The signed retrieval URL of the cached image
    pub url: String,
}

/// An HTTP error response: status plus a JSON error message
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(json!({"error": self.message}))).into_response()
    }
}

impl From<ParseError> for ApiError {
    fn from(e: ParseError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<UnfurlError> for ApiError {
    fn from(e: UnfurlError) -> Self {
        let status = match &e {
            UnfurlError::Parse(_) => StatusCode::BAD_REQUEST,
            UnfurlError::Render(_) => StatusCode::BAD_GATEWAY,
            UnfurlError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

/// Build the application router.
#[must_use]
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/api/cache", post(cache_request))
        .route("/api/slack/events", post(slack_events))
        .route("/api/slack/actions", post(slack_actions))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Direct caching flow: the URL must already name a specific panel, so
/// there is no disambiguation path here.
async fn cache_request(
    State(app): State<Arc<App>>,
    Json(request): Json<CacheRequest>,
) -> Result<Json<CacheResponse>, ApiError> {
    let parsed = parse_url(&app.settings.match_prefix(), &request.url)?.ok_or_else(|| {
        ApiError::bad_request("unable to parse URL or it does not match the configured matcher")
    })?;
    let GrafanaUrl::Panel(panel) = parsed else {
        return Err(ApiError::bad_request(
            "the URL does not link to a specific panel id",
        ));
    };
    let cache_url = create_image(&app, &panel).await?;
    Ok(Json(CacheResponse {
        url: cache_url.to_string(),
    }))
}

async fn slack_events(
    State(app): State<Arc<App>>,
    Json(envelope): Json<EventEnvelope>,
) -> Response {
    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            axum::Json(json!({"challenge": challenge})).into_response()
        }
        EventEnvelope::EventCallback {
            event: CallbackEvent::LinkShared(event),
        } => {
            tokio::spawn(async move {
                handle_link_shared(&app, &event).await;
            });
            StatusCode::OK.into_response()
        }
        _ => StatusCode::OK.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ActionsForm {
    payload: String,
}

async fn slack_actions(
    State(app): State<Arc<App>>,
    Form(form): Form<ActionsForm>,
) -> Result<StatusCode, ApiError> {
    let payload: InteractionPayload = serde_json::from_str(&form.payload)
        .map_err(|e| ApiError::bad_request(format!("unable to validate interaction payload: {e}")))?;
    let action_id = payload
        .actions
        .first()
        .map(|action| action.action_id.clone())
        .ok_or_else(|| ApiError::bad_request("interaction payload carries no actions"))?;

    match action_id.as_str() {
        "panel_select" => {
            tokio::spawn(async move {
                handle_panel_select(&app, payload).await;
            });
        }
        "panel_select_remove" => {
            tokio::spawn(async move {
                handle_panel_select_remove(&app, payload).await;
            });
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown interaction action {other}"
            )))
        }
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfurl_error_status_mapping() {
        let parse: ApiError = UnfurlError::Parse(ParseError::MissingOrgId("u".into())).into();
        assert_eq!(parse.status, StatusCode::BAD_REQUEST);

        let render: ApiError = UnfurlError::Render(
            crate::grafana::render::RenderError::Timeout {
                url: "https://grafana.internal/render".to_string(),
            },
        )
        .into();
        assert_eq!(render.status, StatusCode::BAD_GATEWAY);

        let storage: ApiError =
            UnfurlError::Storage(crate::storage::StorageError::Upload("boom".into())).into();
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cache_request_body_shape() {
        let request: CacheRequest =
            serde_json::from_str(r#"{"url": "https://g.example/d/a/b?orgId=1&panelId=2"}"#)
                .expect("decode");
        assert!(request.url.starts_with("https://g.example/"));
    }
}

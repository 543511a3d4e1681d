//! End-to-end contract of the parse → render-URL round trip.

use grafana_unfurl::config::Settings;
use grafana_unfurl::grafana::url::{panel_image_url, parse_url, GrafanaUrl};
use std::collections::HashMap;

fn settings() -> Settings {
    Settings {
        grafana_url: "https://grafana.internal/".to_string(),
        grafana_match_url: "https://g.example/".to_string(),
        grafana_retention: Some("30d".to_string()),
        grafana_cleanup_interval: Some("1d".to_string()),
        grafana_headers: HashMap::new(),
        render_width: 1000,
        render_height: 500,
        s3_bucket: "unfurl-cache".to_string(),
        s3_root: Some("grafana/".to_string()),
        s3_endpoint_url: None,
        s3_region: None,
        s3_access_key_id: None,
        s3_secret_access_key: None,
        s3_url_signing_access_key_id: None,
        s3_url_signing_secret_access_key: None,
        slack_bot_token: "xoxb-test".to_string(),
        slack_signing_secret: None,
        listen_addr: "127.0.0.1:0".to_string(),
    }
}

#[test]
fn shared_panel_link_parses_to_a_panel_reference() {
    let parsed = parse_url(
        "https://g.example/",
        "https://g.example/d/abc123/my-dash?orgId=1&panelId=7",
    )
    .expect("parse")
    .expect("matched");

    let GrafanaUrl::Panel(panel) = parsed else {
        panic!("expected a panel reference");
    };
    assert_eq!(panel.dashboard.dashboard_uid, "abc123");
    assert_eq!(panel.dashboard.dashboard_name, "my-dash");
    assert_eq!(panel.dashboard.org_id, 1);
    assert_eq!(panel.panel_id, 7);
}

#[test]
fn round_trip_preserves_every_variable_in_order() {
    let parsed = parse_url(
        "https://g.example/",
        "https://g.example/d/abc/name?orgId=3&viewPanel=9&from=now-12h&to=now&tz=Europe%2FCopenhagen&var-cluster=prod&var-app=api&var-zone=eu",
    )
    .expect("parse")
    .expect("matched");
    let GrafanaUrl::Panel(panel) = parsed else {
        panic!("expected a panel reference");
    };

    let rendered = panel_image_url(&settings(), &panel).expect("render url");
    assert_eq!(
        rendered.as_str(),
        "https://grafana.internal/render/d-solo/abc/name\
         ?orgId=3&panelId=9&theme=light&from=now-12h&to=now\
         &width=1000&height=500&tz=Europe%2FCopenhagen\
         &var-cluster=prod&var-app=api&var-zone=eu"
    );
}

#[test]
fn render_url_always_carries_fixed_parameters() {
    let parsed = parse_url(
        "https://g.example/",
        "https://g.example/d/abc/name?orgId=1&panelId=4&var-a=1",
    )
    .expect("parse")
    .expect("matched");
    let GrafanaUrl::Panel(panel) = parsed else {
        panic!("expected a panel reference");
    };
    let rendered = panel_image_url(&settings(), &panel).expect("render url");
    let query: Vec<(String, String)> = rendered
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    assert!(query.contains(&("orgId".to_string(), "1".to_string())));
    assert!(query.contains(&("panelId".to_string(), "4".to_string())));
    assert!(query.contains(&("theme".to_string(), "light".to_string())));
    assert!(query.contains(&("width".to_string(), "1000".to_string())));
    assert!(query.contains(&("height".to_string(), "500".to_string())));
    assert!(query.contains(&("var-a".to_string(), "1".to_string())));
}

#[test]
fn foreign_links_are_never_an_error() {
    for url in [
        "https://elsewhere.example/d/abc/name?orgId=1",
        "not a url at all",
        "",
    ] {
        assert!(matches!(parse_url("https://g.example/", url), Ok(None)));
    }
}

//! The ambiguous-dashboard selection flow: prompt state, token
//! consumption, and the prompt attachment contract.

use grafana_unfurl::grafana::api::{Dashboard, Panel};
use grafana_unfurl::pending::{PendingSelection, PendingSelections, SelectionError};
use grafana_unfurl::slack::blocks::{block_id_token, panel_selector};

fn three_panel_dashboard() -> Dashboard {
    Dashboard {
        id: Some(12),
        title: "Service overview".to_string(),
        panels: vec![
            Panel {
                id: 2,
                title: "Requests".to_string(),
            },
            Panel {
                id: 7,
                title: "Errors".to_string(),
            },
            Panel {
                id: 9,
                title: "Latency".to_string(),
            },
        ],
    }
}

fn selection() -> PendingSelection {
    PendingSelection {
        encoded_url: "https://g.example/d/abc/name?orgId=1".to_string(),
        channel: "C123".to_string(),
        message_ts: "1700000000.000100".to_string(),
    }
}

#[tokio::test]
async fn selection_token_is_consumed_exactly_once() {
    let store = PendingSelections::new(60, 100);
    let token = PendingSelections::generate_token();
    store.insert(token.clone(), selection()).await;

    // Selecting panel 7 resolves the prompt and removes the entry
    let pending = store.take(&token).await.expect("pending entry");
    assert_eq!(pending.channel, "C123");

    // A second attempt with the same token must fail
    assert_eq!(store.take(&token).await, Err(SelectionError::NotFound));
}

#[tokio::test]
async fn cancelling_a_prompt_consumes_the_token_too() {
    let store = PendingSelections::new(60, 100);
    let token = PendingSelections::generate_token();
    store.insert(token.clone(), selection()).await;

    store.take(&token).await.expect("removal finds the entry");
    assert_eq!(store.take(&token).await, Err(SelectionError::NotFound));
}

#[tokio::test]
async fn prompts_for_different_links_are_independent() {
    let store = PendingSelections::new(60, 100);
    let first = PendingSelections::generate_token();
    let second = PendingSelections::generate_token();
    assert_ne!(first, second);

    store.insert(first.clone(), selection()).await;
    let mut other = selection();
    other.encoded_url = "https://g.example/d/xyz/other?orgId=1".to_string();
    store.insert(second.clone(), other.clone()).await;

    assert_eq!(store.take(&second).await, Ok(other));
    assert!(store.take(&first).await.is_ok());
}

#[test]
fn prompt_blocks_carry_the_token_and_panel_ids() {
    let token = PendingSelections::generate_token();
    let attachment = panel_selector(&three_panel_dashboard(), &token);
    let value = serde_json::to_value(&attachment).expect("serialize");

    let section_block_id = value["blocks"][0]["block_id"]
        .as_str()
        .expect("section block id");
    assert_eq!(block_id_token(section_block_id), Some(token.as_str()));

    let remove_block_id = value["blocks"][1]["block_id"]
        .as_str()
        .expect("actions block id");
    assert_eq!(block_id_token(remove_block_id), Some(token.as_str()));

    let options = value["blocks"][0]["accessory"]["options"]
        .as_array()
        .expect("options");
    let values: Vec<&str> = options
        .iter()
        .map(|o| o["value"].as_str().expect("option value"))
        .collect();
    assert_eq!(values, vec!["2", "7", "9"]);
}

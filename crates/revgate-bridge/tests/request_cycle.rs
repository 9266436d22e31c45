//! Full request cycles against a scripted stand-in for the editor
//! extension.

use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::TempDir;

use revgate_bridge::{Bridge, Reply};
use revgate_core::config::BridgeSettings;
use revgate_core::{Error, RecordPaths, TriggerData};

fn fast_settings(dir: &TempDir) -> BridgeSettings {
    BridgeSettings {
        temp_dir: Some(dir.path().to_path_buf()),
        ack_poll_interval_ms: 10,
        ack_timeout_secs: 2,
        response_poll_interval_ms: 10,
        ..Default::default()
    }
}

async fn wait_for_trigger(paths: &RecordPaths) -> String {
    loop {
        if let Ok(content) = tokio::fs::read_to_string(paths.trigger()).await {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
                if let Some(id) = value["data"]["trigger_id"].as_str() {
                    return id.to_string();
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Plays the editor: waits for the primary trigger, optionally
/// acknowledges it, then writes `body` as the id-specific response.
async fn extension_answers(paths: RecordPaths, mut body: serde_json::Value, ack: bool) {
    let trigger_id = wait_for_trigger(&paths).await;
    if ack {
        tokio::fs::write(paths.ack(&trigger_id), r#"{"acknowledged": true}"#)
            .await
            .unwrap();
    }
    body["trigger_id"] = json!(trigger_id.as_str());
    tokio::fs::write(paths.response_for(&trigger_id), body.to_string())
        .await
        .unwrap();
}

async fn extension_answers_plaintext(paths: RecordPaths, text: String) {
    let trigger_id = wait_for_trigger(&paths).await;
    tokio::fs::write(paths.response_for(&trigger_id), text)
        .await
        .unwrap();
}

#[tokio::test]
async fn answered_with_ack_and_id_specific_response() {
    let dir = TempDir::new().unwrap();
    let bridge = Bridge::new(fast_settings(&dir));
    tokio::spawn(extension_answers(
        bridge.paths().clone(),
        json!({"user_input": "hello"}),
        true,
    ));

    let outcome = bridge
        .request(
            TriggerData::new("review_chat").with_message("look at this"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert!(outcome.acknowledged);
    match &outcome.reply {
        Reply::Answered(reply) => assert_eq!(reply.text, "hello"),
        Reply::TimedOut => panic!("expected an answer"),
    }

    // Both editor-written records were consumed on read.
    assert!(!bridge.paths().response_for(&outcome.trigger_id).exists());
    assert!(!bridge.paths().ack(&outcome.trigger_id).exists());

    // Backup triggers landed next to the primary.
    assert!(bridge.paths().backup_trigger(0).exists());
    assert!(bridge.paths().backup_trigger(2).exists());
}

#[tokio::test]
async fn unacknowledged_ack_record_is_still_consumed() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 1,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);
    let paths = bridge.paths().clone();
    tokio::spawn(async move {
        let trigger_id = wait_for_trigger(&paths).await;
        tokio::fs::write(paths.ack(&trigger_id), r#"{"acknowledged": false}"#)
            .await
            .unwrap();
        tokio::fs::write(
            paths.response_for(&trigger_id),
            json!({"user_input": "answered anyway", "trigger_id": trigger_id}).to_string(),
        )
        .await
        .unwrap();
    });

    let outcome = bridge
        .request(TriggerData::new("review_chat"), Duration::from_secs(5))
        .await
        .unwrap();

    // The negative ack never counts as an acknowledgement, but its
    // record is deleted on read and the response phase proceeds.
    assert!(!outcome.acknowledged);
    assert!(!bridge.paths().ack(&outcome.trigger_id).exists());
    assert_eq!(
        outcome.answer().map(|r| r.text.as_str()),
        Some("answered anyway")
    );
}

#[tokio::test]
async fn answer_still_arrives_when_ack_never_comes() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 1,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);
    tokio::spawn(extension_answers(
        bridge.paths().clone(),
        json!({"user_input": "late but present"}),
        false,
    ));

    let outcome = bridge
        .request(TriggerData::new("review_chat"), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!outcome.acknowledged);
    assert_eq!(
        outcome.answer().map(|r| r.text.as_str()),
        Some("late but present")
    );
}

#[tokio::test]
async fn zero_timeout_returns_without_blocking() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 0,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);

    let started = Instant::now();
    let outcome = bridge
        .request(TriggerData::new("quick_review"), Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(outcome.reply, Reply::TimedOut);
    assert!(!outcome.acknowledged);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn prewritten_generic_response_is_consumed() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 0,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);
    std::fs::write(
        bridge.paths().generic_response(),
        r#"{"message": "general note"}"#,
    )
    .unwrap();

    let outcome = bridge
        .request(TriggerData::new("review_chat"), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(
        outcome.answer().map(|r| r.text.as_str()),
        Some("general note")
    );
    assert!(!bridge.paths().generic_response().exists());
}

#[tokio::test]
async fn malformed_response_is_skipped_without_crashing_the_poll() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 0,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);
    let malformed = bridge.paths().generic_response();
    std::fs::write(&malformed, "{this is not json").unwrap();

    tokio::spawn(extension_answers(
        bridge.paths().clone(),
        json!({"user_input": "hello"}),
        false,
    ));

    let outcome = bridge
        .request(TriggerData::new("review_chat"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.answer().map(|r| r.text.as_str()), Some("hello"));
    // The unparseable file was skipped, not deleted, so a later
    // rewrite can still replace it.
    assert_eq!(
        std::fs::read_to_string(&malformed).unwrap(),
        "{this is not json"
    );
}

#[tokio::test]
async fn response_for_another_request_is_left_in_place() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 0,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);
    let foreign = bridge.paths().generic_response();
    std::fs::write(
        &foreign,
        r#"{"user_input": "not yours", "trigger_id": "someone_else"}"#,
    )
    .unwrap();

    tokio::spawn(extension_answers(
        bridge.paths().clone(),
        json!({"user_input": "mine"}),
        false,
    ));

    let outcome = bridge
        .request(TriggerData::new("review_chat"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.answer().map(|r| r.text.as_str()), Some("mine"));
    assert!(foreign.exists());
}

#[tokio::test]
async fn plaintext_response_is_accepted_whole() {
    let dir = TempDir::new().unwrap();
    let settings = BridgeSettings {
        ack_timeout_secs: 0,
        ..fast_settings(&dir)
    };
    let bridge = Bridge::new(settings);
    tokio::spawn(extension_answers_plaintext(
        bridge.paths().clone(),
        "  free-form text typed by hand\n".to_string(),
    ));

    let outcome = bridge
        .request(TriggerData::new("review_chat"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(
        outcome.answer().map(|r| r.text.as_str()),
        Some("free-form text typed by hand")
    );
    assert!(!bridge.paths().response_for(&outcome.trigger_id).exists());
}

#[tokio::test]
async fn unwritable_record_directory_fails_the_trigger_phase() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "plain file").unwrap();

    let settings = BridgeSettings {
        temp_dir: Some(blocker),
        ..Default::default()
    };
    let err = Bridge::new(settings)
        .request(TriggerData::new("review_chat"), Duration::ZERO)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Trigger(_)));
}

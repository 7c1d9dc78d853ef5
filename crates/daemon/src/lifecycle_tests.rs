// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::DaemonConfig;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;

fn noop_definition() -> serde_json::Value {
    serde_json::json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "check", "type": "condition.if", "data": { "condition": "1 == 1" } }
        ],
        "edges": [ { "source": "start", "target": "check" } ]
    })
}

#[tokio::test]
async fn daemon_runs_a_job_end_to_end_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Daemon::new(DaemonConfig::ephemeral(dir.path())).start().await.unwrap();
    let base = format!("http://{}", handle.addr);
    let client = reqwest::Client::new();

    let job: serde_json::Value = client
        .post(format!("{}/api/v1/jobs", base))
        .header("X-User-ID", "u1")
        .json(&serde_json::json!({ "name": "noop", "definition": noop_definition() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let run: serde_json::Value = client
        .post(format!("{}/api/v1/jobs/{}/run", base, job["id"].as_str().unwrap()))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let run_id = run["id"].as_str().unwrap().to_string();

    // The worker pool picks the step up; poll until terminal.
    let mut status = String::new();
    for _ in 0..100 {
        let snapshot: serde_json::Value = client
            .get(format!("{}/api/v1/runs/{}", base, run_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        status = snapshot["status"].as_str().unwrap_or_default().to_string();
        if status == "succeeded" || status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, "succeeded");

    let steps: Vec<serde_json::Value> = client
        .get(format!("{}/api/v1/runs/{}/steps", base, run_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(steps[0]["status"], "succeeded");
    assert_eq!(steps[0]["stdout"], "true");

    handle.stop().await;
}

#[tokio::test]
async fn stream_pushes_run_transitions_to_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Daemon::new(DaemonConfig::ephemeral(dir.path())).start().await.unwrap();
    let base = format!("http://{}", handle.addr);
    let client = reqwest::Client::new();

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/api/v1/stream", handle.addr))
            .await
            .unwrap();
    socket
        .send(tokio_tungstenite::tungstenite::Message::text(
            serde_json::json!({ "topics": [ { "topic": "job_monitoring" } ] }).to_string(),
        ))
        .await
        .unwrap();

    let job: serde_json::Value = client
        .post(format!("{}/api/v1/jobs", base))
        .json(&serde_json::json!({ "name": "noop", "definition": noop_definition() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    client
        .post(format!("{}/api/v1/jobs/{}/run", base, job["id"].as_str().unwrap()))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();

    // Collect frames until the terminal completion arrives.
    let mut frame_types = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        let next = tokio::time::timeout(Duration::from_secs(2), socket.next()).await;
        let Ok(Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text)))) = next else {
            continue;
        };
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        let frame_type = frame["type"].as_str().unwrap_or_default().to_string();
        frame_types.push(frame_type.clone());
        if frame_type == "job_completed" {
            assert_eq!(frame["data"]["status"], "succeeded");
            break;
        }
    }
    assert!(frame_types.contains(&"job_status_update".to_string()));
    assert!(frame_types.contains(&"job_completed".to_string()));

    handle.stop().await;
}

#[tokio::test]
async fn second_instance_on_same_data_dir_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let first = Daemon::new(DaemonConfig::ephemeral(dir.path())).start().await.unwrap();
    let second = Daemon::new(DaemonConfig::ephemeral(dir.path())).start().await;
    assert!(matches!(second, Err(DaemonError::AlreadyRunning(_))));
    first.stop().await;
}

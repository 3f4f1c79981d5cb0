//! End-to-end bridging through the HTTP gateway.

use axum::http::StatusCode;
use serde_json::{json, Value};
use wabridge_integration_tests::{crm_path, received, wait_for, Harness, SESSION};

fn inbound_event(id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "from": "5511987654321@s.whatsapp.net",
        "push_name": "Joao",
        "content": content,
        "kind": "text"
    })
}

fn agent_reply(message_id: u64, conversation_id: u64, content: &str) -> Value {
    json!({
        "event": "message_created",
        "id": message_id,
        "content": content,
        "message_type": "outgoing",
        "private": false,
        "sender": {"name": "Ana", "type": "user"},
        "conversation": {
            "id": conversation_id,
            "status": "open",
            "meta": {"sender": {"name": "Joao", "phone_number": "+5511987654321"}}
        }
    })
}

#[tokio::test]
async fn test_inbound_message_reaches_crm_once() {
    let h = Harness::start().await;
    h.mount_empty_crm(9, 77, 1001).await;

    let uri = format!("/sessions/{}/inbound", SESSION);
    let (status, body) = h.post_json(&uri, inbound_event("M1", "*hello*")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["outcome"], "synced");
    assert_eq!(body["remote_message_id"], "1001");
    assert_eq!(body["remote_conversation_id"], "77");

    let posts = received(&h.crm, "POST", "/conversations/77/messages").await;
    assert_eq!(posts.len(), 1);
    let posted: Value = serde_json::from_slice(&posts[0].body).unwrap();
    assert_eq!(posted["content"], "**hello**");
    assert_eq!(posted["message_type"], "incoming");
    assert_eq!(posted["source_id"], "WAID:M1");

    // Redelivery of the same native message is a no-op.
    let (status, body) = h.post_json(&uri, inbound_event("M1", "*hello*")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_mapped");
    assert_eq!(received(&h.crm, "POST", "/conversations/77/messages").await.len(), 1);

    let (status, stats) = h.get(&format!("/sessions/{}/stats", SESSION)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["synced"], 1);
    assert_eq!(stats["pending"], 0);
}

#[tokio::test]
async fn test_crm_failure_surfaces_as_bad_gateway() {
    let h = Harness::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path(crm_path("contacts/search")))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .mount(&h.crm)
        .await;

    let (status, body) = h
        .post_json(&format!("/sessions/{}/inbound", SESSION), inbound_event("M2", "hi"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{}", body);

    let (_, stats) = h.get(&format!("/sessions/{}/stats", SESSION)).await;
    assert_eq!(stats["failed"], 1);
}

#[tokio::test]
async fn test_failed_mapping_is_resynced_by_operator() {
    let h = Harness::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path(crm_path("contacts/search")))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .mount(&h.crm)
        .await;

    let (status, _) = h
        .post_json(&format!("/sessions/{}/inbound", SESSION), inbound_event("M3", "hola"))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = h.get(&format!("/sessions/{}/failed", SESSION)).await;
    assert_eq!(status, StatusCode::OK);
    let failed = body["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["native_message_id"], "M3");
    let mapping_id = failed[0]["id"].as_str().unwrap().to_string();

    // The CRM recovers.
    h.crm.reset().await;
    h.mount_empty_crm(9, 77, 1003).await;

    let resync = format!("/sessions/{}/mappings/{}/resync", SESSION, mapping_id);
    let (status, body) = h.post_json(&resync, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["outcome"], "synced");
    assert_eq!(body["remote_message_id"], "1003");

    let posts = received(&h.crm, "POST", "/conversations/77/messages").await;
    assert_eq!(posts.len(), 1);
    let posted: Value = serde_json::from_slice(&posts[0].body).unwrap();
    assert_eq!(posted["source_id"], "WAID:M3");

    let (_, stats) = h.get(&format!("/sessions/{}/stats", SESSION)).await;
    assert_eq!(stats["synced"], 1);
    assert_eq!(stats["failed"], 1);

    let (status, body) = h.post_json(&resync, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (status, body) = h
        .post_json(&format!("/sessions/{}/mappings/unknown/resync", SESSION), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "mapping_not_found");
}

#[tokio::test]
async fn test_agent_reply_is_sent_and_marks_read() {
    let h = Harness::start().await;
    h.mount_empty_crm(9, 77, 1001).await;
    h.mount_sidecar("N-out-1").await;

    let (status, _) = h
        .post_json(&format!("/sessions/{}/inbound", SESSION), inbound_event("M1", "hi"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h
        .post_json(&format!("/webhook/{}", SESSION), agent_reply(2002, 77, "**on it**"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "accepted"}));

    let sends = wait_for(&h.sidecar, "POST", &format!("/sessions/{}/messages", SESSION)).await;
    assert_eq!(sends.len(), 1);
    let sent: Value = serde_json::from_slice(&sends[0].body).unwrap();
    assert_eq!(sent["phone"], "5511987654321");
    assert_eq!(sent["body"], "*on it*");
    assert_eq!(sent["echo_tag"], "WAID:2002");

    wait_for(&h.sidecar, "POST", "/messages/M1/read").await;
}

#[tokio::test]
async fn test_bridge_echo_is_not_sent_back() {
    let h = Harness::start().await;
    h.mount_sidecar("N-out-1").await;

    let mut echo = agent_reply(1001, 77, "hi");
    echo["message_type"] = json!("outgoing");
    echo["source_id"] = json!("WAID:M1");

    let (status, _) = h.post_json(&format!("/webhook/{}", SESSION), echo).await;
    assert_eq!(status, StatusCode::OK);

    let outcome = h
        .engine
        .process_outbound_webhook(SESSION, &agent_reply(1001, 77, "hi"))
        .await
        .unwrap();
    assert!(matches!(outcome, wabridge_bridge::WebhookOutcome::Forwarded { .. }));

    // Only the direct call above reached the session manager.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(
        received(&h.sidecar, "POST", &format!("/sessions/{}/messages", SESSION))
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_admin_routes_reject_missing_token() {
    let h = Harness::start().await;

    let request = axum::http::Request::get(format!("/sessions/{}/stats", SESSION))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(h.router.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = h.post_json("/sessions/unknown/inbound", inbound_event("M9", "x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn test_cleanup_defaults_to_retention() {
    let h = Harness::start().await;

    let (status, body) = h
        .post_json(&format!("/sessions/{}/cleanup", SESSION), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deleted": 0, "days": 90}));
}

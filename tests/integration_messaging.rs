#![allow(clippy::unwrap_used)]
mod common;

use common::{ACCOUNT_ID, TestApp};
use courier_server::domain::message::MessageStatus;
use courier_server::storage::MessageStore;
use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_send_message_success() {
    let app = TestApp::spawn().await;
    app.mock_send_accepts("wamid.XYZ").await;

    let resp = app.send_message("98123 45678", "hello there").await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["providerMessageId"], "wamid.XYZ");
    assert_eq!(body["status"], "sent");
    assert!(body["timestamp"].is_string());

    let id: Uuid = body["localMessageId"].as_str().unwrap().parse().unwrap();
    let stored = app.store.find_by_provider_id("wamid.XYZ").await.unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.sender_id, ACCOUNT_ID);
    assert_eq!(stored.recipient_id, "contact-1");
    assert_eq!(stored.content, "hello there");

    let requests = app.provider.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent: Value = requests[0].body_json().unwrap();
    assert_eq!(sent["to"], "919812345678");
    assert_eq!(sent["text"]["body"], "hello there");
    assert_eq!(requests[0].headers.get("authorization").unwrap(), "Bearer test-token");
}

#[tokio::test]
async fn test_send_without_reference_uses_normalized_address() {
    let app = TestApp::spawn().await;
    app.mock_send_accepts("wamid.NOREF").await;

    let resp = app
        .client
        .post(format!("{}/v1/messages", app.api_url))
        .json(&json!({ "recipientAddress": "+44 20 7946 0958", "payload": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let stored = app.store.find_by_provider_id("wamid.NOREF").await.unwrap().unwrap();
    assert_eq!(stored.recipient_id, "442079460958");
}

#[tokio::test]
async fn test_provider_outage_exhausts_retries_and_marks_failed() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path(format!("/{ACCOUNT_ID}/messages")))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "error": { "message": "Service temporarily unavailable" } })),
        )
        .expect(4)
        .mount(&app.provider)
        .await;

    let resp = app.send_message("9812345678", "hello").await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = resp.json().await.unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("4 attempts"), "unexpected error: {error}");
    assert!(error.contains("Service temporarily unavailable"), "unexpected error: {error}");

    let id: Uuid = body["messageId"].as_str().unwrap().parse().unwrap();
    let stored = app.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Failed);
    assert_eq!(stored.provider_message_id, None);

    assert_eq!(app.provider.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path(format!("/{ACCOUNT_ID}/messages")))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "Recipient not on allow list" } })),
        )
        .expect(1)
        .mount(&app.provider)
        .await;

    let resp = app.send_message("9812345678", "hello").await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Recipient not on allow list"));

    let id: Uuid = body["messageId"].as_str().unwrap().parse().unwrap();
    assert_eq!(app.store.find_by_id(id).await.unwrap().unwrap().status, MessageStatus::Failed);
}

#[tokio::test]
async fn test_reused_provider_id_reports_local_id() {
    let app = TestApp::spawn().await;
    let first = app.send_accepted("9812345678", "wamid.SAME").await;

    app.mock_send_accepts("wamid.SAME").await;
    let resp = app.send_message("9876500000", "again").await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = resp.json().await.unwrap();
    let id = body["messageId"].as_str().unwrap();
    assert_ne!(id, first["id"].as_str().unwrap());
    assert!(body["error"].as_str().unwrap().contains("wamid.SAME"));

    let second = app.get_message(id).await;
    assert_eq!(second["status"], "pending");
    assert_eq!(second["providerMessageId"], Value::Null);
    assert_eq!(app.get_message(first["id"].as_str().unwrap()).await["status"], "sent");
}

#[tokio::test]
async fn test_invalid_send_requests_store_nothing() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&app.provider).await;

    let resp = app
        .client
        .post(format!("{}/v1/messages", app.api_url))
        .json(&json!({ "payload": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.send_message("9812345678", "   ").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.send_message("call me maybe", "hello").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .post(format!("{}/v1/messages", app.api_url))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .post(format!("{}/v1/messages", app.api_url))
        .json(&json!({ "recipientAddress": "9812345678", "payload": "hi", "keyFingerprint": "not-hex" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_get_unknown_message_is_not_found() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/v1/messages/{}", app.api_url, Uuid::new_v4())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.client.get(format!("{}/v1/messages/not-a-uuid", app.api_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_is_newest_first_and_limited() {
    let app = TestApp::spawn().await;

    let first = app.send_accepted("9812345678", "wamid.H1").await;
    let second = app.send_accepted("9812345678", "wamid.H2").await;
    let third = app.send_accepted("9812345678", "wamid.H3").await;
    let other = app.send_accepted("9876500000", "wamid.OTHER").await;

    let conversation_id = first["conversationId"].as_str().unwrap();
    assert_eq!(second["conversationId"], conversation_id);
    assert_ne!(other["conversationId"], conversation_id);

    let resp = app
        .client
        .get(format!("{}/v1/messages?conversationId={conversation_id}", app.api_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let history: Vec<Value> = resp.json().await.unwrap();
    let ids: Vec<&Value> = history.iter().map(|m| &m["id"]).collect();
    assert_eq!(ids, vec![&third["id"], &second["id"], &first["id"]]);

    let resp = app
        .client
        .get(format!("{}/v1/messages?conversationId={conversation_id}&limit=2", app.api_url))
        .send()
        .await
        .unwrap();
    let history: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["id"], third["id"]);
    assert_eq!(history[1]["id"], second["id"]);
}

#[tokio::test]
async fn test_history_requires_conversation_id() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/v1/messages", app.api_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .get(format!("{}/v1/messages?conversationId=conv_none&limit=many", app.api_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .get(format!("{}/v1/messages?conversationId=conv_none", app.api_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let history: Vec<Value> = resp.json().await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_mark_read_acknowledges_provider_once() {
    let app = TestApp::spawn().await;
    let message = app.send_accepted("9812345678", "wamid.XYZ").await;

    Mock::given(method("POST"))
        .and(path(format!("/{ACCOUNT_ID}/messages")))
        .and(body_partial_json(json!({ "status": "read", "message_id": "wamid.XYZ" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&app.provider)
        .await;

    let url = format!("{}/v1/messages/{}/read", app.api_url, message["id"].as_str().unwrap());

    let resp = app.client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "read");

    // Already read: no second acknowledgment.
    let resp = app.client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "read");
}

#[tokio::test]
async fn test_mark_read_survives_provider_failure() {
    let app = TestApp::spawn().await;
    let message = app.send_accepted("9812345678", "wamid.XYZ").await;

    Mock::given(method("POST"))
        .and(path(format!("/{ACCOUNT_ID}/messages")))
        .and(body_partial_json(json!({ "status": "read" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "Unknown message" } })))
        .mount(&app.provider)
        .await;

    let id = message["id"].as_str().unwrap();
    let resp = app.client.post(format!("{}/v1/messages/{id}/read", app.api_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(app.get_message(id).await["status"], "read");
}

#[tokio::test]
async fn test_mark_read_rejections() {
    let app = TestApp::spawn().await;

    let resp = app.client.post(format!("{}/v1/messages/{}/read", app.api_url, Uuid::new_v4())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Mock::given(method("POST"))
        .and(path(format!("/{ACCOUNT_ID}/messages")))
        .respond_with(ResponseTemplate::new(400))
        .mount(&app.provider)
        .await;

    let resp = app.send_message("9812345678", "hello").await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = resp.json().await.unwrap();
    let id = body["messageId"].as_str().unwrap();

    let resp = app.client.post(format!("{}/v1/messages/{id}/read", app.api_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(app.get_message(id).await["status"], "failed");
}

#[tokio::test]
async fn test_refresh_status_applies_provider_state() {
    let app = TestApp::spawn().await;
    let message = app.send_accepted("9812345678", "wamid.XYZ").await;

    Mock::given(method("GET"))
        .and(path("/wamid.XYZ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "wamid.XYZ", "status": "delivered" })))
        .expect(1)
        .mount(&app.provider)
        .await;

    let id = message["id"].as_str().unwrap();
    let resp = app.client.post(format!("{}/v1/messages/{id}/refresh", app.api_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "delivered");
    assert_eq!(app.get_message(id).await["status"], "delivered");
}

#[tokio::test]
async fn test_refresh_status_reports_unreachable_provider() {
    let app = TestApp::spawn().await;
    let message = app.send_accepted("9812345678", "wamid.XYZ").await;

    Mock::given(method("GET"))
        .and(path("/wamid.XYZ"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&app.provider)
        .await;

    let id = message["id"].as_str().unwrap();
    let resp = app.client.post(format!("{}/v1/messages/{id}/refresh", app.api_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.get_message(id).await["status"], "sent");
}

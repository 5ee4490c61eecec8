mod support;

use futures_util::SinkExt;
use reqwest::Client;
use serde_json::{json, Value};

use support::{expect_closed, next_event, next_event_of, send_json, spawn_server};

fn users(event: &Value) -> Vec<String> {
    event["users"]
        .as_array()
        .expect("users array")
        .iter()
        .map(|u| u.as_str().expect("user name").to_owned())
        .collect()
}

#[tokio::test]
async fn chat_flow_over_websocket() {
    let server = spawn_server(false).await;
    let client = Client::new();

    let mut bob = server.ws().await;
    send_json(&mut bob, json!({"type": "announce", "username": "bob"})).await;
    let roster = next_event(&mut bob).await;
    assert_eq!(roster["type"], "roster");
    assert_eq!(users(&roster), vec!["bob"]);
    let history = next_event(&mut bob).await;
    assert_eq!(history["type"], "history");
    assert_eq!(history["messages"], json!([]));

    let mut carol = server.ws().await;
    send_json(&mut carol, json!({"type": "announce", "username": "carol"})).await;
    assert_eq!(users(&next_event_of(&mut bob, "roster").await), vec!["bob", "carol"]);
    assert_eq!(users(&next_event_of(&mut carol, "roster").await), vec!["bob", "carol"]);
    next_event_of(&mut carol, "history").await;

    send_json(&mut bob, json!({"type": "send", "text": "  hi carol  "})).await;
    for ws in [&mut bob, &mut carol] {
        let message = next_event_of(ws, "message").await;
        assert_eq!(message["sender"], "bob");
        assert_eq!(message["text"], "hi carol");
        assert!(message["timestamp"].is_string());
        assert!(message["id"].is_string());
    }

    let stored: Vec<Value> = client
        .get(server.http("/api/chat/messages?limit=10"))
        .send()
        .await
        .expect("history request")
        .json()
        .await
        .expect("history json");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["text"], "hi carol");

    let online: Value = client
        .get(server.http("/api/chat/online"))
        .send()
        .await
        .expect("online request")
        .json()
        .await
        .expect("online json");
    assert_eq!(online["count"], 2);

    carol.close(None).await.expect("close carol");
    assert_eq!(users(&next_event_of(&mut bob, "roster").await), vec!["bob"]);
    assert_eq!(server.hub.roster().await.expect("roster").len(), 1);
}

#[tokio::test]
async fn late_joiner_receives_history_oldest_first() {
    let server = spawn_server(false).await;

    let mut alice = server.ws().await;
    send_json(&mut alice, json!({"type": "announce", "username": "alice"})).await;
    for text in ["one", "two", "three"] {
        send_json(&mut alice, json!({"type": "send", "text": text})).await;
        next_event_of(&mut alice, "message").await;
    }

    let mut dave = server.ws().await;
    send_json(&mut dave, json!({"type": "announce", "username": "dave"})).await;
    let history = next_event_of(&mut dave, "history").await;
    let texts: Vec<_> = history["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| m["text"].as_str().expect("text").to_owned())
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn protocol_errors_keep_the_connection_open() {
    let server = spawn_server(false).await;
    let mut ws = server.ws().await;

    send_json(&mut ws, json!({"type": "send", "text": "too early"})).await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "PROTOCOL_VIOLATION");

    send_json(&mut ws, json!({"type": "dance"})).await;
    let error = next_event(&mut ws).await;
    assert_eq!(error["code"], "PROTOCOL_VIOLATION");

    send_json(&mut ws, json!({"type": "announce", "username": "erin"})).await;
    assert_eq!(users(&next_event_of(&mut ws, "roster").await), vec!["erin"]);

    let mut twin = server.ws().await;
    send_json(&mut twin, json!({"type": "announce", "username": "erin"})).await;
    let error = next_event_of(&mut twin, "error").await;
    assert_eq!(error["code"], "IDENTITY_TAKEN");
}

#[tokio::test]
async fn rate_limited_sender_gets_warning() {
    let server = spawn_server(false).await;
    let mut ws = server.ws().await;
    send_json(&mut ws, json!({"type": "announce", "username": "alice"})).await;
    next_event_of(&mut ws, "history").await;

    for i in 0..10 {
        send_json(&mut ws, json!({"type": "send", "text": format!("m{i}")})).await;
    }
    send_json(&mut ws, json!({"type": "send", "text": "one too many"})).await;

    for _ in 0..10 {
        assert_eq!(next_event(&mut ws).await["type"], "message");
    }
    let warning = next_event(&mut ws).await;
    assert_eq!(warning["type"], "warning");
    assert_eq!(warning["reason"], "too many messages");
    assert_eq!(server.store.len().await, 10);
}

#[tokio::test]
async fn leave_closes_the_socket() {
    let server = spawn_server(false).await;
    let mut frank = server.ws().await;
    send_json(&mut frank, json!({"type": "announce", "username": "frank"})).await;
    assert_eq!(
        users(&next_event_of(&mut frank, "roster").await),
        vec!["frank"]
    );

    let mut grace = server.ws().await;
    send_json(&mut grace, json!({"type": "announce", "username": "grace"})).await;
    assert_eq!(
        users(&next_event_of(&mut frank, "roster").await),
        vec!["frank", "grace"]
    );

    send_json(&mut frank, json!({"type": "leave"})).await;
    expect_closed(&mut frank).await;

    let roster = loop {
        let roster = next_event_of(&mut grace, "roster").await;
        if users(&roster) == vec!["grace"] {
            break roster;
        }
    };
    assert_eq!(users(&roster), vec!["grace"]);
}

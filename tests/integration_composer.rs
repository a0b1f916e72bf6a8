use inbox_client::adapters::InMemoryTransport;
use inbox_client::domain::{ConversationId, LinkState, OutboundMessage};
use inbox_client::services::SessionEvent;
use std::sync::Arc;
use tokio::sync::watch;

mod common;
use common::*;

async fn ready(memory: &Arc<InMemoryTransport>) -> Harness {
    let mut h = mount(FakeWorkspaceApi::new(), connected(memory), known());
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Connected)).await;
    h
}

#[tokio::test]
async fn test_blank_input_publishes_nothing() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let h = ready(&memory).await;

    for text in ["", "   ", "\n"] {
        h.session.set_input(text).await.unwrap();
        h.session.submit().await.unwrap();
    }
    let report = h.session.close().await.unwrap();

    assert!(memory.published().is_empty());
    assert!(report.live.is_empty());
}

#[tokio::test]
async fn test_submit_publishes_once_and_clears_input() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = ready(&memory).await;

    h.session.set_input("hello").await.unwrap();
    h.session.submit().await.unwrap();

    assert_eq!(next_event_skipping_history(&mut h).await, SessionEvent::InputChanged(String::new()));
    let expected = OutboundMessage {
        conversation_id: ConversationId::new(CONVERSATION),
        message: "hello".to_string(),
        workspace_id: WORKSPACE,
    };
    assert_eq!(next_event_skipping_history(&mut h).await, SessionEvent::Published(expected));

    // The input is empty now, so a second submit has nothing to send.
    h.session.submit().await.unwrap();
    h.session.close().await.unwrap();

    let published = memory.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].destination, "/pub/inbox");
    assert_eq!(published[0].headers.get("userId").map(String::as_str), Some("1"));

    let body: serde_json::Value = serde_json::from_str(&published[0].body).unwrap();
    assert_eq!(body, serde_json::json!({ "uuid": CONVERSATION, "message": "hello", "workspaceId": WORKSPACE }));
}

#[tokio::test]
async fn test_submit_without_connection_is_blocked() {
    let (connection, _) = watch::channel(None);
    let mut h = mount(FakeWorkspaceApi::new(), connection, known());

    h.session.set_input("hello").await.unwrap();
    h.session.submit().await.unwrap();
    h.session.close().await.unwrap();

    while let Some(event) = h.events.recv().await {
        assert!(!matches!(event, SessionEvent::Published(_) | SessionEvent::InputChanged(_)), "{event:?}");
    }
}

async fn next_event_skipping_history(h: &mut Harness) -> SessionEvent {
    wait_for(&mut h.events, |e| !matches!(e, SessionEvent::HistoryMerged { .. } | SessionEvent::HistoryExhausted))
        .await
}

use inbox_client::adapters::{InMemoryTransport, Transport};
use inbox_client::domain::{ConversationId, ConversationTarget, LinkState};
use inbox_client::services::SessionEvent;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::*;

fn topic(conversation: &str) -> String {
    format!("/sub/inbox/{conversation}")
}

fn payload(id: i64, user_id: i64) -> String {
    serde_json::to_string(&msg(id, user_id)).unwrap()
}

async fn wait_subscribed(h: &mut Harness) -> String {
    match wait_for(&mut h.events, |e| matches!(e, SessionEvent::Subscribed { .. })).await {
        SessionEvent::Subscribed { topic } => topic,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_pushed_message_is_appended_and_scrolled_into_view() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());

    assert_eq!(wait_subscribed(&mut h).await, topic(CONVERSATION));
    assert_eq!(memory.deliver(&topic(CONVERSATION), &payload(5, COUNTERPART)), 1);

    let appended = wait_for(&mut h.events, |e| matches!(e, SessionEvent::LiveAppended(_))).await;
    assert_eq!(appended, SessionEvent::LiveAppended(msg(5, COUNTERPART)));
    assert_eq!(h.viewport.last_render(), vec![5]);
    assert_eq!(h.viewport.scrolls().last().copied(), Some(ROW_HEIGHT));

    let report = h.session.close().await.unwrap();
    assert_eq!(ids(&report.live), vec![5]);
}

#[tokio::test]
async fn test_late_push_after_close_changes_nothing() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_subscribed(&mut h).await;

    let report = h.session.close().await.unwrap();

    assert_eq!(memory.subscriber_count(&topic(CONVERSATION)), 0);
    assert_eq!(memory.deliver(&topic(CONVERSATION), &payload(6, COUNTERPART)), 0);
    assert!(report.live.is_empty());
    while let Some(event) = h.events.recv().await {
        assert!(!matches!(event, SessionEvent::LiveAppended(_)), "late push was applied: {event:?}");
    }
}

#[tokio::test]
async fn test_push_buffered_when_closing_is_discarded() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_subscribed(&mut h).await;

    // Queued in the subscription before the session gets to run again.
    assert_eq!(memory.deliver(&topic(CONVERSATION), &payload(7, COUNTERPART)), 1);
    let report = h.session.close().await.unwrap();

    assert!(report.live.is_empty());
    assert_eq!(memory.subscriber_count(&topic(CONVERSATION)), 0);
    while let Some(event) = h.events.recv().await {
        assert!(!matches!(event, SessionEvent::LiveAppended(_)), "buffered push was applied: {event:?}");
    }
}

#[tokio::test]
async fn test_close_completes_while_host_ignores_events() {
    const PUSHES: i64 = 100;
    let memory = Arc::new(InMemoryTransport::new(128));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_subscribed(&mut h).await;

    for id in 1..=PUSHES {
        assert_eq!(memory.deliver(&topic(CONVERSATION), &payload(id, COUNTERPART)), 1);
        tokio::task::yield_now().await;
    }
    let applied = async {
        while h.viewport.last_render().len() < PUSHES as usize {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), applied).await.expect("pushes stalled behind unread events");

    let report = tokio::time::timeout(Duration::from_secs(2), h.session.close())
        .await
        .expect("close hung behind unread events")
        .unwrap();
    assert_eq!(report.live.len(), PUSHES as usize);
}

#[tokio::test]
async fn test_new_connection_is_subscribed_again() {
    let first = Arc::new(InMemoryTransport::new(8));
    let second = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&first), known());
    wait_subscribed(&mut h).await;

    let replacement: Arc<dyn Transport> = second.clone();
    h.connection.send_replace(Some(replacement));
    assert_eq!(wait_subscribed(&mut h).await, topic(CONVERSATION));

    assert_eq!(first.subscriber_count(&topic(CONVERSATION)), 0);
    assert_eq!(second.subscriber_count(&topic(CONVERSATION)), 1);
    h.session.close().await.unwrap();
}

#[tokio::test]
async fn test_link_follows_connection_availability() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Connected)).await;

    h.connection.send_replace(None);
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Disconnected)).await;
    assert_eq!(memory.subscriber_count(&topic(CONVERSATION)), 0);

    let restored: Arc<dyn Transport> = memory.clone();
    h.connection.send_replace(Some(restored));
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Connected)).await;
    assert_eq!(memory.subscriber_count(&topic(CONVERSATION)), 1);
    h.session.close().await.unwrap();
}

#[tokio::test]
async fn test_transport_closing_marks_link_not_ready() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Connected)).await;

    memory.close();
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Disconnected)).await;
    h.session.close().await.unwrap();
}

#[tokio::test]
async fn test_malformed_push_blocks_sending() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Connected)).await;

    memory.deliver(&topic(CONVERSATION), "null");
    wait_for(&mut h.events, |e| *e == SessionEvent::LinkChanged(LinkState::Disconnected)).await;

    h.session.set_input("hello").await.unwrap();
    h.session.submit().await.unwrap();
    let report = h.session.close().await.unwrap();

    assert!(memory.published().is_empty());
    assert!(report.live.is_empty());
}

#[tokio::test]
async fn test_lookup_resolves_before_subscribing() {
    let api = FakeWorkspaceApi::new();
    api.set_conversation("c-77");
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(api.clone(), connected(&memory), ConversationTarget::Lookup);

    let resolved = wait_for(&mut h.events, |e| matches!(e, SessionEvent::ConversationResolved(_))).await;
    assert_eq!(resolved, SessionEvent::ConversationResolved(ConversationId::new("c-77")));
    assert_eq!(wait_subscribed(&mut h).await, topic("c-77"));
    assert_eq!(api.resolve_calls(), 1);
    h.session.close().await.unwrap();
}

#[tokio::test]
async fn test_retarget_moves_subscription() {
    let memory = Arc::new(InMemoryTransport::new(8));
    let mut h = mount(FakeWorkspaceApi::new(), connected(&memory), known());
    wait_subscribed(&mut h).await;

    h.session.retarget(ConversationTarget::Known(ConversationId::new("c-43"))).await.unwrap();
    assert_eq!(wait_subscribed(&mut h).await, topic("c-43"));

    assert_eq!(memory.subscriber_count(&topic(CONVERSATION)), 0);
    assert_eq!(memory.subscriber_count(&topic("c-43")), 1);
    h.session.close().await.unwrap();
}

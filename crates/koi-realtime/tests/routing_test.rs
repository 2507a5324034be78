//! Integration tests for message routing, sends, typing, and presence.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpers::{TestClient, inbound_message, settle};
use koi_core::types::{ConversationId, UserId};
use koi_realtime::event::bus::{ClientEvent, EventKind};
use koi_realtime::message::types::{InboundFrame, MessageStatus, OutboundFrame};

#[tokio::test(start_paused = true)]
async fn test_inbound_message_reaches_each_listener_once() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    let conversation = ConversationId::new();
    let topic_hits = Arc::new(Mutex::new(0u32));
    let counter = topic_hits.clone();
    let _handles = app.client.subscribe_conversation(conversation, move |event| {
        if matches!(event, ClientEvent::Message { .. }) {
            *counter.lock().unwrap() += 1;
        }
    });
    let bus_events = app.record(EventKind::Message);

    let (message, frame) = inbound_message(conversation, UserId::new(), "hello");
    app.transport.push_inbound(&frame).await;
    settle().await;

    assert_eq!(*topic_hits.lock().unwrap(), 1);
    assert_eq!(bus_events.lock().unwrap().len(), 1);

    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, message.id);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_inbound_message_merges() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    let conversation = ConversationId::new();
    let (_, frame) = inbound_message(conversation, UserId::new(), "once");
    app.transport.push_inbound(&frame).await;
    app.transport.push_inbound(&frame).await;
    settle().await;

    assert_eq!(app.client.visible_messages(&conversation).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_is_optimistic_and_echo_reconciles() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;
    app.transport.sent_frames();

    let conversation = ConversationId::new();
    let sent = app.client.send_text(conversation, "hi there").await.unwrap();
    assert_eq!(sent.status, MessageStatus::Sending);

    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].status, MessageStatus::Sending);

    let published = app
        .transport
        .sent_frames()
        .into_iter()
        .any(|f| matches!(f, OutboundFrame::Message { message } if message.id == sent.id));
    assert!(published, "message frame must go out on the transport");

    // Backend echo with the same id replaces the optimistic copy.
    let mut echoed = sent.clone();
    echoed.status = MessageStatus::Sent;
    app.transport
        .push_inbound(&InboundFrame::Message { message: echoed })
        .await;
    settle().await;

    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1, "echo must merge, not duplicate");
    assert_eq!(visible[0].status, MessageStatus::Sent);
    assert_eq!(app.rest.created_count(), 0, "no REST fallback when connected");
}

#[tokio::test(start_paused = true)]
async fn test_send_falls_back_to_rest_when_disconnected() {
    let app = TestClient::new();

    let conversation = ConversationId::new();
    let sent = app.client.send_text(conversation, "offline").await.unwrap();

    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(app.rest.created_count(), 1);

    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1, "fallback result must merge over the optimistic copy");
    assert_eq!(visible[0].status, MessageStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn test_rest_fallback_then_transport_echo_does_not_duplicate() {
    let app = TestClient::new();

    // Sent while offline: goes through the REST fallback.
    let conversation = ConversationId::new();
    let sent = app.client.send_text(conversation, "mid-flight").await.unwrap();
    assert_eq!(app.rest.created_count(), 1);

    // The transport comes up afterwards and echoes the same message.
    app.connect().await;
    settle().await;
    let mut echoed = sent.clone();
    echoed.status = MessageStatus::Delivered;
    app.transport
        .push_inbound(&InboundFrame::Message { message: echoed })
        .await;
    settle().await;

    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1, "echo after reconnect must merge by id");
    assert_eq!(visible[0].status, MessageStatus::Delivered);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_marks_message_failed() {
    let app = TestClient::new();
    app.rest.fail_creates();
    let errors = app.record(EventKind::Error);

    let conversation = ConversationId::new();
    let result = app.client.send_text(conversation, "doomed").await;
    assert!(result.is_err());

    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].status, MessageStatus::Failed);

    let failures = errors
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ClientEvent::SendFailed { .. }))
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_typing_stop_is_debounced() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;
    app.transport.sent_frames();

    let conversation = ConversationId::new();
    app.client.notify_typing(conversation);
    app.client.notify_typing(conversation);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let indicators: Vec<bool> = app
        .transport
        .sent_frames()
        .into_iter()
        .filter_map(|f| match f {
            OutboundFrame::Typing { is_typing, .. } => Some(is_typing),
            _ => None,
        })
        .collect();

    // One start per keystroke, a single debounced stop.
    assert_eq!(indicators, vec![true, true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_own_typing_echo_is_ignored() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    let typing_events = app.record(EventKind::Typing);
    let conversation = ConversationId::new();

    app.transport
        .push_inbound(&InboundFrame::Typing {
            conversation_id: conversation,
            user_id: app.identity,
            is_typing: true,
        })
        .await;
    app.transport
        .push_inbound(&InboundFrame::Typing {
            conversation_id: conversation,
            user_id: UserId::new(),
            is_typing: true,
        })
        .await;
    settle().await;

    assert_eq!(typing_events.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_and_delete_update_the_log() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    let conversation = ConversationId::new();
    let (message, frame) = inbound_message(conversation, UserId::new(), "receipt me");
    app.transport.push_inbound(&frame).await;

    app.transport
        .push_inbound(&InboundFrame::Read {
            conversation_id: conversation,
            user_id: UserId::new(),
            message_id: message.id,
        })
        .await;
    settle().await;
    assert_eq!(
        app.client.visible_messages(&conversation)[0].status,
        MessageStatus::Read
    );

    app.transport
        .push_inbound(&InboundFrame::Delete {
            conversation_id: conversation,
            message_id: message.id,
        })
        .await;
    settle().await;

    // Deletion keeps a tombstone, not a hole.
    let visible = app.client.visible_messages(&conversation);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].status, MessageStatus::Deleted);
}

#[tokio::test(start_paused = true)]
async fn test_presence_emits_only_on_transition() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    let presence_events = app.record(EventKind::Presence);
    let peer = UserId::new();

    app.transport
        .push_inbound(&InboundFrame::PresenceOnline { user_id: peer })
        .await;
    app.transport
        .push_inbound(&InboundFrame::PresenceOnline { user_id: peer })
        .await;
    settle().await;

    assert!(app.client.is_online(peer));
    assert_eq!(presence_events.lock().unwrap().len(), 1);

    app.transport
        .push_inbound(&InboundFrame::PresenceOffline { user_id: peer })
        .await;
    settle().await;

    assert!(!app.client.is_online(peer));
    assert_eq!(presence_events.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_frame_surfaces_on_the_bus() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    let errors = app.record(EventKind::Error);
    app.transport
        .push_inbound(&InboundFrame::Error {
            code: "rate_limited".to_string(),
            message: "slow down".to_string(),
        })
        .await;
    settle().await;

    let codes: Vec<String> = errors
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ClientEvent::ServerError { code, .. } => Some(code.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(codes, vec!["rate_limited".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_dropped() {
    let app = TestClient::new();
    app.connect().await;
    settle().await;

    // Garbage first, then a valid frame on the same stream: the reader
    // must drop the former and still deliver the latter.
    let conversation = ConversationId::new();
    let (_, frame) = inbound_message(conversation, UserId::new(), "still alive");
    app.transport.push_raw("{not json".to_string()).await;
    app.transport.push_inbound(&frame).await;
    settle().await;

    assert_eq!(app.client.visible_messages(&conversation).len(), 1);
    assert!(app.client.is_connected());
}

//! Shared test helpers: scripted transport and REST mocks.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use koi_core::config::ClientConfig;
use koi_core::error::ClientError;
use koi_core::result::ClientResult;
use koi_core::types::{ConversationId, MessageId, UserId};

use koi_realtime::RealtimeClient;
use koi_realtime::call::negotiator::NullNegotiator;
use koi_realtime::connection::transport::{Transport, TransportEndpoint, TransportLink};
use koi_realtime::event::bus::{ClientEvent, EventKind};
use koi_realtime::message::types::{ChatMessage, InboundFrame, MessageBody, MessageStatus, OutboundFrame};
use koi_realtime::rest::api::RestApi;

/// One live scripted connection.
struct MockConnection {
    inbound: Option<mpsc::Sender<String>>,
    outbound: Option<mpsc::Receiver<String>>,
}

struct MockState {
    /// When each connect attempt arrived, in order.
    attempts: Vec<Instant>,
    /// Attempts to fail before connects start succeeding.
    failures_remaining: usize,
    /// Fail every attempt.
    fail_all: bool,
    /// Connections handed out, oldest first.
    connections: Vec<MockConnection>,
}

/// Transport whose connect outcomes are scripted by the test.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// A transport where every connect succeeds.
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    /// A transport failing the first `n` connect attempts.
    pub fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                attempts: Vec::new(),
                failures_remaining: n,
                fail_all: false,
                connections: Vec::new(),
            }),
        })
    }

    /// A transport where every connect fails.
    pub fn always_failing() -> Arc<Self> {
        let transport = Self::new();
        transport.state.lock().unwrap().fail_all = true;
        transport
    }

    /// Number of connect attempts made so far.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    /// When each connect attempt arrived.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Injects an inbound frame on the newest live connection.
    pub async fn push_inbound(&self, frame: &InboundFrame) {
        self.push_raw(serde_json::to_string(frame).unwrap()).await;
    }

    /// Injects a raw inbound text frame.
    pub async fn push_raw(&self, text: String) {
        let sender = {
            let state = self.state.lock().unwrap();
            state
                .connections
                .last()
                .and_then(|c| c.inbound.clone())
                .expect("no live connection")
        };
        sender.send(text).await.unwrap();
    }

    /// Drains and parses every frame sent on connection `index`.
    pub fn sent_frames_on(&self, index: usize) -> Vec<OutboundFrame> {
        let mut state = self.state.lock().unwrap();
        let outbound = state.connections[index]
            .outbound
            .as_mut()
            .expect("connection outbound already closed");

        let mut frames = Vec::new();
        while let Ok(text) = outbound.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    /// Drains and parses every frame sent on the newest connection.
    pub fn sent_frames(&self) -> Vec<OutboundFrame> {
        let index = self.state.lock().unwrap().connections.len() - 1;
        self.sent_frames_on(index)
    }

    /// Severs the newest connection: the reader sees end-of-stream.
    pub fn drop_link(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(connection) = state.connections.last_mut() {
            connection.inbound.take();
            connection.outbound.take();
        }
    }

    /// Closes only the outbound half, leaving the reader blocked. Only
    /// the heartbeat can notice this kind of death.
    pub fn close_outbound(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(connection) = state.connections.last_mut() {
            connection.outbound.take();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _endpoint: &TransportEndpoint,
    ) -> ClientResult<(TransportLink, mpsc::Receiver<String>)> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(Instant::now());

        if state.fail_all || state.failures_remaining > 0 {
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
            }
            return Err(ClientError::transport("scripted connect failure"));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        state.connections.push(MockConnection {
            inbound: Some(inbound_tx),
            outbound: Some(outbound_rx),
        });
        Ok((TransportLink::new(outbound_tx), inbound_rx))
    }
}

/// REST collaborator with scripted outcomes.
pub struct MockRest {
    fail_create: AtomicBool,
    /// Messages accepted by `create_message`.
    pub created: Mutex<Vec<ChatMessage>>,
    /// Snapshot returned by `presence_snapshot`.
    pub online: Mutex<Vec<UserId>>,
}

impl MockRest {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_create: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            online: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn set_online(&self, users: Vec<UserId>) {
        *self.online.lock().unwrap() = users;
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl RestApi for MockRest {
    async fn create_message(&self, message: &ChatMessage) -> ClientResult<ChatMessage> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClientError::rest("scripted create failure"));
        }
        let mut persisted = message.clone();
        persisted.status = MessageStatus::Sent;
        self.created.lock().unwrap().push(persisted.clone());
        Ok(persisted)
    }

    async fn presence_snapshot(&self) -> ClientResult<Vec<UserId>> {
        Ok(self.online.lock().unwrap().clone())
    }
}

/// A wired client plus handles to its scripted collaborators.
pub struct TestClient {
    pub client: RealtimeClient,
    pub transport: Arc<MockTransport>,
    pub rest: Arc<MockRest>,
    pub identity: UserId,
}

impl TestClient {
    pub fn new() -> Self {
        Self::with_transport(MockTransport::new())
    }

    pub fn with_transport(transport: Arc<MockTransport>) -> Self {
        let identity = UserId::new();
        let rest = MockRest::new();
        let client = RealtimeClient::new(
            identity,
            ClientConfig::default(),
            transport.clone(),
            rest.clone(),
            Arc::new(NullNegotiator),
        );
        Self {
            client,
            transport,
            rest,
            identity,
        }
    }

    pub async fn connect(&self) {
        self.client.connect("ws://mock", "test-token").await;
    }

    /// Registers a recorder for one event category. The listener stays
    /// registered for the test's lifetime.
    pub fn record(&self, kind: EventKind) -> Arc<Mutex<Vec<ClientEvent>>> {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let inner = sink.clone();
        let _handle = self
            .client
            .on(kind, move |event| inner.lock().unwrap().push(event.clone()));
        sink
    }
}

/// An inbound message frame from a given sender.
pub fn inbound_message(
    conversation_id: ConversationId,
    sender_id: UserId,
    text: &str,
) -> (ChatMessage, InboundFrame) {
    let message = ChatMessage {
        id: MessageId::new(),
        conversation_id,
        sender_id,
        body: MessageBody::Text {
            text: text.to_string(),
        },
        status: MessageStatus::Sent,
        created_at: Utc::now(),
    };
    let frame = InboundFrame::Message {
        message: message.clone(),
    };
    (message, frame)
}

/// Lets spawned engine tasks run (and the paused clock tick forward).
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
}

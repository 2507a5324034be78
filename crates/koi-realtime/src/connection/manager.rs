//! Connection manager — owns the persistent transport lifecycle.
//!
//! One manager instance owns one logical connection: it dials, tracks
//! state on a `watch` channel, runs the heartbeat, and schedules capped
//! exponential-backoff reconnects after unexpected drops. Transport
//! failures are handled here; only `ReconnectExhausted` crosses the
//! component boundary.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use koi_core::config::realtime::RealtimeConfig;
use koi_core::types::UserId;

use crate::channel::registry::SubscriptionRegistry;
use crate::event::bus::{ClientEvent, EventBus};
use crate::message::types::OutboundFrame;
use crate::presence::tracker::PresenceTracker;
use crate::rest::api::RestApi;

use super::backoff::ReconnectPolicy;
use super::heartbeat;
use super::state::{ConnectionState, ConnectionStatus};
use super::transport::{FrameDispatcher, FrameSender, Transport, TransportEndpoint};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Manages the persistent connection to the messaging backend.
pub struct ConnectionManager {
    /// Configuration.
    config: RealtimeConfig,
    /// Reconnect backoff policy.
    policy: ReconnectPolicy,
    /// Transport implementation.
    transport: Arc<dyn Transport>,
    /// Subscription registry, replayed after reconnect.
    registry: Arc<SubscriptionRegistry>,
    /// Presence tracker, re-bootstrapped after reconnect.
    presence: Arc<PresenceTracker>,
    /// REST collaborator for the presence snapshot.
    rest: Arc<dyn RestApi>,
    /// Inbound frame consumer.
    dispatcher: Arc<dyn FrameDispatcher>,
    /// Event bus.
    bus: Arc<EventBus>,
    /// Shared outbound sender; the live link is installed here.
    sender: FrameSender,
    /// Connection state publisher.
    state_tx: watch::Sender<ConnectionState>,
    /// Endpoint of the current logical session.
    endpoint: Mutex<Option<TransportEndpoint>>,
    /// Consecutive failed reconnect attempts.
    retry_count: AtomicU32,
    /// Most recent transport error.
    last_error: Mutex<Option<String>>,
    /// When the last heartbeat check passed.
    last_heartbeat_at: Mutex<Option<DateTime<Utc>>>,
    /// Whether `ReconnectExhausted` already fired for this failure run.
    exhausted: AtomicBool,
    /// Session-scoped token; cancelled by `disconnect`.
    lifecycle: Mutex<CancellationToken>,
    /// Connection-scoped token; cancelled when the link drops.
    conn_token: Mutex<Option<CancellationToken>>,
    /// Pending backoff timer; cancelled when an attempt supersedes it.
    reconnect_timer: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a new connection manager.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
        presence: Arc<PresenceTracker>,
        rest: Arc<dyn RestApi>,
        dispatcher: Arc<dyn FrameDispatcher>,
        bus: Arc<EventBus>,
        sender: FrameSender,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            config,
            policy,
            transport,
            registry,
            presence,
            rest,
            dispatcher,
            bus,
            sender,
            state_tx,
            endpoint: Mutex::new(None),
            retry_count: AtomicU32::new(0),
            last_error: Mutex::new(None),
            last_heartbeat_at: Mutex::new(None),
            exhausted: AtomicBool::new(false),
            lifecycle: Mutex::new(CancellationToken::new()),
            conn_token: Mutex::new(None),
            reconnect_timer: Mutex::new(None),
        }
    }

    /// Connects to the backend as the given identity.
    ///
    /// Idempotent: resolves immediately when already connected, and joins
    /// an in-flight attempt instead of starting a second one. A failed
    /// attempt does not error; it moves the state to `Failing`, surfaces
    /// a `TransportError` event, and schedules a reconnect.
    pub async fn connect(self: &Arc<Self>, endpoint: TransportEndpoint) {
        let mut state_rx = self.state_tx.subscribe();
        loop {
            let current = *state_rx.borrow();
            match current {
                ConnectionState::Connected => return,
                ConnectionState::Connecting => {
                    if state_rx.changed().await.is_err() {
                        return;
                    }
                }
                ConnectionState::Disconnected | ConnectionState::Failing => break,
            }
        }

        *lock(&self.endpoint) = Some(endpoint);
        self.exhausted.store(false, Ordering::SeqCst);
        self.clone().establish().await;
    }

    /// Tears the connection down and cancels everything pending.
    ///
    /// Idempotent. Cancels the reconnect timer and heartbeat, unsubscribes
    /// every live topic, closes the transport, and moves to `Disconnected`.
    pub async fn disconnect(&self) {
        let session = {
            let mut guard = lock(&self.lifecycle);
            std::mem::replace(&mut *guard, CancellationToken::new())
        };
        session.cancel();
        if let Some(token) = lock(&self.conn_token).take() {
            token.cancel();
        }
        if let Some(pending) = lock(&self.reconnect_timer).take() {
            pending.cancel();
        }

        // Best-effort unsubscribe frames go out while the link is alive.
        self.registry.unsubscribe_all();
        self.sender.clear();
        *lock(&self.endpoint) = None;

        let changed = self.state_tx.send_if_modified(|state| {
            if *state != ConnectionState::Disconnected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Disconnected from messaging backend");
            self.bus.emit(ClientEvent::ConnectionChanged {
                state: ConnectionState::Disconnected,
            });
        }
    }

    /// Whether the transport is currently connected.
    pub fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    /// Snapshot of connection health.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: *self.state_tx.borrow(),
            retry_count: self.retry_count.load(Ordering::SeqCst),
            last_error: lock(&self.last_error).clone(),
            last_heartbeat_at: *lock(&self.last_heartbeat_at),
        }
    }

    /// The identity the current session connected as.
    pub fn identity(&self) -> Option<UserId> {
        lock(&self.endpoint).as_ref().and_then(|e| e.user_id)
    }

    /// One connection attempt.
    async fn establish(self: Arc<Self>) {
        let session = lock(&self.lifecycle).clone();
        if session.is_cancelled() {
            return;
        }

        // This attempt supersedes any scheduled retry.
        if let Some(pending) = lock(&self.reconnect_timer).take() {
            pending.cancel();
        }

        // An attempt already in flight (or a live connection) wins.
        let current = *self.state_tx.borrow();
        if matches!(
            current,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }

        let endpoint = match lock(&self.endpoint).clone() {
            Some(endpoint) => endpoint,
            None => return,
        };

        self.set_state(ConnectionState::Connecting);

        match self.transport.connect(&endpoint).await {
            Ok((link, inbound)) => {
                if session.is_cancelled() {
                    // disconnect() raced the dial; drop the fresh link.
                    return;
                }

                self.sender.install(link);
                self.retry_count.store(0, Ordering::SeqCst);
                *lock(&self.last_error) = None;
                *lock(&self.last_heartbeat_at) = Some(Utc::now());
                self.set_state(ConnectionState::Connected);
                info!(url = %endpoint.url, "Transport connected");

                let conn_token = session.child_token();
                if let Some(previous) = lock(&self.conn_token).replace(conn_token.clone()) {
                    previous.cancel();
                }
                self.spawn_reader(inbound, conn_token.clone());
                heartbeat::spawn(self.clone(), conn_token);

                self.registry.flush();
                self.bootstrap_presence().await;
            }
            Err(e) => {
                warn!(error = %e, url = %endpoint.url, "Connection attempt failed");
                *lock(&self.last_error) = Some(e.to_string());
                self.set_state(ConnectionState::Failing);
                self.bus.emit(ClientEvent::TransportError {
                    message: e.to_string(),
                });
                self.schedule_reconnect();
            }
        }
    }

    /// Reacts to an unexpected drop: reader stream ended, heartbeat
    /// failed, or a dead socket. Explicit `disconnect` never comes here.
    pub(crate) async fn handle_drop(self: &Arc<Self>, reason: &str) {
        let was_connected = self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Failing;
                true
            } else {
                false
            }
        });
        if !was_connected {
            return;
        }

        warn!(reason, "Transport dropped unexpectedly");
        if let Some(token) = lock(&self.conn_token).take() {
            token.cancel();
        }
        self.sender.clear();
        *lock(&self.last_error) = Some(reason.to_string());

        self.bus.emit(ClientEvent::ConnectionChanged {
            state: ConnectionState::Failing,
        });
        self.bus.emit(ClientEvent::TransportError {
            message: reason.to_string(),
        });
        self.schedule_reconnect();
    }

    /// Schedules the next reconnect attempt, or gives up when the policy
    /// is exhausted.
    fn schedule_reconnect(self: &Arc<Self>) {
        let attempt = self.retry_count.load(Ordering::SeqCst);
        if self.policy.is_exhausted(attempt) {
            if !self.exhausted.swap(true, Ordering::SeqCst) {
                error!(attempts = attempt, "Reconnect attempts exhausted");
                self.set_state(ConnectionState::Disconnected);
                self.bus
                    .emit(ClientEvent::ReconnectExhausted { attempts: attempt });
            }
            return;
        }

        let delay = self.policy.delay(attempt);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        let timer = lock(&self.lifecycle).child_token();
        if let Some(previous) = lock(&self.reconnect_timer).replace(timer.clone()) {
            previous.cancel();
        }

        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    manager.retry_count.fetch_add(1, Ordering::SeqCst);
                    manager.establish().await;
                }
            }
        });
    }

    /// One heartbeat check. Returns `false` when the loop should stop.
    pub(crate) async fn heartbeat_tick(self: &Arc<Self>) -> bool {
        if !self.is_connected() {
            return false;
        }

        if !self.sender.link_open() {
            self.handle_drop("heartbeat: transport closed").await;
            return false;
        }

        let ping = OutboundFrame::Ping {
            timestamp: Utc::now().timestamp_millis(),
        };
        if self.sender.send(&ping).is_err() {
            self.handle_drop("heartbeat: ping send failed").await;
            return false;
        }

        *lock(&self.last_heartbeat_at) = Some(Utc::now());
        true
    }

    /// Forwards inbound frames, one at a time in arrival order, to the
    /// dispatcher. The receiver yielding `None` means the link dropped.
    fn spawn_reader(self: &Arc<Self>, mut inbound: mpsc::Receiver<String>, token: CancellationToken) {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    frame = inbound.recv() => match frame {
                        Some(raw) => manager.dispatcher.dispatch(&raw).await,
                        None => {
                            manager.handle_drop("transport stream ended").await;
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Replaces the presence set from a fresh REST snapshot.
    async fn bootstrap_presence(&self) {
        match self.rest.presence_snapshot().await {
            Ok(user_ids) => {
                debug!(count = user_ids.len(), "Presence snapshot applied");
                self.presence.set_all(user_ids.clone());
                self.bus
                    .emit(ClientEvent::PresenceSnapshot { online: user_ids });
            }
            Err(e) => warn!(error = %e, "Presence bootstrap failed"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(?state, "Connection state changed");
            self.bus.emit(ClientEvent::ConnectionChanged { state });
        }
    }

    /// Heartbeat interval from configuration.
    pub(crate) fn heartbeat_interval(&self) -> std::time::Duration {
        self.config.heartbeat_interval()
    }
}

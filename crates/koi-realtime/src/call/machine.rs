//! Call session state machine.
//!
//! Drives one active call along the fixed transition graph:
//!
//! ```text
//! Idle → RingingOutgoing → Connected → Ended → Idle
//! Idle → RingingIncoming → Connected
//!        RingingIncoming → Ended (decline / ring timeout)
//! ```
//!
//! Out-of-order signals are logged and ignored, never fatal. Each timer
//! (ring window, duration ticker, teardown delay) carries the generation
//! current when it was armed; a fire against a stale generation is a
//! no-op, so a cancelled timer can never mutate a newer session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use koi_core::config::call::CallConfig;
use koi_core::error::ClientError;
use koi_core::result::ClientResult;
use koi_core::types::{CallId, UserId};

use crate::connection::transport::FrameSender;
use crate::event::bus::{ClientEvent, EventBus};
use crate::message::types::OutboundFrame;

use super::negotiator::MediaNegotiator;
use super::session::{CallFlags, CallSession, CallSnapshot, CallStatus, CallType, EndReason};
use super::signal::CallSignal;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Finite-state machine for the single active call session.
pub struct CallMachine {
    config: CallConfig,
    sender: FrameSender,
    bus: Arc<EventBus>,
    negotiator: Arc<dyn MediaNegotiator>,
    /// Local user, stamped on outbound signals.
    identity: UserId,
    /// The session. Single-writer: only this machine mutates it.
    session: Mutex<CallSession>,
    /// Bumped on every transition; timers validate against it.
    generation: AtomicU64,
    ring_timer: Mutex<Option<CancellationToken>>,
    ticker: Mutex<Option<CancellationToken>>,
    teardown: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for CallMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallMachine")
            .field("status", &lock(&self.session).status)
            .finish()
    }
}

impl CallMachine {
    /// Creates an idle call machine.
    pub fn new(
        config: CallConfig,
        sender: FrameSender,
        bus: Arc<EventBus>,
        negotiator: Arc<dyn MediaNegotiator>,
        identity: UserId,
    ) -> Self {
        Self {
            config,
            sender,
            bus,
            negotiator,
            identity,
            session: Mutex::new(CallSession::idle()),
            generation: AtomicU64::new(0),
            ring_timer: Mutex::new(None),
            ticker: Mutex::new(None),
            teardown: Mutex::new(None),
        }
    }

    /// Snapshot of the current session.
    pub fn snapshot(&self) -> CallSnapshot {
        lock(&self.session).clone()
    }

    /// Places an outgoing call. Legal only from `Idle`.
    pub fn initiate_call(
        self: &Arc<Self>,
        remote: UserId,
        call_type: CallType,
        is_group: bool,
    ) -> ClientResult<CallSnapshot> {
        let call_id = CallId::new();
        let snapshot = {
            let mut session = lock(&self.session);
            if session.status != CallStatus::Idle {
                return Err(ClientError::invalid_signal(format!(
                    "cannot initiate a call while {:?}",
                    session.status
                )));
            }
            *session = CallSession {
                id: Some(call_id),
                call_type,
                status: CallStatus::RingingOutgoing,
                is_group,
                participants: if is_group {
                    std::iter::once(remote).collect()
                } else {
                    Default::default()
                },
                flags: CallFlags::default(),
                duration_seconds: 0,
                remote_user: Some(remote),
                end_reason: None,
            };
            session.clone()
        };
        self.bump();

        info!(call_id = %call_id, remote = %remote, ?call_type, is_group, "Outgoing call");
        self.emit(snapshot.clone());
        let _ = self.sender.send(&OutboundFrame::CallSignal {
            signal: CallSignal::Offer {
                call_id,
                from: self.identity,
                call_type,
                is_group,
                participants: snapshot.participants.iter().copied().collect(),
                payload: serde_json::Value::Null,
            },
        });
        Ok(snapshot)
    }

    /// Answers the ringing incoming call.
    pub fn accept(self: &Arc<Self>) -> ClientResult<CallSnapshot> {
        let call_id = {
            let session = lock(&self.session);
            if session.status != CallStatus::RingingIncoming {
                return Err(ClientError::invalid_signal(format!(
                    "cannot accept while {:?}",
                    session.status
                )));
            }
            session.id
        };

        let snapshot = self
            .connect_session()
            .ok_or_else(|| ClientError::invalid_signal("call ended before accept"))?;

        if let Some(call_id) = call_id {
            let _ = self.sender.send(&OutboundFrame::CallSignal {
                signal: CallSignal::Accept {
                    call_id,
                    from: self.identity,
                    payload: serde_json::Value::Null,
                },
            });
        }
        Ok(snapshot)
    }

    /// Declines the ringing incoming call.
    pub fn decline(self: &Arc<Self>) -> ClientResult<CallSnapshot> {
        let call_id = {
            let session = lock(&self.session);
            if session.status != CallStatus::RingingIncoming {
                return Err(ClientError::invalid_signal(format!(
                    "cannot decline while {:?}",
                    session.status
                )));
            }
            session.id
        };

        if let Some(call_id) = call_id {
            let _ = self.sender.send(&OutboundFrame::CallSignal {
                signal: CallSignal::Decline {
                    call_id,
                    from: self.identity,
                },
            });
        }
        self.finish(EndReason::Declined)
            .ok_or_else(|| ClientError::invalid_signal("call already ended"))
    }

    /// Hangs up the active call, ringing or connected.
    pub fn end(self: &Arc<Self>) -> ClientResult<CallSnapshot> {
        let call_id = {
            let session = lock(&self.session);
            if !session.status.is_active() {
                return Err(ClientError::invalid_signal(format!(
                    "cannot end while {:?}",
                    session.status
                )));
            }
            session.id
        };

        if let Some(call_id) = call_id {
            let _ = self.sender.send(&OutboundFrame::CallSignal {
                signal: CallSignal::End {
                    call_id,
                    from: self.identity,
                },
            });
        }
        self.finish(EndReason::Local)
            .ok_or_else(|| ClientError::invalid_signal("call already ended"))
    }

    /// Flips the mute flag. No-op outside an active call.
    pub fn toggle_mute(&self) -> CallSnapshot {
        self.toggle(|flags| flags.muted = !flags.muted)
    }

    /// Flips the camera flag. No-op outside an active call.
    pub fn toggle_video(&self) -> CallSnapshot {
        self.toggle(|flags| flags.video_on = !flags.video_on)
    }

    /// Flips the speakerphone flag. No-op outside an active call.
    pub fn toggle_speaker(&self) -> CallSnapshot {
        self.toggle(|flags| flags.speaker_on = !flags.speaker_on)
    }

    /// Flips the minimized flag. Recorded for the presentation layer,
    /// not owned by it. No-op outside an active call.
    pub fn toggle_minimized(&self) -> CallSnapshot {
        self.toggle(|flags| flags.minimized = !flags.minimized)
    }

    /// Applies one inbound signaling event.
    pub async fn handle_signal(self: &Arc<Self>, signal: CallSignal) {
        match signal {
            CallSignal::Offer {
                call_id,
                from,
                call_type,
                is_group,
                participants,
                payload,
            } => {
                let snapshot = {
                    let mut session = lock(&self.session);
                    if session.status != CallStatus::Idle {
                        warn!(call_id = %call_id, status = ?session.status, "Ignoring offer while busy");
                        return;
                    }
                    *session = CallSession {
                        id: Some(call_id),
                        call_type,
                        status: CallStatus::RingingIncoming,
                        is_group,
                        participants: if is_group {
                            participants.iter().copied().collect()
                        } else {
                            Default::default()
                        },
                        flags: CallFlags::default(),
                        duration_seconds: 0,
                        remote_user: Some(from),
                        end_reason: None,
                    };
                    session.clone()
                };
                self.bump();

                info!(call_id = %call_id, from = %from, ?call_type, "Incoming call");
                self.start_ring_timer();
                self.emit(snapshot);
                self.negotiator.handle_payload(call_id, payload).await;
            }
            CallSignal::Accept { call_id, from, payload } => {
                {
                    let session = lock(&self.session);
                    if session.status != CallStatus::RingingOutgoing
                        || session.id != Some(call_id)
                    {
                        warn!(call_id = %call_id, status = ?session.status, "Ignoring out-of-order accept");
                        return;
                    }
                }
                debug!(call_id = %call_id, from = %from, "Remote party accepted");
                if self.connect_session().is_some() {
                    self.negotiator.handle_payload(call_id, payload).await;
                }
            }
            CallSignal::Decline { call_id, from } => {
                if !self.matches_active(call_id) {
                    warn!(call_id = %call_id, "Ignoring decline for unknown call");
                    return;
                }
                debug!(call_id = %call_id, from = %from, "Remote party declined");
                self.finish(EndReason::Declined);
            }
            CallSignal::End { call_id, from } => {
                if !self.matches_active(call_id) {
                    warn!(call_id = %call_id, "Ignoring end for unknown call");
                    return;
                }
                debug!(call_id = %call_id, from = %from, "Remote party ended the call");
                self.finish(EndReason::Remote);
            }
            CallSignal::ParticipantJoined { call_id, user_id } => {
                self.update_membership(call_id, user_id, true);
            }
            CallSignal::ParticipantLeft { call_id, user_id } => {
                self.update_membership(call_id, user_id, false);
            }
        }
    }

    /// Moves a ringing session to `Connected` and starts the ticker.
    fn connect_session(self: &Arc<Self>) -> Option<CallSnapshot> {
        let snapshot = {
            let mut session = lock(&self.session);
            if !matches!(
                session.status,
                CallStatus::RingingOutgoing | CallStatus::RingingIncoming
            ) {
                return None;
            }
            session.status = CallStatus::Connected;
            session.clone()
        };
        self.bump();
        cancel_timer(&self.ring_timer);
        self.start_ticker();
        self.emit(snapshot.clone());
        Some(snapshot)
    }

    /// Moves an active session to `Ended` and arms the teardown delay.
    fn finish(self: &Arc<Self>, reason: EndReason) -> Option<CallSnapshot> {
        let snapshot = {
            let mut session = lock(&self.session);
            if !session.status.is_active() {
                return None;
            }
            session.status = CallStatus::Ended;
            session.end_reason = Some(reason);
            session.clone()
        };
        self.bump();
        cancel_timer(&self.ring_timer);
        cancel_timer(&self.ticker);

        info!(?reason, duration = snapshot.duration_seconds, "Call ended");
        self.emit(snapshot.clone());
        self.start_teardown();
        Some(snapshot)
    }

    fn update_membership(self: &Arc<Self>, call_id: CallId, user_id: UserId, joined: bool) {
        let snapshot = {
            let mut session = lock(&self.session);
            if !session.is_group
                || session.id != Some(call_id)
                || !session.status.is_active()
            {
                warn!(call_id = %call_id, "Ignoring membership change for unknown group call");
                return;
            }
            let changed = if joined {
                session.participants.insert(user_id)
            } else {
                session.participants.remove(&user_id)
            };
            if !changed {
                return;
            }
            session.clone()
        };
        self.emit(snapshot);
    }

    fn toggle(&self, apply: impl FnOnce(&mut CallFlags)) -> CallSnapshot {
        let snapshot = {
            let mut session = lock(&self.session);
            if !session.status.is_active() {
                return session.clone();
            }
            apply(&mut session.flags);
            session.clone()
        };
        self.emit(snapshot.clone());
        snapshot
    }

    /// Arms the ring window for an incoming call.
    fn start_ring_timer(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.ring_timer).replace(token.clone()) {
            previous.cancel();
        }

        let machine = self.clone();
        let generation = self.generation.load(Ordering::SeqCst);
        let window = self.config.ring_timeout();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(window) => machine.on_ring_timeout(generation),
            }
        });
    }

    fn on_ring_timeout(self: &Arc<Self>, generation: u64) {
        {
            let session = lock(&self.session);
            if self.generation.load(Ordering::SeqCst) != generation
                || session.status != CallStatus::RingingIncoming
            {
                return;
            }
        }
        info!("Incoming call unanswered, ringing window expired");
        self.finish(EndReason::Timeout);
    }

    /// Starts the once-per-second duration ticker.
    fn start_ticker(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.ticker).replace(token.clone()) {
            previous.cancel();
        }

        let machine = self.clone();
        let generation = self.generation.load(Ordering::SeqCst);
        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(1));
            // The immediate first tick is not a second of talk time.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if !machine.tick(generation) {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn tick(&self, generation: u64) -> bool {
        let mut session = lock(&self.session);
        if self.generation.load(Ordering::SeqCst) != generation
            || session.status != CallStatus::Connected
        {
            return false;
        }
        session.duration_seconds += 1;
        true
    }

    /// Arms the `Ended → Idle` teardown delay.
    fn start_teardown(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.teardown).replace(token.clone()) {
            previous.cancel();
        }

        let machine = self.clone();
        let generation = self.generation.load(Ordering::SeqCst);
        let delay = self.config.teardown_delay();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(delay) => machine.reset_to_idle(generation),
            }
        });
    }

    fn reset_to_idle(&self, generation: u64) {
        let snapshot = {
            let mut session = lock(&self.session);
            if self.generation.load(Ordering::SeqCst) != generation
                || session.status != CallStatus::Ended
            {
                return;
            }
            *session = CallSession::idle();
            // Bump under the lock: a concurrent command must never see
            // the idle session paired with the old generation.
            self.generation.fetch_add(1, Ordering::SeqCst);
            session.clone()
        };
        debug!("Call session reset to idle");
        self.emit(snapshot);
    }

    fn matches_active(&self, call_id: CallId) -> bool {
        let session = lock(&self.session);
        session.status.is_active() && session.id == Some(call_id)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn emit(&self, snapshot: CallSnapshot) {
        self.bus.emit(ClientEvent::CallStateChanged { snapshot });
    }
}

fn cancel_timer(slot: &Mutex<Option<CancellationToken>>) {
    if let Some(token) = lock(slot).take() {
        token.cancel();
    }
}

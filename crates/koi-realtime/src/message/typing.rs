//! Debounced typing indicator.
//!
//! Each keystroke sends `is_typing = true` and re-arms a per-conversation
//! timer; when the timer fires without being re-armed, `is_typing = false`
//! goes out. Sends are fire-and-forget: a failed send is dropped, never
//! retried.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use koi_core::types::{ConversationId, UserId};

use crate::connection::transport::FrameSender;
use crate::message::types::OutboundFrame;

/// Sends debounced typing indicators for the local user.
#[derive(Debug)]
pub struct TypingNotifier {
    sender: FrameSender,
    identity: UserId,
    debounce: Duration,
    /// Conversation → armed stop-timer. Entries are replaced on re-arm;
    /// a fired timer leaves its spent token in place until the next
    /// keystroke.
    timers: DashMap<ConversationId, CancellationToken>,
}

impl TypingNotifier {
    /// Creates a notifier for the local user.
    pub fn new(sender: FrameSender, identity: UserId, debounce: Duration) -> Self {
        Self {
            sender,
            identity,
            debounce,
            timers: DashMap::new(),
        }
    }

    /// Signals a keystroke in a conversation.
    pub fn keystroke(&self, conversation_id: ConversationId) {
        let _ = self.sender.send(&OutboundFrame::Typing {
            conversation_id,
            user_id: self.identity,
            is_typing: true,
        });

        // Re-arm: cancel the previous stop-timer for this conversation.
        let token = CancellationToken::new();
        if let Some(previous) = self.timers.insert(conversation_id, token.clone()) {
            previous.cancel();
        }

        let sender = self.sender.clone();
        let identity = self.identity;
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(debounce) => {
                    trace!(conversation_id = %conversation_id, "Typing stopped");
                    let _ = sender.send(&OutboundFrame::Typing {
                        conversation_id,
                        user_id: identity,
                        is_typing: false,
                    });
                }
            }
        });
    }

    /// Cancels every armed stop-timer without sending anything.
    pub fn cancel_all(&self) {
        self.timers.retain(|_, token| {
            token.cancel();
            false
        });
    }
}

//! Heartbeat monitoring for the persistent transport.
//!
//! Covers transports that die silently without a close event (device
//! sleep, backgrounded process): a failed check is treated exactly like
//! an unexpected drop.

use std::sync::Arc;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::manager::ConnectionManager;

/// Spawns the heartbeat loop for the current connection.
///
/// The loop ends when the connection-scoped token is cancelled or a
/// check fails.
pub(crate) fn spawn(manager: Arc<ConnectionManager>, token: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = time::interval(manager.heartbeat_interval());
        // The first tick completes immediately; the connection was just
        // verified by the dial, so skip it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if !manager.heartbeat_tick().await {
                        break;
                    }
                }
            }
        }

        debug!("Heartbeat loop ended");
    });
}

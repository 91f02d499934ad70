//! Per-session watch loops. One loop per active session, spawned when the
//! session enters the registry and cancelled exactly once when it leaves.

use crate::classify::classify;
use crate::exec::MuxExecutor;
use crate::orchestrator::Inner;
use beadboard_proto::{BeadId, EngineEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn the watch loop for one session.
///
/// Each tick captures a bounded pane tail, classifies it, and applies the
/// observation under the orchestrator lock. An event is emitted only when
/// the state actually changed, so the presentation queue never sees two
/// consecutive identical states for one bead. The loop body is sequential,
/// which also guarantees at most one capture is in flight per session.
///
/// Every capture runs under `exec_timeout`, so a wedged multiplexer can
/// delay one tick at most; stopping the session never waits longer than
/// that for the loop to wind down.
pub(crate) fn spawn(
    inner: Arc<Mutex<Inner>>,
    mux: Arc<dyn MuxExecutor>,
    events: mpsc::UnboundedSender<EngineEvent>,
    bead_id: BeadId,
    cancel: CancellationToken,
    poll_interval: Duration,
    capture_lines: usize,
    exec_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; skip that so a fresh session is not
        // classified before its process has printed anything.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Capture failure or expiry is itself evidence for Error, not
            // a skipped tick; the debounce in apply_observed keeps repeats
            // quiet.
            let capture =
                match tokio::time::timeout(exec_timeout, mux.capture_pane(&bead_id, capture_lines))
                    .await
                {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(err)) => {
                        debug!(bead_id = %bead_id, error = %err, "pane capture failed");
                        None
                    }
                    Err(_) => {
                        debug!(bead_id = %bead_id, "pane capture timed out");
                        None
                    }
                };
            let observed = classify(capture.as_deref());

            let mut guard = inner.lock().await;
            if cancel.is_cancelled() {
                break;
            }
            let Some(session) = guard.registry.get_mut(&bead_id) else {
                // Session removed while we were capturing; nothing may be
                // emitted for it anymore.
                break;
            };
            if let Some((from, to)) = session.apply_observed(observed) {
                info!(bead_id = %bead_id, ?from, ?to, "session state changed");
                let _ = events.send(EngineEvent::SessionStateChanged {
                    bead_id: bead_id.clone(),
                    from,
                    to,
                });
            }
        }

        debug!(bead_id = %bead_id, "monitor loop ended");
    })
}

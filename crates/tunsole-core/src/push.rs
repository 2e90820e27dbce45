// ── Push reconciler ──
//
// Keeps one service event stream open per session and merges every
// snapshot it delivers into the store. Reconnects with capped exponential
// backoff; each reconnect re-anchors through one explicit poll first.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tunsole_api::{ServiceEvents, ServiceStatusResponse, SseMessage};

use crate::config::ReconnectConfig;
use crate::model::ServiceStatus;
use crate::poll::PollingController;
use crate::store::{ResourceKey, Source, StatusStore};

/// Observable lifecycle of the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Connecting,
    Streaming,
    /// Waiting `delay` before reconnect attempt `attempt` (1-based).
    Backoff { attempt: u32, delay: Duration },
    /// The daemon rejected the token; reconciliation has ended.
    Unauthenticated,
    Stopped,
}

impl ReconcilerState {
    /// True once the reconciler will make no further connection attempts.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Stopped)
    }
}

/// Handle to a running reconciliation task.
pub struct PushReconciler {
    state: watch::Receiver<ReconcilerState>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PushReconciler {
    /// Spawn the reconciliation loop. Stops when `cancel` fires.
    pub fn spawn(poller: PollingController, config: ReconnectConfig, cancel: CancellationToken) -> Self {
        let (state_tx, state) = watch::channel(ReconcilerState::Idle);
        let handle = tokio::spawn(reconcile_loop(poller, config, state_tx, cancel.clone()));
        Self {
            state,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.clone()
    }

    /// Cancel the stream. It is not reconnected.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ── Reconnection loop ────────────────────────────────────────────────

enum StreamEnd {
    Cancelled,
    Closed,
    Idle,
    Failed(tunsole_api::Error),
}

async fn reconcile_loop(
    poller: PollingController,
    config: ReconnectConfig,
    state: watch::Sender<ReconcilerState>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        state.send_replace(ReconcilerState::Connecting);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = poller.client().open_service_events() => r,
        };

        match opened {
            Ok(events) => {
                attempt = 0;
                if connected_before {
                    info!("event stream reconnected, re-anchoring service status");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        r = poller.reanchor(ResourceKey::Service) => match r {
                            Ok(outcome) => debug!(?outcome, "re-anchor fetch complete"),
                            Err(e) => warn!(error = %e, "re-anchor fetch failed"),
                        }
                    }
                } else {
                    info!("event stream connected");
                }
                connected_before = true;
                state.send_replace(ReconcilerState::Streaming);

                match read_events(events, poller.store(), config.idle_timeout, &cancel).await {
                    StreamEnd::Cancelled => break,
                    StreamEnd::Closed => info!("event stream closed by daemon"),
                    StreamEnd::Idle => warn!(
                        idle_secs = config.idle_timeout.as_secs(),
                        "event stream silent, treating as lost"
                    ),
                    StreamEnd::Failed(e) => warn!(error = %e, "event stream failed"),
                }
            }
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "event stream rejected credentials, stopping");
                state.send_replace(ReconcilerState::Unauthenticated);
                return;
            }
            Err(e) => warn!(error = %e, attempt, "event stream connect failed"),
        }

        let delay = calculate_backoff(attempt, &config);
        attempt = attempt.saturating_add(1);
        info!(delay_ms = delay.as_millis(), attempt, "waiting before reconnect");
        state.send_replace(ReconcilerState::Backoff { attempt, delay });

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    state.send_replace(ReconcilerState::Stopped);
    debug!("event stream loop exiting");
}

// ── Single connection ────────────────────────────────────────────────

async fn read_events(
    mut events: ServiceEvents,
    store: &StatusStore,
    idle: Duration,
    cancel: &CancellationToken,
) -> StreamEnd {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamEnd::Cancelled,
            r = tokio::time::timeout(idle, events.next()) => r,
        };

        match next {
            Err(_) => return StreamEnd::Idle,
            Ok(None) => return StreamEnd::Closed,
            Ok(Some(Err(e))) => return StreamEnd::Failed(e),
            Ok(Some(Ok(message))) => merge_event(store, &message),
        }
    }
}

/// Merge one event into the store. Malformed payloads are dropped.
fn merge_event(store: &StatusStore, message: &SseMessage) {
    let payload: ServiceStatusResponse = match serde_json::from_str(&message.data) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, event = ?message.event, "dropping malformed service event");
            return;
        }
    };

    let at = payload.timestamp.unwrap_or_else(Utc::now);
    let applied = store.put(ServiceStatus::from(payload), Source::Push, at);
    trace!(%at, applied, "merged service event");
}

// ── Backoff ──────────────────────────────────────────────────────────

/// `initial * 2^attempt`, capped, then spread ±25% by a deterministic
/// jitter seeded from the attempt number. Never exceeds `max_delay`.
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let max = config.max_delay.as_secs_f64();
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(max);

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).clamp(0.0, max);

    Duration::from_secs_f64(with_jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig::default()
    }

    #[test]
    fn backoff_starts_near_initial_delay() {
        let d = calculate_backoff(0, &config());
        // sin(0) == 0, so no jitter on the first attempt
        assert_eq!(d, Duration::from_secs(1));
    }

    #[test]
    fn backoff_grows_and_stays_within_jitter_band() {
        let cfg = config();
        for attempt in 1..5 {
            let d = calculate_backoff(attempt, &cfg).as_secs_f64();
            let nominal = 2.0_f64.powi(i32::try_from(attempt).unwrap_or(0));
            assert!(d >= nominal * 0.75 && d <= nominal * 1.25, "attempt {attempt}: {d}");
        }
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        let cfg = config();
        for attempt in 0..64 {
            assert!(calculate_backoff(attempt, &cfg) <= cfg.max_delay, "attempt {attempt}");
        }
    }

    #[test]
    fn malformed_event_is_dropped() {
        let store = StatusStore::new();
        merge_event(
            &store,
            &SseMessage {
                event: None,
                data: "{not json".into(),
                id: None,
            },
        );
        assert!(store.service().is_none());
    }

    #[test]
    fn event_timestamp_orders_the_merge() {
        let store = StatusStore::new();
        let newer = r#"{"running":true,"pid":9,"timestamp":"2030-01-01T00:00:01Z"}"#;
        let older = r#"{"running":false,"timestamp":"2030-01-01T00:00:00Z"}"#;
        for data in [newer, older] {
            merge_event(
                &store,
                &SseMessage {
                    event: None,
                    data: data.into(),
                    id: None,
                },
            );
        }
        let snap = store.service().unwrap_or_else(|| unreachable!());
        assert!(snap.value.running);
        assert_eq!(snap.source, Source::Push);
    }

    #[test]
    fn terminal_states() {
        assert!(ReconcilerState::Stopped.is_terminal());
        assert!(ReconcilerState::Unauthenticated.is_terminal());
        assert!(!ReconcilerState::Backoff { attempt: 1, delay: Duration::from_secs(1) }.is_terminal());
    }
}

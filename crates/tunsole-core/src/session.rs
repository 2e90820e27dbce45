// ── Session ──
//
// Lifecycle owner for one authenticated console session: builds the
// client, performs the initial load, runs the push reconciler and owns the
// cancellation tree every background task hangs off.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tunsole_api::{ApiClient, AuthGrant, TlsMode, TransportConfig};

use crate::config::{SessionConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::ServiceStatus;
use crate::mutation::MutationCoordinator;
use crate::poll::{PollFailure, PollingController};
use crate::push::{PushReconciler, ReconcilerState};
use crate::store::{ResourceKey, StatusStore, Subscription};
use crate::traffic::{TrafficMeter, TrafficRates};

/// Session lifecycle as seen by a front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Connecting,
    Active,
    /// The daemon rejected the token; the user must log in again.
    Unauthenticated,
    Closed,
}

/// Cheaply cloneable handle; clones share one session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    client: Arc<ApiClient>,
    store: Arc<StatusStore>,
    poller: PollingController,
    mutations: MutationCoordinator,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    reconciler: Mutex<Option<Arc<PushReconciler>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    meter: Arc<StdMutex<TrafficMeter>>,
    _traffic: Subscription,
}

impl Session {
    /// Build a session from configuration. Does not touch the network.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let client = ApiClient::new(config.endpoint.as_str(), &transport)?;
        Ok(Self::with_client(config, client))
    }

    /// Build a session around an existing client (tests, custom transports).
    pub fn with_client(config: SessionConfig, client: ApiClient) -> Self {
        if let Some(token) = config.token.clone() {
            client.set_token(token);
        }
        let client = Arc::new(client);
        let store = Arc::new(StatusStore::new());
        let cancel = CancellationToken::new();
        let poller = PollingController::new(
            Arc::clone(&client),
            Arc::clone(&store),
            config.poll,
            cancel.child_token(),
        );
        let mutations = MutationCoordinator::new(Arc::clone(&client), Arc::clone(&store));

        let meter = Arc::new(StdMutex::new(TrafficMeter::new()));
        let traffic = {
            let meter = Arc::clone(&meter);
            store.subscribe::<ServiceStatus, _>(move |snap| {
                let mut meter = meter.lock().unwrap_or_else(PoisonError::into_inner);
                match snap.value.traffic {
                    Some(stats) if snap.value.running => {
                        meter.observe(stats, snap.observed_at);
                    }
                    _ => meter.clear(),
                }
            })
        };

        let (state, _) = watch::channel(SessionState::LoggedOut);

        Self {
            inner: Arc::new(SessionInner {
                config,
                client,
                store,
                poller,
                mutations,
                state,
                cancel,
                reconciler: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
                meter,
                _traffic: traffic,
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.inner.client
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.inner.store
    }

    pub fn poller(&self) -> &PollingController {
        &self.inner.poller
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.inner.mutations
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Reconciler state, or `None` when push is disabled or not started.
    pub async fn reconciler_state(&self) -> Option<ReconcilerState> {
        self.inner
            .reconciler
            .lock()
            .await
            .as_ref()
            .map(|r| r.state())
    }

    /// Latest derived upload/download rates.
    pub fn traffic_rates(&self) -> Option<TrafficRates> {
        self.inner
            .meter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rates()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Exchange `token` for a session grant and use it from now on.
    pub async fn login(&self, token: &SecretString) -> Result<AuthGrant, CoreError> {
        let grant = self
            .inner
            .client
            .login(token.expose_secret())
            .await
            .map_err(CoreError::from)?;

        let granted = if grant.token.is_empty() {
            token.clone()
        } else {
            SecretString::from(grant.token.clone())
        };
        self.inner.client.set_token(granted);
        info!(expires_in = grant.expires_in, "login accepted");
        Ok(grant)
    }

    /// Load every resource, then start push reconciliation if enabled.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.inner.state.send_replace(SessionState::Connecting);

        let poller = &self.inner.poller;
        let (device, service, proxy, routes) = tokio::join!(
            poller.refresh(ResourceKey::Device),
            poller.refresh(ResourceKey::Service),
            poller.refresh(ResourceKey::Proxy),
            poller.refresh(ResourceKey::Routes),
        );
        for result in [device, service, proxy, routes] {
            if let Err(e) = result {
                return Err(self.fail_start(e));
            }
        }

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(watch_poll_failures(
            poller.failures(),
            self.inner.state.clone(),
            self.inner.cancel.clone(),
        )));

        if self.inner.config.push_enabled {
            let reconciler = Arc::new(PushReconciler::spawn(
                poller.clone(),
                self.inner.config.reconnect.clone(),
                self.inner.cancel.child_token(),
            ));
            handles.push(tokio::spawn(watch_reconciler(
                reconciler.subscribe_state(),
                self.inner.state.clone(),
                self.inner.cancel.clone(),
            )));
            *self.inner.reconciler.lock().await = Some(reconciler);
        }
        drop(handles);

        self.inner.state.send_replace(SessionState::Active);
        info!(endpoint = %self.inner.config.endpoint, push = self.inner.config.push_enabled, "session active");
        Ok(())
    }

    /// End the session: cancel polling and the event stream, join
    /// background tasks and forget the token.
    pub async fn logout(&self) {
        self.inner.cancel.cancel();

        if let Some(reconciler) = self.inner.reconciler.lock().await.take() {
            reconciler.shutdown().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.client.clear_token();
        self.inner.state.send_replace(SessionState::Closed);
        debug!("session closed");
    }

    /// Start, run `f`, log out. Push is disabled; only the initial load
    /// and whatever `f` does hit the network.
    pub async fn oneshot<F, Fut, T>(config: SessionConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.push_enabled = false;

        let session = Session::new(cfg)?;
        session.start().await?;
        let result = f(session.clone()).await;
        session.logout().await;
        result
    }

    fn fail_start(&self, err: CoreError) -> CoreError {
        if err.is_unauthenticated() {
            self.inner.state.send_replace(SessionState::Unauthenticated);
            if !self.inner.client.has_token() {
                return CoreError::NotLoggedIn;
            }
        } else {
            self.inner.state.send_replace(SessionState::LoggedOut);
        }
        err
    }
}

// ── Background supervisors ───────────────────────────────────────────

async fn watch_reconciler(
    mut reconciler: watch::Receiver<ReconcilerState>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = reconciler.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *reconciler.borrow_and_update();
                if current == ReconcilerState::Unauthenticated {
                    warn!("event stream unauthenticated, session needs a new login");
                    state.send_replace(SessionState::Unauthenticated);
                    break;
                }
            }
        }
    }
}

async fn watch_poll_failures(
    mut failures: broadcast::Receiver<PollFailure>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            failure = failures.recv() => match failure {
                Ok(f) if f.unauthenticated => {
                    state.send_if_modified(|s| {
                        let flip = *s == SessionState::Active;
                        if flip {
                            *s = SessionState::Unauthenticated;
                        }
                        flip
                    });
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

// ── Transport wiring ─────────────────────────────────────────────────

fn build_transport(config: &SessionConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
        ..TransportConfig::default()
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

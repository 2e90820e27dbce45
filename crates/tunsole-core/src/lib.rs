// tunsole-core: Reconciled client-side state between tunsole-api and the console.

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod mutation;
pub mod poll;
pub mod push;
pub mod session;
pub mod store;
pub mod stream;
pub mod traffic;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_ENDPOINT, PollConfig, ReconnectConfig, SessionConfig, TlsVerification};
pub use error::CoreError;
pub use mutation::{
    DEFAULT_GATEWAY, DEFAULT_METRIC, MutationCoordinator, MutationPhase, ProxyRequest, RouteDraft,
    RouteRequest,
};
pub use poll::{PollFailure, PollSubscription, PollingController, RefreshOutcome};
pub use push::{PushReconciler, ReconcilerState};
pub use session::{Session, SessionState};
pub use store::{
    ResourceKey, ResourceUpdate, ResourceValue, RouteEntry, RouteTable, RouteWrite, Snapshot,
    Source, StatusStore, Subscription,
};
pub use stream::SnapshotStream;
pub use traffic::{MeterReading, TrafficMeter, TrafficRates};
pub use validate::{complete_cidr, normalize_cidr, normalize_gateway, normalize_host_port};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Cidr, DEFAULT_PROXY_ADDRESS, DeviceStatus, Host, HostPort, LinkState, ProxyConfig, ProxyType,
    Route, ServiceStatus, TrafficStats,
};

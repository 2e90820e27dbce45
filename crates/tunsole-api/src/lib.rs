// tunsole-api: Async Rust client for the tun2socks control API (REST + SSE)

pub mod auth;
pub mod client;
pub mod device;
pub mod error;
pub mod events;
pub mod proxy;
pub mod routes;
pub mod service;
pub mod sse;
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use error::Error;
pub use events::ServiceEvents;
pub use sse::{SseDecoder, SseMessage};
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    AddRouteRequest, ApiResponse, AuthGrant, DeviceStatusResponse, ProxyConfigPayload,
    RouteResponse, ServiceStatusResponse, TrafficStatsResponse,
};

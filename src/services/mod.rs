pub mod health_monitor;
pub mod request_controller;
pub mod router_service;
pub mod server_registry;
pub mod service_client;

pub use health_monitor::{HealthConfig, HealthMonitor};
pub use request_controller::{DispatchConfig, DispatchState, RequestController};
pub use router_service::{
    InverseLoadLatency, RouterError, RouterService, RoutingStrategy, Selection, Uniform,
    WeightingStrategy,
};
pub use server_registry::{
    LoadGuard, RegistryError, ServerRegistry, SharedRegistry, SweepReport,
};
pub use service_client::{
    DownstreamResponse, HttpServiceClient, ServiceClient, ServiceClientError,
};

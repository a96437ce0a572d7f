pub mod api;
pub mod dispatch;
pub mod instance;
pub mod routing;

pub use api::{
    DispatchRequest, HeartbeatRequest, ListInstancesQuery, RegisterRequest, RegisterResponse,
};
pub use dispatch::{DispatchResponse, FallbackReason};
pub use instance::{canonical_base_url, InstanceStatus, ServiceInstance, ServiceType};
pub use routing::{Payload, RoutingDecision, RoutingRequest};

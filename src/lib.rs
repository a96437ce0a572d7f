pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::HubConfig;
use services::{
    HttpServiceClient, RequestController, RouterService, ServerRegistry, ServiceClient,
    SharedRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub controller: Arc<RequestController>,
    pub config: Arc<HubConfig>,
}

impl AppState {
    /// Wires a fresh registry, router and controller using HTTP for outbound calls
    pub fn new(config: HubConfig) -> Self {
        Self::with_client(config, Arc::new(HttpServiceClient::new()))
    }

    pub fn with_client(config: HubConfig, client: Arc<dyn ServiceClient>) -> Self {
        let registry = ServerRegistry::shared();
        let strategy = config.routing_strategy.build(config.latency_scale_ms);
        let router = RouterService::new(registry.clone(), strategy);
        let controller = Arc::new(RequestController::new(
            registry.clone(),
            router,
            client,
            config.dispatch_config(),
        ));

        Self {
            registry,
            controller,
            config: Arc::new(config),
        }
    }
}

/// Builds the hub's HTTP API
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/register", post(handlers::register_handler))
        .route("/heartbeat/{instance_id}", post(handlers::heartbeat_handler))
        .route("/dispatch", post(handlers::dispatch_handler))
        .route("/instances", get(handlers::list_instances_handler))
        .route(
            "/instances/{instance_id}",
            get(handlers::get_instance_handler).delete(handlers::deregister_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub mod dispatch_handlers;
pub mod extract;
pub mod registry_handlers;

pub use dispatch_handlers::dispatch_handler;
pub use registry_handlers::{
    deregister_handler, get_instance_handler, health_handler, heartbeat_handler,
    list_instances_handler, register_handler,
};

pub mod test_helpers {
    use crate::config::HubConfig;
    use crate::models::{ServiceInstance, ServiceType};
    use crate::services::SharedRegistry;
    use std::collections::BTreeSet;
    use std::time::Duration;

    /// Build a capability set from string slices
    pub fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Register a healthy reasoning instance at `address`
    pub fn register_reasoning(registry: &SharedRegistry, address: &str) -> ServiceInstance {
        registry
            .register(ServiceType::Reasoning, address, caps(&["reasoning"]))
            .expect("Failed to register test instance")
    }

    /// Hub configuration with short timeouts suitable for tests
    pub fn test_config() -> HubConfig {
        HubConfig {
            heartbeat_interval: Duration::from_millis(100),
            unhealthy_after: Duration::from_millis(200),
            evict_after: Duration::from_millis(300),
            scan_interval: Duration::from_millis(50),
            dispatch_timeout: Duration::from_millis(200),
            ..HubConfig::default()
        }
    }
}

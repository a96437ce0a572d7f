use std::{collections::HashMap, env, time::Duration};

use mcphub::config::{ConfigError, HubConfig};
use mcphub::services::RoutingStrategy;
use serial_test::serial;

const KEYS: [&str; 10] = [
    "HUB_BIND_ADDR",
    "HUB_HEARTBEAT_INTERVAL_MS",
    "HUB_UNHEALTHY_AFTER_MS",
    "HUB_EVICT_AFTER_MS",
    "HUB_SCAN_INTERVAL_MS",
    "HUB_DISPATCH_TIMEOUT_MS",
    "HUB_DISPATCH_RETRIES",
    "HUB_ROUTING_STRATEGY",
    "HUB_LATENCY_SCALE_MS",
    "HUB_LATENCY_EMA_ALPHA",
];

#[derive(Default)]
struct EnvGuard {
    original: HashMap<String, Option<String>>,
}

impl EnvGuard {
    fn clean() -> Self {
        let mut guard = Self::default();
        for key in KEYS {
            guard.remove(key);
        }
        guard
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.original
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
        env::set_var(key, value.into());
    }

    fn remove(&mut self, key: &str) {
        self.original
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
        env::remove_var(key);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.original.drain() {
            match value {
                Some(v) => env::set_var(&key, v),
                None => env::remove_var(&key),
            }
        }
    }
}

#[test]
#[serial]
fn defaults_without_environment() {
    let _guard = EnvGuard::clean();

    let config = HubConfig::from_env().expect("defaults are valid");

    assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
    assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    assert_eq!(config.unhealthy_after, Duration::from_secs(20));
    assert_eq!(config.evict_after, Duration::from_secs(30));
    assert_eq!(config.scan_interval, Duration::from_secs(5));
    assert_eq!(config.dispatch_timeout, Duration::from_secs(5));
    assert_eq!(config.dispatch_retries, 1);
    assert_eq!(config.routing_strategy, RoutingStrategy::Weighted);
    assert_eq!(config.latency_ema_alpha, 0.3);
}

#[test]
#[serial]
fn thresholds_follow_heartbeat_interval() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_HEARTBEAT_INTERVAL_MS", "2000");

    let config = HubConfig::from_env().unwrap();

    assert_eq!(config.unhealthy_after, Duration::from_secs(4));
    assert_eq!(config.evict_after, Duration::from_secs(6));
    assert_eq!(config.scan_interval, Duration::from_secs(1));
}

#[test]
#[serial]
fn explicit_values_override_derived_ones() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_HEARTBEAT_INTERVAL_MS", "1000");
    guard.set("HUB_EVICT_AFTER_MS", "10000");
    guard.set("HUB_DISPATCH_RETRIES", "3");
    guard.set("HUB_ROUTING_STRATEGY", "Uniform");
    guard.set("HUB_BIND_ADDR", "127.0.0.1:9999");

    let config = HubConfig::from_env().unwrap();

    assert_eq!(config.unhealthy_after, Duration::from_secs(2));
    assert_eq!(config.evict_after, Duration::from_secs(10));
    assert_eq!(config.dispatch_retries, 3);
    assert_eq!(config.routing_strategy, RoutingStrategy::Uniform);
    assert_eq!(config.dispatch_config().max_retries, 3);
    assert_eq!(config.health_config().evict_after, Duration::from_secs(10));
}

#[test]
#[serial]
fn malformed_number_is_rejected() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_DISPATCH_TIMEOUT_MS", "soon");

    match HubConfig::from_env() {
        Err(ConfigError::Invalid { key, value, .. }) => {
            assert_eq!(key, "HUB_DISPATCH_TIMEOUT_MS");
            assert_eq!(value, "soon");
        }
        other => panic!("expected Invalid, got {:?}", other),
    }
}

#[test]
#[serial]
fn eviction_must_exceed_unhealthy_threshold() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_UNHEALTHY_AFTER_MS", "5000");
    guard.set("HUB_EVICT_AFTER_MS", "5000");

    assert!(matches!(
        HubConfig::from_env(),
        Err(ConfigError::Inconsistent(_))
    ));
}

#[test]
#[serial]
fn scan_must_run_faster_than_unhealthy_threshold() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_SCAN_INTERVAL_MS", "30000");

    match HubConfig::from_env() {
        Err(ConfigError::Inconsistent(message)) => {
            assert!(message.contains("scan interval"), "got: {}", message);
        }
        other => panic!("expected Inconsistent, got {:?}", other),
    }
}

#[test]
#[serial]
fn unknown_strategy_and_bad_alpha_rejected() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_ROUTING_STRATEGY", "round_robin");
    assert!(matches!(
        HubConfig::from_env(),
        Err(ConfigError::Invalid { ref key, .. }) if key == "HUB_ROUTING_STRATEGY"
    ));

    guard.set("HUB_ROUTING_STRATEGY", "weighted");
    guard.set("HUB_LATENCY_EMA_ALPHA", "1.5");
    assert!(matches!(
        HubConfig::from_env(),
        Err(ConfigError::Invalid { ref key, .. }) if key == "HUB_LATENCY_EMA_ALPHA"
    ));
}

#[test]
#[serial]
fn zero_interval_rejected() {
    let mut guard = EnvGuard::clean();
    guard.set("HUB_HEARTBEAT_INTERVAL_MS", "0");

    assert!(HubConfig::from_env().is_err());
}

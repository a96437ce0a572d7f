use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::{DispatchConfig, HealthConfig, RoutingStrategy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key} ({value}): {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime settings for the hub, read from `HUB_*` environment variables
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind_addr: SocketAddr,
    pub heartbeat_interval: Duration,
    pub unhealthy_after: Duration,
    pub evict_after: Duration,
    pub scan_interval: Duration,
    pub dispatch_timeout: Duration,
    pub dispatch_retries: u32,
    pub routing_strategy: RoutingStrategy,
    pub latency_scale_ms: f64,
    pub latency_ema_alpha: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_secs(10);
        let health = HealthConfig::from_heartbeat_interval(heartbeat_interval);
        let dispatch = DispatchConfig::default();

        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            heartbeat_interval,
            unhealthy_after: health.unhealthy_after,
            evict_after: health.evict_after,
            scan_interval: health.scan_interval,
            dispatch_timeout: dispatch.default_timeout,
            dispatch_retries: dispatch.max_retries,
            routing_strategy: RoutingStrategy::Weighted,
            latency_scale_ms: 100.0,
            latency_ema_alpha: dispatch.latency_ema_alpha,
        }
    }
}

impl HubConfig {
    /// Loads settings from the environment, falling back to defaults
    ///
    /// Thresholds that are not set explicitly are derived from
    /// `HUB_HEARTBEAT_INTERVAL_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let heartbeat_interval = env_millis("HUB_HEARTBEAT_INTERVAL_MS")?
            .unwrap_or(defaults.heartbeat_interval);
        let derived = HealthConfig::from_heartbeat_interval(heartbeat_interval);

        let config = Self {
            bind_addr: env_parse("HUB_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            heartbeat_interval,
            unhealthy_after: env_millis("HUB_UNHEALTHY_AFTER_MS")?
                .unwrap_or(derived.unhealthy_after),
            evict_after: env_millis("HUB_EVICT_AFTER_MS")?.unwrap_or(derived.evict_after),
            scan_interval: env_millis("HUB_SCAN_INTERVAL_MS")?.unwrap_or(derived.scan_interval),
            dispatch_timeout: env_millis("HUB_DISPATCH_TIMEOUT_MS")?
                .unwrap_or(defaults.dispatch_timeout),
            dispatch_retries: env_parse("HUB_DISPATCH_RETRIES")?
                .unwrap_or(defaults.dispatch_retries),
            routing_strategy: env_parse("HUB_ROUTING_STRATEGY")?
                .unwrap_or(defaults.routing_strategy),
            latency_scale_ms: env_parse("HUB_LATENCY_SCALE_MS")?
                .unwrap_or(defaults.latency_scale_ms),
            latency_ema_alpha: env_parse("HUB_LATENCY_EMA_ALPHA")?
                .unwrap_or(defaults.latency_ema_alpha),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("HUB_HEARTBEAT_INTERVAL_MS", self.heartbeat_interval),
            ("HUB_UNHEALTHY_AFTER_MS", self.unhealthy_after),
            ("HUB_EVICT_AFTER_MS", self.evict_after),
            ("HUB_SCAN_INTERVAL_MS", self.scan_interval),
            ("HUB_DISPATCH_TIMEOUT_MS", self.dispatch_timeout),
        ];
        for (key, value) in intervals {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.evict_after <= self.unhealthy_after {
            return Err(ConfigError::Inconsistent(format!(
                "eviction threshold ({}ms) must exceed unhealthy threshold ({}ms)",
                self.evict_after.as_millis(),
                self.unhealthy_after.as_millis()
            )));
        }

        // A scan period at or past the threshold lets silent instances stay healthy
        if self.scan_interval >= self.unhealthy_after {
            return Err(ConfigError::Inconsistent(format!(
                "scan interval ({}ms) must be shorter than unhealthy threshold ({}ms)",
                self.scan_interval.as_millis(),
                self.unhealthy_after.as_millis()
            )));
        }

        if !(self.latency_ema_alpha > 0.0 && self.latency_ema_alpha <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "HUB_LATENCY_EMA_ALPHA".to_string(),
                value: self.latency_ema_alpha.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }

        if !(self.latency_scale_ms.is_finite() && self.latency_scale_ms > 0.0) {
            return Err(ConfigError::Invalid {
                key: "HUB_LATENCY_SCALE_MS".to_string(),
                value: self.latency_scale_ms.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        Ok(())
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            scan_interval: self.scan_interval,
            unhealthy_after: self.unhealthy_after,
            evict_after: self.evict_after,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            default_timeout: self.dispatch_timeout,
            max_retries: self.dispatch_retries,
            latency_ema_alpha: self.latency_ema_alpha,
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}

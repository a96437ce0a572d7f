pub mod hub;

pub use hub::{ConfigError, HubConfig};

//! Configuration management for the registry bot

pub mod app;

pub use app::{validate_config, AmqpSettings, AppConfig, RegistrySettings, ServiceSettings};

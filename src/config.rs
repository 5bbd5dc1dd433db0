use std::env;
use std::str::FromStr;
use std::time::Duration;
use log::warn;
use uuid::Uuid;

use crate::data::SubscriberSettings;

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";

// Data Configuration
pub const DEFAULT_DATA_FILE: &str = "./chart_data.json";

// Subscriber Configuration
pub const DEFAULT_SUBSCRIBER_TIMEOUT_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_EVENT_QUEUE_TIMEOUT_SECS: f64 = 2.0;
pub const DEFAULT_LISTEN_POLL_TIMEOUT_SECS: f64 = 2.0;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 100;

pub struct Config {
    pub bind_address: String,
    pub data_file: String,
    pub log_level: String,
    pub admin_secret: String,
    pub subscriber_timeout_secs: u64,
    pub event_queue_timeout_secs: f64,
    pub listen_poll_timeout_secs: f64,
    pub cleanup_interval_secs: u64,
    pub event_queue_capacity: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default", raw, key);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            data_file: env::var("DATA_FILE")
                .unwrap_or_else(|_| DEFAULT_DATA_FILE.to_string()),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            admin_secret: env::var("ADMIN_SECRET")
                .unwrap_or_else(|_| Uuid::new_v4().simple().to_string()),
            subscriber_timeout_secs: env_or("SUBSCRIBER_TIMEOUT_SECS", DEFAULT_SUBSCRIBER_TIMEOUT_SECS),
            event_queue_timeout_secs: env_or("EVENT_QUEUE_TIMEOUT_SECS", DEFAULT_EVENT_QUEUE_TIMEOUT_SECS),
            listen_poll_timeout_secs: env_or("LISTEN_POLL_TIMEOUT_SECS", DEFAULT_LISTEN_POLL_TIMEOUT_SECS),
            cleanup_interval_secs: env_or("CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL_SECS),
            event_queue_capacity: env_or("EVENT_QUEUE_CAPACITY", DEFAULT_EVENT_QUEUE_CAPACITY),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.subscriber_timeout_secs == 0 {
            return Err("SUBSCRIBER_TIMEOUT_SECS must be greater than zero".to_string());
        }

        if self.cleanup_interval_secs == 0 {
            return Err("CLEANUP_INTERVAL_SECS must be greater than zero".to_string());
        }

        if !(self.event_queue_timeout_secs.is_finite() && self.event_queue_timeout_secs > 0.0) {
            return Err("EVENT_QUEUE_TIMEOUT_SECS must be a positive number".to_string());
        }

        if !(self.listen_poll_timeout_secs.is_finite() && self.listen_poll_timeout_secs > 0.0) {
            return Err("LISTEN_POLL_TIMEOUT_SECS must be a positive number".to_string());
        }

        if self.event_queue_capacity == 0 {
            return Err("EVENT_QUEUE_CAPACITY must be greater than zero".to_string());
        }

        if self.admin_secret.trim().is_empty() || self.admin_secret.contains('/') {
            return Err("ADMIN_SECRET must be a non-empty path segment".to_string());
        }

        if !std::path::Path::new(&self.data_file).exists() {
            return Err(format!("Data file not found: {}", self.data_file));
        }

        Ok(())
    }

    pub fn subscriber_settings(&self) -> SubscriberSettings {
        SubscriberSettings {
            queue_capacity: self.event_queue_capacity,
            queue_timeout: Duration::from_secs_f64(self.event_queue_timeout_secs),
            poll_timeout: Duration::from_secs_f64(self.listen_poll_timeout_secs),
        }
    }

    pub fn subscriber_timeout(&self) -> Duration {
        Duration::from_secs(self.subscriber_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  Bind Address: {}", self.bind_address);
        println!("  Data File: {}", self.data_file);
        println!("  Log Level: {}", self.log_level);
        println!("  Subscriber Timeout: {}s", self.subscriber_timeout_secs);
        println!("  Event Queue: {} slots, {}s put timeout", self.event_queue_capacity, self.event_queue_timeout_secs);
        println!("  Listen Poll Timeout: {}s", self.listen_poll_timeout_secs);
        println!("  Cleanup Interval: {}s", self.cleanup_interval_secs);
        println!("  Admin Secret: {}***", self.admin_secret.chars().take(4).collect::<String>());
    }
}

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Configuration for the observer agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Seconds between sampling cycles.
    pub interval_secs: u64,

    /// Mount point whose usage is reported as disk pressure.
    pub disk_mount: PathBuf,

    pub thresholds: Thresholds,

    /// Services whose reachability is checked every cycle.
    pub services: Vec<ServiceTarget>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            disk_mount: PathBuf::from("/"),
            thresholds: Thresholds::default(),
            services: Vec::new(),
        }
    }
}

/// Levels at or above which a reading is classified as pressure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
    /// One-minute load average divided by the number of cores.
    pub load_per_core: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 85.0,
            memory_percent: 90.0,
            disk_percent: 90.0,
            load_per_core: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub name: String,
    /// `host:port` to connect to.
    pub addr: String,
    #[serde(default = "default_slow_after_ms")]
    pub slow_after_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_slow_after_ms() -> u64 {
    1_500
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl ObserverConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("observer interval_secs must be greater than 0".to_string());
        }
        for (name, value) in [
            ("cpu_percent", self.thresholds.cpu_percent),
            ("memory_percent", self.thresholds.memory_percent),
            ("disk_percent", self.thresholds.disk_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("threshold {name} must be between 0 and 100"));
            }
        }
        if self.thresholds.load_per_core <= 0.0 {
            return Err("threshold load_per_core must be greater than 0".to_string());
        }
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err("observer service name cannot be empty".to_string());
            }
            if service.addr.trim().is_empty() {
                return Err(format!("observer service '{}' is missing addr", service.name));
            }
            if service.timeout_ms == 0 {
                return Err(format!(
                    "observer service '{}' timeout_ms must be greater than 0",
                    service.name
                ));
            }
        }
        Ok(())
    }
}

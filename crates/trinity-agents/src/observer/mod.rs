//! Observer agent: samples host health on an interval and records one
//! qualitative insight per cycle.

mod classify;
mod config;
mod probe;
mod sampler;
mod service;

pub use classify::{classify, Condition, Insight, ServiceReading, Snapshot, HEALTHY_CATEGORY};
pub use config::{ObserverConfig, ServiceTarget, Thresholds, DEFAULT_INTERVAL_SECS};
pub use probe::{MetricsProbe, ProbeError, SysinfoProbe};
pub use sampler::ObserverSampler;
pub use service::{ServiceCheck, ServiceStatus, TcpServiceCheck};

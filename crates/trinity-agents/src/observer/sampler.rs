use std::future::Future;

use tokio::time::MissedTickBehavior;
use trinity_memory::{MemoryEntry, MemoryStore};

use super::classify::{classify, ServiceReading, Snapshot};
use super::config::ObserverConfig;
use super::probe::{MetricsProbe, ProbeError};
use super::service::{ServiceCheck, TcpServiceCheck};

/// Periodic health sampler. Writes one observer insight per cycle.
pub struct ObserverSampler<P> {
    config: ObserverConfig,
    probe: P,
    services: Vec<Box<dyn ServiceCheck>>,
}

impl<P: MetricsProbe> ObserverSampler<P> {
    /// Sampler with a TCP check for every configured service.
    pub fn new(config: ObserverConfig, probe: P) -> Self {
        let services = config
            .services
            .iter()
            .map(|target| Box::new(TcpServiceCheck::from_target(target)) as Box<dyn ServiceCheck>)
            .collect();
        Self {
            config,
            probe,
            services,
        }
    }

    pub fn with_services(mut self, services: Vec<Box<dyn ServiceCheck>>) -> Self {
        self.services = services;
        self
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Read every metric and check every service once.
    pub async fn sample(&mut self) -> Snapshot {
        let cpu_percent = reading(self.probe.cpu_percent());
        let memory_percent = reading(self.probe.memory_percent());
        let disk_percent = reading(self.probe.disk_percent(&self.config.disk_mount));
        let load_per_core = reading(self.probe.load_per_core());

        let mut services = Vec::with_capacity(self.services.len());
        for check in &self.services {
            let status = check.check().await;
            tracing::debug!(service = check.name(), ?status, "service checked");
            services.push(ServiceReading {
                name: check.name().to_string(),
                status,
            });
        }

        Snapshot {
            cpu_percent,
            memory_percent,
            disk_percent,
            load_per_core,
            services,
        }
    }

    /// One sampling cycle. Returns the stored insight, or `None` when the
    /// cycle had nothing to record or the append failed.
    pub async fn run_cycle(&mut self, store: &MemoryStore) -> Option<MemoryEntry> {
        let snapshot = self.sample().await;
        if snapshot.is_empty() {
            tracing::warn!("no readings this cycle, skipping insight");
            return None;
        }

        let insight = classify(&snapshot, &self.config.thresholds);
        match store.append(insight.to_entry(store.max_text_chars())) {
            Ok(stored) => {
                tracing::info!(
                    seq = stored.seq,
                    category = %stored.category,
                    conditions = insight.conditions.len(),
                    "recorded observer insight"
                );
                Some(stored)
            }
            Err(error) => {
                tracing::warn!(%error, category = %insight.category, "skipping observer insight");
                None
            }
        }
    }

    /// Run a cycle every interval until `shutdown` resolves. The first cycle
    /// runs immediately. Returns the number of insights recorded.
    pub async fn run<F>(&mut self, store: &MemoryStore, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.config.interval_secs,
            services = self.services.len(),
            "observer started"
        );
        let mut recorded = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if self.run_cycle(store).await.is_some() {
                        recorded += 1;
                    }
                }
            }
        }
        tracing::info!(recorded, "observer stopped");
        recorded
    }
}

fn reading<T>(result: Result<T, ProbeError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(metric = error.metric, reason = %error.reason, "metric read failed");
            None
        }
    }
}

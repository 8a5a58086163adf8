use std::path::Path;

use sysinfo::{Disks, System};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{metric} unavailable: {reason}")]
pub struct ProbeError {
    pub metric: &'static str,
    pub reason: String,
}

impl ProbeError {
    pub fn new(metric: &'static str, reason: impl Into<String>) -> Self {
        Self {
            metric,
            reason: reason.into(),
        }
    }
}

/// Source of host readings. Every metric can fail on its own.
pub trait MetricsProbe: Send {
    fn cpu_percent(&mut self) -> Result<f32, ProbeError>;
    fn memory_percent(&mut self) -> Result<f32, ProbeError>;
    fn disk_percent(&mut self, mount: &Path) -> Result<f32, ProbeError>;
    fn load_per_core(&mut self) -> Result<f64, ProbeError>;
}

/// Host readings backed by `sysinfo`.
pub struct SysinfoProbe {
    system: System,
    disks: Disks,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is measured between two refreshes.
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
        }
    }

    /// Probe whose first CPU reading is already meaningful.
    pub async fn primed() -> Self {
        let probe = Self::new();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        probe
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProbe for SysinfoProbe {
    fn cpu_percent(&mut self) -> Result<f32, ProbeError> {
        self.system.refresh_cpu();
        if self.system.cpus().is_empty() {
            return Err(ProbeError::new("cpu", "no cpu information reported"));
        }
        Ok(self.system.global_cpu_info().cpu_usage())
    }

    fn memory_percent(&mut self) -> Result<f32, ProbeError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::new("memory", "total memory reported as 0"));
        }
        Ok(self.system.used_memory() as f32 / total as f32 * 100.0)
    }

    fn disk_percent(&mut self, mount: &Path) -> Result<f32, ProbeError> {
        self.disks.refresh_list();
        let disk = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == mount)
            .ok_or_else(|| ProbeError::new("disk", format!("no disk mounted at {}", mount.display())))?;
        let total = disk.total_space();
        if total == 0 {
            return Err(ProbeError::new(
                "disk",
                format!("{} reports zero capacity", mount.display()),
            ));
        }
        let used = total.saturating_sub(disk.available_space());
        Ok(used as f32 / total as f32 * 100.0)
    }

    fn load_per_core(&mut self) -> Result<f64, ProbeError> {
        let cores = self.system.cpus().len();
        if cores == 0 {
            return Err(ProbeError::new("load", "no cpu information reported"));
        }
        Ok(System::load_average().one / cores as f64)
    }
}

use trinity_memory::NewEntry;

use super::config::Thresholds;
use super::service::ServiceStatus;
use crate::text::truncate_chars;

/// Readings collected in one sampling cycle. A metric that could not be
/// read is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub cpu_percent: Option<f32>,
    pub memory_percent: Option<f32>,
    pub disk_percent: Option<f32>,
    pub load_per_core: Option<f64>,
    pub services: Vec<ServiceReading>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReading {
    pub name: String,
    pub status: ServiceStatus,
}

impl Snapshot {
    /// True when no metric and no service produced a reading.
    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_none()
            && self.memory_percent.is_none()
            && self.disk_percent.is_none()
            && self.load_per_core.is_none()
            && self.services.is_empty()
    }

    fn readings(&self) -> String {
        let mut parts = Vec::new();
        if let Some(cpu) = self.cpu_percent {
            parts.push(format!("cpu {cpu:.1}%"));
        }
        if let Some(memory) = self.memory_percent {
            parts.push(format!("mem {memory:.1}%"));
        }
        if let Some(disk) = self.disk_percent {
            parts.push(format!("disk {disk:.1}%"));
        }
        if let Some(load) = self.load_per_core {
            parts.push(format!("load {load:.2}"));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    ServiceDown { name: String, reason: String },
    ServiceSlow { name: String, latency_ms: u128 },
    SystemUnderLoad,
    MemoryPressure,
    DiskPressure,
}

impl Condition {
    pub fn category(&self) -> &'static str {
        match self {
            Self::ServiceDown { .. } => "service",
            Self::ServiceSlow { .. } => "model",
            Self::SystemUnderLoad => "load",
            Self::MemoryPressure => "memory",
            Self::DiskPressure => "disk",
        }
    }

    pub fn headline(&self) -> String {
        match self {
            Self::ServiceDown { name, reason } => format!("service down: {name} ({reason})"),
            Self::ServiceSlow { name, latency_ms } => format!("model slow: {name} ({latency_ms} ms)"),
            Self::SystemUnderLoad => "system under load".to_string(),
            Self::MemoryPressure => "memory pressure".to_string(),
            Self::DiskPressure => "disk pressure".to_string(),
        }
    }
}

pub const HEALTHY_CATEGORY: &str = "health";

/// Qualitative summary of one snapshot, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    pub category: String,
    pub text: String,
    pub conditions: Vec<Condition>,
}

impl Insight {
    /// Observer entry for this insight, with text cut to `max_text_chars`.
    pub fn to_entry(&self, max_text_chars: usize) -> NewEntry {
        NewEntry::observer(
            self.category.clone(),
            truncate_chars(&self.text, max_text_chars),
        )
    }
}

/// Apply the threshold rules to `snapshot`.
///
/// Conditions come out in priority order. The first one names the category.
pub fn classify(snapshot: &Snapshot, thresholds: &Thresholds) -> Insight {
    let mut conditions = Vec::new();

    for reading in &snapshot.services {
        if let ServiceStatus::Down { reason } = &reading.status {
            conditions.push(Condition::ServiceDown {
                name: reading.name.clone(),
                reason: reason.clone(),
            });
        }
    }
    for reading in &snapshot.services {
        if let ServiceStatus::Slow { latency } = &reading.status {
            conditions.push(Condition::ServiceSlow {
                name: reading.name.clone(),
                latency_ms: latency.as_millis(),
            });
        }
    }

    let cpu_hot = snapshot
        .cpu_percent
        .is_some_and(|cpu| cpu >= thresholds.cpu_percent);
    let load_hot = snapshot
        .load_per_core
        .is_some_and(|load| load >= thresholds.load_per_core);
    if cpu_hot || load_hot {
        conditions.push(Condition::SystemUnderLoad);
    }
    if snapshot
        .memory_percent
        .is_some_and(|memory| memory >= thresholds.memory_percent)
    {
        conditions.push(Condition::MemoryPressure);
    }
    if snapshot
        .disk_percent
        .is_some_and(|disk| disk >= thresholds.disk_percent)
    {
        conditions.push(Condition::DiskPressure);
    }

    let category = conditions
        .first()
        .map(Condition::category)
        .unwrap_or(HEALTHY_CATEGORY)
        .to_string();
    let headline = if conditions.is_empty() {
        "system healthy".to_string()
    } else {
        conditions
            .iter()
            .map(Condition::headline)
            .collect::<Vec<_>>()
            .join("; ")
    };
    let readings = snapshot.readings();
    let text = if readings.is_empty() {
        headline
    } else {
        format!("{headline} | {readings}")
    };

    Insight {
        category,
        text,
        conditions,
    }
}

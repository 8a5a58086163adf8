use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use trinity_memory::{EntryFilter, MemoryStore};

use crate::settings::{config_path, load_settings};
use crate::trinity_home::resolve_trinity_home_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Warn => write!(f, "WARN"),
            CheckStatus::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Clone, Default)]
struct DoctorReport {
    checks: Vec<CheckResult>,
}

impl DoctorReport {
    fn push(&mut self, name: &'static str, status: CheckStatus, detail: impl Into<String>) {
        self.checks.push(CheckResult {
            name,
            status,
            detail: detail.into(),
        });
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status == status)
            .count()
    }
}

pub fn run_doctor(conf_dir: Option<PathBuf>) -> Result<(), String> {
    let conf_dir = resolve_trinity_home_dir(conf_dir.as_deref());
    let report = collect_doctor_report(&conf_dir);

    println!("trinity doctor report");
    println!("conf_dir: {}", conf_dir.display());
    for check in &report.checks {
        println!("[{}] {:<16} {}", check.status, check.name, check.detail);
    }

    let fails = report.count(CheckStatus::Fail);
    let warns = report.count(CheckStatus::Warn);
    println!(
        "summary: {} checks, {} fail, {} warn",
        report.checks.len(),
        fails,
        warns
    );

    if fails > 0 {
        Err(format!("doctor found {fails} failing checks"))
    } else {
        Ok(())
    }
}

fn collect_doctor_report(conf_dir: &Path) -> DoctorReport {
    let mut report = DoctorReport::default();

    match ensure_dir_writable(conf_dir) {
        Ok(()) => report.push("conf dir", CheckStatus::Pass, "readable and writable"),
        Err(error) => report.push("conf dir", CheckStatus::Fail, error),
    }

    let config_path = config_path(conf_dir);
    if config_path.exists() {
        report.push(
            "config file",
            CheckStatus::Pass,
            format!("found {}", config_path.display()),
        );
    } else {
        report.push(
            "config file",
            CheckStatus::Warn,
            format!(
                "missing {} (run `trinity config init` to create it)",
                config_path.display()
            ),
        );
    }

    let settings = match load_settings(conf_dir) {
        Ok(settings) => {
            report.push(
                "settings",
                CheckStatus::Pass,
                format!(
                    "interval={}s services={}",
                    settings.observer.interval_secs,
                    settings.observer.services.len()
                ),
            );
            settings
        }
        Err(error) => {
            report.push("settings", CheckStatus::Fail, error);
            return report;
        }
    };

    if let Some(log_dir) = settings.log.file_path.parent() {
        match ensure_dir_writable(log_dir) {
            Ok(()) => report.push("log dir", CheckStatus::Pass, log_dir.display().to_string()),
            Err(error) => report.push("log dir", CheckStatus::Fail, error),
        }
    }

    if let Some(memory_dir) = settings.memory.path.parent() {
        match ensure_dir_writable(memory_dir) {
            Ok(()) => report.push(
                "memory dir",
                CheckStatus::Pass,
                memory_dir.display().to_string(),
            ),
            Err(error) => report.push("memory dir", CheckStatus::Fail, error),
        }
    }

    match check_memory_file(&settings.memory) {
        Ok((entries, 0)) => report.push(
            "memory file",
            CheckStatus::Pass,
            format!("{} ({entries} entries)", settings.memory.path.display()),
        ),
        Ok((entries, corrupt)) => report.push(
            "memory file",
            CheckStatus::Fail,
            format!(
                "{} has {corrupt} corrupt line(s) and {entries} readable entries",
                settings.memory.path.display()
            ),
        ),
        Err(error) => report.push("memory file", CheckStatus::Fail, error),
    }

    report
}

/// Open the store and count readable and corrupt records.
fn check_memory_file(config: &trinity_memory::MemoryConfig) -> Result<(usize, usize), String> {
    let store = MemoryStore::open(config.clone()).map_err(|error| error.to_string())?;
    let mut entries = 0;
    let mut corrupt = 0;
    for item in store
        .read_all(EntryFilter::all())
        .iter()
        .map_err(|error| error.to_string())?
    {
        match item {
            Ok(_) => entries += 1,
            Err(_) => corrupt += 1,
        }
    }
    Ok((entries, corrupt))
}

fn ensure_dir_writable(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|error| format!("create {} failed: {error}", path.display()))?;

    let probe = path.join(".trinity-doctor-probe");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&probe)
        .map_err(|error| format!("write test in {} failed: {error}", path.display()))?;
    file.write_all(b"ok")
        .map_err(|error| format!("write test in {} failed: {error}", path.display()))?;
    fs::remove_file(&probe)
        .map_err(|error| format!("cleanup test in {} failed: {error}", path.display()))?;
    Ok(())
}

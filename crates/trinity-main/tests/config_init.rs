use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::tempdir;

const TRINITY_TOML_SAMPLE: &str = include_str!("../../../trinity.toml.sample");

#[test]
fn config_init_creates_trinity_home_tree_and_trinity_toml_from_sample() {
    let conf_dir = tempdir().expect("create temp conf dir");

    let output = run_trinity_config_init(conf_dir.path());
    assert_command_succeeded(&output);

    let trinity_toml = conf_dir.path().join("trinity.toml");
    assert!(trinity_toml.is_file(), "expected {}", trinity_toml.display());

    for dir in [conf_dir.path().join("logs"), conf_dir.path().join("memory")] {
        assert!(dir.is_dir(), "expected {}", dir.display());
    }

    let generated = fs::read_to_string(&trinity_toml).expect("read generated trinity.toml");
    assert_eq!(
        generated, TRINITY_TOML_SAMPLE,
        "generated config should match sample"
    );
}

#[test]
fn config_init_keeps_existing_trinity_toml() {
    let conf_dir = tempdir().expect("create temp conf dir");
    let config_path = conf_dir.path().join("trinity.toml");
    let original = "[observer]\ninterval_secs = 15\n";
    fs::write(&config_path, original).expect("seed trinity.toml");

    let output = run_trinity_config_init(conf_dir.path());
    assert_command_succeeded(&output);

    let preserved = fs::read_to_string(&config_path).expect("read preserved trinity.toml");
    assert_eq!(
        preserved, original,
        "existing trinity.toml must not be overwritten"
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("kept: "));
}

fn run_trinity_config_init(conf_dir: &Path) -> Output {
    Command::new(trinity_binary_path())
        .arg("--conf-dir")
        .arg(conf_dir)
        .arg("config")
        .arg("init")
        .output()
        .expect("execute trinity binary")
}

fn trinity_binary_path() -> PathBuf {
    for key in ["CARGO_BIN_EXE_trinity", "NEXTEST_BIN_EXE_trinity"] {
        if let Some(path) = std::env::var_os(key) {
            return PathBuf::from(path);
        }
    }

    let fallback = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/debug/trinity");
    if fallback.is_file() {
        return fallback;
    }

    panic!(
        "unable to resolve trinity binary path from env (CARGO_BIN_EXE_trinity / NEXTEST_BIN_EXE_trinity) \
or fallback {}",
        fallback.display()
    );
}

fn assert_command_succeeded(output: &Output) {
    if output.status.success() {
        return;
    }
    panic!(
        "trinity exited with status {}\nstdout:\n{}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

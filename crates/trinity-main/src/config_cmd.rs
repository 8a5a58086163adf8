use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::{config_path, CONFIG_FILE_NAME};
use crate::trinity_home::resolve_trinity_home_dir;

const TRINITY_TOML_SAMPLE: &str = include_str!("../../../trinity.toml.sample");

pub fn run_config_init(conf_dir: Option<PathBuf>) -> Result<(), String> {
    let trinity_home_dir = resolve_trinity_home_dir(conf_dir.as_deref());

    for path in init_directories(&trinity_home_dir) {
        fs::create_dir_all(&path)
            .map_err(|error| format!("create {} failed: {error}", path.display()))?;
        println!("created: {}", path.display());
    }

    let config_path = config_path(&trinity_home_dir);
    if config_path.exists() {
        println!("kept: {}", config_path.display());
    } else {
        fs::write(&config_path, TRINITY_TOML_SAMPLE)
            .map_err(|error| format!("write {CONFIG_FILE_NAME} failed: {error}"))?;
        println!("created: {}", config_path.display());
    }

    Ok(())
}

fn init_directories(trinity_home_dir: &Path) -> Vec<PathBuf> {
    vec![
        trinity_home_dir.to_path_buf(),
        trinity_home_dir.join("logs"),
        trinity_home_dir.join("memory"),
    ]
}

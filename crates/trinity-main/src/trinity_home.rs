use std::ffi::OsString;
use std::path::{Path, PathBuf};

const DEFAULT_TRINITY_HOME_DIR_NAME: &str = ".trinity";
const TRINITY_HOME_ENV: &str = "TRINITY_HOME";

/// `--conf-dir`, then `$TRINITY_HOME`, then `~/.trinity`.
pub fn resolve_trinity_home_dir(conf_dir: Option<&Path>) -> PathBuf {
    resolve_home_with_env(conf_dir, std::env::var_os(TRINITY_HOME_ENV))
}

fn resolve_home_with_env(conf_dir: Option<&Path>, env_home: Option<OsString>) -> PathBuf {
    if let Some(conf_dir) = conf_dir {
        return resolve_trinity_home_arg(conf_dir);
    }
    env_home
        .filter(|value| !value.is_empty())
        .map(|value| resolve_trinity_home_arg(Path::new(&value)))
        .unwrap_or_else(default_trinity_home_dir)
}

fn resolve_trinity_home_arg(path: &Path) -> PathBuf {
    let expanded = expand_path_with_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_path_with_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" {
        return home_dir();
    }
    if let Some(suffix) = raw.strip_prefix("~/") {
        return home_dir().join(suffix);
    }
    path.to_path_buf()
}

fn default_trinity_home_dir() -> PathBuf {
    home_dir().join(DEFAULT_TRINITY_HOME_DIR_NAME)
}

fn home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home);
    }
    if let Some(profile) = std::env::var_os("USERPROFILE") {
        return PathBuf::from(profile);
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_override_is_used_directly() {
        let path = resolve_trinity_home_dir(Some(Path::new("/tmp/trinity-home")));
        assert_eq!(path, PathBuf::from("/tmp/trinity-home"));
    }

    #[test]
    fn relative_override_resolves_against_cwd() {
        let path = resolve_trinity_home_dir(Some(Path::new("conf")));
        assert!(path.is_absolute() || path.starts_with("."));
        assert!(path.ends_with("conf"));
    }

    #[test]
    fn conf_dir_flag_wins_over_env() {
        let path = resolve_home_with_env(
            Some(Path::new("/tmp/from-flag")),
            Some(OsString::from("/tmp/from-env")),
        );
        assert_eq!(path, PathBuf::from("/tmp/from-flag"));
    }

    #[test]
    fn env_home_is_used_without_flag() {
        let path = resolve_home_with_env(None, Some(OsString::from("/srv/trinity")));
        assert_eq!(path, PathBuf::from("/srv/trinity"));
    }

    #[test]
    fn empty_env_home_falls_back_to_default() {
        let path = resolve_home_with_env(None, Some(OsString::new()));
        assert!(path.ends_with(".trinity"));
    }

    #[test]
    fn default_home_ends_with_dot_trinity() {
        let path = resolve_home_with_env(None, None);
        assert!(
            path.ends_with(".trinity"),
            "expected default trinity home directory to end with .trinity, got {}",
            path.display()
        );
    }

    #[test]
    fn tilde_prefix_expands_to_home() {
        let expanded = expand_path_with_home(Path::new("~/notes"));
        assert!(expanded.ends_with("notes"));
        assert!(!expanded.starts_with("~"));
    }
}

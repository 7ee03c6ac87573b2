// src/infra/paths.rs — Path management
//
// All paths respect the SWITCHBOARD_HOME environment variable for isolation.
// When SWITCHBOARD_HOME is set, config and plugins live under that directory.
// When unset, config uses ~/.switchboard/ and plugins use XDG_DATA_HOME/switchboard.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the SWITCHBOARD_HOME override, if set.
fn switchboard_home() -> Option<PathBuf> {
    std::env::var_os("SWITCHBOARD_HOME").map(PathBuf::from)
}

/// Home directory, falling back to the working directory on exotic platforms.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $SWITCHBOARD_HOME/ or ~/.switchboard/
pub fn config_dir() -> PathBuf {
    if let Some(home) = switchboard_home() {
        return home;
    }
    dirs_home().join(".switchboard")
}

/// Data directory: $SWITCHBOARD_HOME/data/ or ~/.local/share/switchboard/
pub fn data_dir() -> PathBuf {
    if let Some(home) = switchboard_home() {
        return home.join("data");
    }
    match ProjectDirs::from("", "", "switchboard") {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Default plugin directory
pub fn plugins_dir() -> PathBuf {
    data_dir().join("plugins")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs_home().join(rest)
    } else if path == "~" {
        dirs_home()
    } else {
        PathBuf::from(path)
    }
}

/// Ensure all required directories exist
pub async fn ensure_dirs(plugins_dir: &std::path::Path) -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), plugins_dir.to_path_buf()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}

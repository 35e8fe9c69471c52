//! `[env]` table of `$XDG_CONFIG_HOME/<app>/config.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::LoadError;

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Resolves the config file path: an explicit `XDG_CONFIG_HOME` wins,
/// otherwise the platform config directory. `None` when the file (or any
/// config directory at all) does not exist.
fn config_file(app_name: &str) -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    let path = base.join(app_name).join("config.toml");
    path.is_file().then_some(path)
}

/// Reads the `[env]` table into a plain map. A missing file, a missing
/// `[env]` section and an empty section all yield no entries; a file that
/// exists but does not parse is an error.
pub(crate) fn env_table(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let Some(path) = config_file(app_name) else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let parsed: ConfigFile =
        toml::from_str(&content).map_err(|source| LoadError::Toml { path, source })?;
    Ok(parsed.env)
}

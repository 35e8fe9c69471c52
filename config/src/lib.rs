//! Configuration loading for the harness.
//!
//! Two optional sources feed the process environment: a project-local `.env`
//! file and the `[env]` table of `$XDG_CONFIG_HOME/<app>/config.toml`.
//! Neither ever overrides a variable the operator already exported, so the
//! effective precedence is process env, then `.env`, then the TOML table.
//!
//! The typed view of the applied environment lives in [`Settings`].

mod dotenv;
mod settings;
mod xdg_toml;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use settings::Settings;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Reads both sources, overlays them (`.env` entries shadow the TOML table),
/// and exports every key that is absent from the process environment.
///
/// * `app_name`: names the XDG config directory, `~/.config/<app_name>/config.toml`.
/// * `override_dir`: where to look for `.env`; defaults to the current directory.
///
/// Missing files are not errors; unreadable or unparseable ones are.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let merged: HashMap<String, String> = xdg_toml::env_table(app_name)?
        .into_iter()
        .chain(dotenv::env_table(override_dir)?)
        .collect();
    for (key, value) in merged {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}

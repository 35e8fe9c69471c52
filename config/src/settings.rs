//! Typed view of the environment keys the harness reads.
//!
//! Call [`crate::load_and_apply`] first so `.env` / XDG values are visible,
//! then build [`Settings::from_env`].

use std::path::PathBuf;

/// Resolved runtime settings for the API process.
#[derive(Clone, Debug)]
pub struct Settings {
    /// SQLite database file. `GAUNTLET_DB`, default `var/data.sqlite`.
    pub db_path: PathBuf,
    /// HTTP bind address. `GAUNTLET_ADDR`, default `127.0.0.1:8080`.
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let db_path = std::env::var("GAUNTLET_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("var/data.sqlite"));
        let bind_addr =
            std::env::var("GAUNTLET_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        Self { db_path, bind_addr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        std::env::remove_var("GAUNTLET_DB");
        std::env::remove_var("GAUNTLET_ADDR");
        let s = Settings::from_env();
        assert_eq!(s.db_path, PathBuf::from("var/data.sqlite"));
        assert_eq!(s.bind_addr, "127.0.0.1:8080");
    }
}

//! Persistent configuration for the console client.
//!
//! Config file lives at `~/.config/voxlink/cli.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default voice server port.
pub const DEFAULT_PORT: u16 = 9987;
/// Default nickname.
pub const DEFAULT_NICK: &str = "guest";

/// User configuration (persisted in cli.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server host name or address.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Nickname.
    pub nick: Option<String>,
    /// Channel id to auto-join after connecting.
    pub channel: Option<u64>,
    /// Explicit native module file name (skips candidate probing).
    pub library: Option<String>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxlink")
        .join("cli.toml")
}

impl Config {
    pub fn load() -> Self {
        let path = config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => eprintln!("Warning: bad config file {}: {e}", path.display()),
                },
                Err(e) => eprintln!("Warning: can't read {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        let path = config_path();
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(self) {
            Ok(s) => {
                if let Err(e) = std::fs::write(&path, s) {
                    eprintln!("Warning: can't save config: {e}");
                }
            }
            Err(e) => eprintln!("Warning: can't serialize config: {e}"),
        }
    }
}

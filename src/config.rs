use anyhow::{Context, Result};
use gridtown_core::ConflictMode;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/gridtown.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    /// Display name announced to the room.
    pub username: String,
    /// Room code to join or host.
    pub room_code: String,
    /// Relay address to dial.
    pub relay: String,
    /// Skip certificate verification (local development rooms).
    pub insecure: bool,
    /// Conflict-resolution mode for simultaneous actions.
    pub mode: ConflictMode,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            username: "player".to_string(),
            room_code: "LOCAL".to_string(),
            relay: "127.0.0.1:4433".to_string(),
            insecure: false,
            mode: ConflictMode::TurnBased,
        }
    }
}

impl GameConfig {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<GameConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    GameConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                GameConfig::default()
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(dir) = Path::new(DEFAULT_CONFIG_PATH).parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        fs::write(DEFAULT_CONFIG_PATH, contents).context("Failed to write config")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = GameConfig::load_from_path(Path::new("/nonexistent/gridtown.toml"));
        assert_eq!(cfg.username, "player");
        assert_eq!(cfg.mode, ConflictMode::TurnBased);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: GameConfig = toml::from_str("username = \"mayor\"").unwrap();
        assert_eq!(cfg.username, "mayor");
        assert_eq!(cfg.room_code, "LOCAL");
    }

    #[test]
    fn mode_round_trips_through_toml() {
        let mut cfg = GameConfig::default();
        cfg.mode = ConflictMode::RealTime;
        let text = toml::to_string(&cfg).unwrap();
        let back: GameConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.mode, ConflictMode::RealTime);
    }
}

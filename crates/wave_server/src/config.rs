//! Server settings, loaded from RON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use wave_core::config::MatchConfig;
use wave_core::entity::PlayerClass;
use wave_core::tuning::MAX_NUM_PLAYERS;
use wave_core::world::WorldDescription;

use crate::error::{Result, ServerError};

/// Where to listen and what to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the relay binds to.
    pub bind_address: String,
    /// Participants including the host player.
    pub max_players: u32,
    /// World description file; an open field is used when absent.
    pub world_path: Option<PathBuf>,
    /// Match configuration file; a solo knight match is used when absent.
    pub match_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7777".to_owned(),
            max_players: MAX_NUM_PLAYERS,
            world_path: None,
            match_path: None,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a RON document.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_players == 0 || self.max_players > MAX_NUM_PLAYERS {
            return Err(ServerError::InvalidSetting(format!(
                "max_players must be within 1..={MAX_NUM_PLAYERS}, got {}",
                self.max_players
            )));
        }
        Ok(())
    }

    /// The world to host.
    pub fn load_world(&self) -> Result<WorldDescription> {
        match &self.world_path {
            Some(path) => Ok(WorldDescription::load(path)?),
            None => Ok(WorldDescription::open_field(40, 30)),
        }
    }

    /// The match to host, checked against `max_players`.
    pub fn load_match(&self) -> Result<MatchConfig> {
        let config = match &self.match_path {
            Some(path) => MatchConfig::load(path)?,
            None => MatchConfig::solo(0, PlayerClass::Knight),
        };
        if config.participants.len() > self.max_players as usize {
            return Err(ServerError::InvalidSetting(format!(
                "match has {} participants but the server allows {}",
                config.participants.len(),
                self.max_players
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.load_match().unwrap().participants.len(), 1);
        assert_eq!(config.load_world().unwrap().width, 40);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = ServerConfig::from_ron_str("(bind_address: \"127.0.0.1:9000\")").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.max_players, MAX_NUM_PLAYERS);
    }

    #[test]
    fn test_rejects_bad_player_count() {
        assert!(matches!(
            ServerConfig::from_ron_str("(max_players: 0)"),
            Err(ServerError::InvalidSetting(_))
        ));
        assert!(matches!(
            ServerConfig::from_ron_str("(max_players: 9)"),
            Err(ServerError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_ron() {
        assert!(matches!(ServerConfig::from_ron_str("(max_players: "), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_missing_match_file_is_io_error() {
        let config = ServerConfig {
            match_path: Some(PathBuf::from("/nonexistent/match.ron")),
            ..ServerConfig::default()
        };
        assert!(config.load_match().is_err());
    }
}

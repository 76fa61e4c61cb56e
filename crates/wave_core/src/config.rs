//! Match configuration.
//!
//! A [`MatchConfig`] fixes everything a participant needs, besides the world
//! description, to build the same initial state as everybody else: the seed
//! and the roster in join order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::PlayerClass;
use crate::error::{GameError, Result};
use crate::tuning::MAX_NUM_PLAYERS;

/// One seat in the match. Seat order is player ID order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Display name.
    pub name: String,
    /// Chosen class.
    pub class: PlayerClass,
}

impl Participant {
    /// Shorthand constructor.
    pub fn new(name: impl Into<String>, class: PlayerClass) -> Self {
        Self {
            name: name.into(),
            class,
        }
    }
}

/// Seed and roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Seed of the match random stream.
    pub seed: u32,
    /// Participants in join order; the host is first.
    pub participants: Vec<Participant>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            participants: vec![Participant::new("host", PlayerClass::Knight)],
        }
    }
}

impl MatchConfig {
    /// A single-player match.
    pub fn solo(seed: u32, class: PlayerClass) -> Self {
        Self {
            seed,
            participants: vec![Participant::new("solo", class)],
        }
    }

    /// Load from a RON string. `source` names the origin in error messages.
    pub fn from_ron_str(ron: &str, source: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron).map_err(|e| GameError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a match configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron_str(&contents, &path.display().to_string())
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Config(format!("failed to serialize match config: {e}")))
    }

    /// Check the roster size.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Config`] for an empty roster or more than
    /// [`MAX_NUM_PLAYERS`] participants.
    pub fn validate(&self) -> Result<()> {
        let count = self.participants.len();
        if count == 0 || count > MAX_NUM_PLAYERS as usize {
            return Err(GameError::Config(format!(
                "match needs 1..={MAX_NUM_PLAYERS} participants, got {count}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ron() {
        let config = MatchConfig::from_ron_str(
            r#"(
                seed: 42,
                participants: [
                    (name: "ann", class: Mage),
                    (name: "bo", class: Archer),
                ],
            )"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.participants[1], Participant::new("bo", PlayerClass::Archer));
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = MatchConfig::from_ron_str("(seed: )", "match.ron").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { ref path, .. } if path == "match.ron"));
    }

    #[test]
    fn test_roster_bounds() {
        let mut config = MatchConfig::default();
        assert!(config.validate().is_ok());
        config.participants.clear();
        assert!(matches!(config.validate(), Err(GameError::Config(_))));
        config.participants = vec![Participant::new("x", PlayerClass::Monk); 5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = MatchConfig::solo(7, PlayerClass::Monk);
        let text = config.to_ron_string().unwrap();
        assert_eq!(MatchConfig::from_ron_str(&text, "roundtrip").unwrap(), config);
    }
}

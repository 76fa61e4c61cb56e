//! Replay system for recording and playing back matches.
//!
//! A replay stores what every participant needs to rebuild the match from
//! scratch: the world description, the match configuration and the event
//! list of every executed step. Because the simulation is deterministic,
//! re-executing the lists reproduces the match exactly; the recorded final
//! hash verifies that.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::MatchConfig;
use crate::error::{GameError, Result};
use crate::protocol::{Event, Step};
use crate::simulation::Match;
use crate::world::WorldDescription;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Map the match was played on.
    pub world: WorldDescription,
    /// Seed and roster.
    pub config: MatchConfig,
    /// Event lists; entry `i` belongs to step `i + 1`.
    pub steps: Vec<Vec<Event>>,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Start recording a match.
    #[must_use]
    pub fn new(world: WorldDescription, config: MatchConfig) -> Self {
        Self {
            version: REPLAY_VERSION,
            world,
            config,
            steps: Vec::new(),
            final_hash: 0,
        }
    }

    /// Record the events of the next step.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if `step` does not follow the last
    /// recorded step.
    pub fn record_step(&mut self, step: Step, events: &[Event]) -> Result<()> {
        let expected = self.duration() + 1;
        if step != expected {
            return Err(GameError::InvalidState(format!(
                "recorded step {step}, expected {expected}"
            )));
        }
        self.steps.push(
            events
                .iter()
                .filter(|event| !event.is_terminator())
                .copied()
                .collect(),
        );
        Ok(())
    }

    /// Finalize the replay with the end-of-match hash.
    pub fn finalize(&mut self, final_hash: u64) {
        self.final_hash = final_hash;
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))
    }

    /// Decode bytes written by [`Replay::to_bytes`], checking the version.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] for undecodable bytes or a
    /// version mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {}, got {}",
                REPLAY_VERSION, replay.version
            )));
        }

        Ok(replay)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_bytes()?)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading, decoding or the version check fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Build the match as it was before step 1.
    ///
    /// # Errors
    /// Returns [`GameError::Config`] if the stored world or roster is invalid.
    pub fn initial_state(&self) -> Result<Match> {
        Match::new(self.world.clone(), &self.config)
    }

    /// Events recorded for `step`.
    #[must_use]
    pub fn events_at(&self, step: Step) -> &[Event] {
        step.checked_sub(1)
            .and_then(|i| self.steps.get(i as usize))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Number of recorded steps.
    #[must_use]
    pub fn duration(&self) -> Step {
        self.steps.len() as Step
    }

    /// Total number of recorded events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.steps.iter().map(Vec::len).sum()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    game: Match,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be built.
    pub fn new(replay: Replay) -> Result<Self> {
        let game = replay.initial_state()?;
        Ok(Self {
            replay,
            game,
            paused: false,
        })
    }

    /// Execute the next recorded step unless paused.
    ///
    /// Returns true if there are more steps to play.
    ///
    /// # Errors
    /// Propagates fatal simulation errors.
    pub fn advance(&mut self) -> Result<bool> {
        if !self.paused && !self.is_finished() {
            let step = self.game.step() + 1;
            self.game.execute_step(step, self.replay.events_at(step))?;
        }
        Ok(!self.is_finished())
    }

    /// Jump to `target`, rebuilding the match if it lies in the past.
    ///
    /// # Errors
    /// Propagates initial-state and simulation errors.
    pub fn seek(&mut self, target: Step) -> Result<()> {
        if target < self.game.step() {
            self.game = self.replay.initial_state()?;
        }
        let target = target.min(self.replay.duration());
        while self.game.step() < target {
            let step = self.game.step() + 1;
            self.game.execute_step(step, self.replay.events_at(step))?;
        }
        Ok(())
    }

    /// Last executed step.
    #[must_use]
    pub fn current_step(&self) -> Step {
        self.game.step()
    }

    /// Current match state.
    #[must_use]
    pub const fn game(&self) -> &Match {
        &self.game
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if the replay has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.game.step() >= self.replay.duration()
    }

    /// Play to the end and compare against the recorded hash.
    ///
    /// # Errors
    /// Propagates simulation errors.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.duration())?;
        Ok(self.game.state_hash() == self.replay.final_hash)
    }

    /// Toggle pause state.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PlayerClass;
    use crate::protocol::Action;

    fn record(steps: Step) -> Replay {
        let world = WorldDescription::open_field(30, 30);
        let config = MatchConfig::solo(77, PlayerClass::Knight);
        let mut game = Match::new(world.clone(), &config).unwrap();
        let mut replay = Replay::new(world, config);
        for step in 1..=steps {
            let mut events = Vec::new();
            if step % 40 == 1 {
                events.push(Event::PlayerAction {
                    step,
                    player: 0,
                    action: Action::MovementKeys {
                        keys: [step % 80 == 1, false, step % 80 != 1, true],
                    },
                });
            }
            events.push(Event::NoMoreEvents { step });
            game.execute_step(step, &events).unwrap();
            replay.record_step(step, &events).unwrap();
        }
        replay.finalize(game.state_hash());
        replay
    }

    #[test]
    fn test_record_skips_terminators() {
        let replay = record(3);
        assert_eq!(replay.duration(), 3);
        assert_eq!(replay.event_count(), 1);
        assert!(replay.events_at(0).is_empty());
        assert!(replay.events_at(4).is_empty());
    }

    #[test]
    fn test_record_rejects_gaps() {
        let mut replay = record(2);
        assert!(matches!(replay.record_step(4, &[]), Err(GameError::InvalidState(_))));
    }

    #[test]
    fn test_verify_matches_recording() {
        let mut player = ReplayPlayer::new(record(200)).unwrap();
        assert!(player.verify().unwrap());
        assert!(player.is_finished());
    }

    #[test]
    fn test_tampered_replay_fails_verification() {
        let mut replay = record(200);
        replay.steps[0].clear();
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(!player.verify().unwrap());
    }

    #[test]
    fn test_seek_backwards_rebuilds() {
        let mut player = ReplayPlayer::new(record(50)).unwrap();
        player.seek(30).unwrap();
        let at_30 = player.game().state_hash();
        player.seek(50).unwrap();
        player.seek(30).unwrap();
        assert_eq!(player.current_step(), 30);
        assert_eq!(player.game().state_hash(), at_30);
    }

    #[test]
    fn test_pause_holds_position() {
        let mut player = ReplayPlayer::new(record(5)).unwrap();
        player.toggle_pause();
        assert!(player.advance().unwrap());
        assert_eq!(player.current_step(), 0);
        player.toggle_pause();
        player.advance().unwrap();
        assert_eq!(player.current_step(), 1);
    }

    #[test]
    fn test_bytes_roundtrip_and_version_check() {
        let replay = record(10);
        let bytes = replay.to_bytes().unwrap();
        assert_eq!(Replay::from_bytes(&bytes).unwrap(), replay);

        let mut old = replay;
        old.version = REPLAY_VERSION + 1;
        let err = Replay::from_bytes(&old.to_bytes().unwrap()).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_save_and_load_file() {
        let replay = record(5);
        let path = std::env::temp_dir().join(format!("wave_replay_{}.bin", std::process::id()));
        replay.save(&path).unwrap();
        let loaded = Replay::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, replay);
    }
}

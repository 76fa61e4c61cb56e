//! Step authority.
//!
//! The hosting participant owns the only place where actions become events.
//! Every participant, the host included, submits [`Action`]s; shortly before
//! the host's next step is due the authority stamps everything queued so far
//! with the next free step number, closes the step with a terminator and
//! hands the list to every participant. Because all participants receive the
//! same list in the same order, their matches stay identical.
//!
//! Actions of dead players are dropped at this point, so a dead player never
//! produces an event. A participant that disconnects keeps its entity in
//! the match; it simply stops producing actions.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use wave_core::entity::EntityId;
use wave_core::lockstep::LockstepDriver;
use wave_core::protocol::{Action, Event, Step};
use wave_core::simulation::Match;
use wave_core::tuning::STEP_MS;

use crate::error::{Result, ServerError};

/// The host plays as this entity.
pub const LOCAL_PLAYER: EntityId = 0;

/// How long into a step interval the authority waits before closing the
/// next step.
pub const BUILD_THRESHOLD_MS: u32 = STEP_MS / 3;

/// A remote participant as the authority sees it.
#[derive(Debug, Clone, Default)]
struct RemoteSlot {
    connected: bool,
    actions: VecDeque<Action>,
}

/// Per-participant action queues and connection flags.
#[derive(Debug, Clone)]
pub struct Authority {
    local: VecDeque<Action>,
    /// Remote participants, indexed by `player - 1`.
    remotes: Vec<RemoteSlot>,
}

impl Authority {
    /// An authority for `num_players` participants, the host included.
    /// Remote participants start connected.
    #[must_use]
    pub fn new(num_players: u32) -> Self {
        let remotes = (1..num_players)
            .map(|_| RemoteSlot {
                connected: true,
                actions: VecDeque::new(),
            })
            .collect();
        Self {
            local: VecDeque::new(),
            remotes,
        }
    }

    /// Number of participants, the host included.
    #[must_use]
    pub fn num_players(&self) -> u32 {
        self.remotes.len() as u32 + 1
    }

    fn remote_mut(&mut self, player: EntityId) -> Result<&mut RemoteSlot> {
        player
            .checked_sub(1)
            .and_then(|i| self.remotes.get_mut(i as usize))
            .ok_or(ServerError::UnknownParticipant(player))
    }

    /// Queue an action for the next step. Actions from disconnected
    /// participants are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownParticipant`] for IDs outside the match.
    pub fn queue_action(&mut self, player: EntityId, action: Action) -> Result<()> {
        if player == LOCAL_PLAYER {
            self.local.push_back(action);
            return Ok(());
        }
        let slot = self.remote_mut(player)?;
        if slot.connected {
            slot.actions.push_back(action);
        } else {
            warn!(player, "Ignored action from disconnected participant");
        }
        Ok(())
    }

    /// Mark a remote participant as connected again.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownParticipant`] for the host or unknown IDs.
    pub fn connect(&mut self, player: EntityId) -> Result<()> {
        self.remote_mut(player)?.connected = true;
        info!(player, "Participant connected");
        Ok(())
    }

    /// Stop reading from a remote participant. Its queued actions are
    /// dropped; its entity stays in the match.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownParticipant`] for the host or unknown IDs.
    pub fn disconnect(&mut self, player: EntityId) -> Result<()> {
        let slot = self.remote_mut(player)?;
        slot.connected = false;
        slot.actions.clear();
        info!(player, "Participant disconnected");
        Ok(())
    }

    /// Whether a participant is taking part. The host always is.
    #[must_use]
    pub fn is_connected(&self, player: EntityId) -> bool {
        player == LOCAL_PLAYER
            || player
                .checked_sub(1)
                .and_then(|i| self.remotes.get(i as usize))
                .is_some_and(|slot| slot.connected)
    }

    /// Connected remote participants in ID order.
    pub fn connected_remotes(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.remotes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.connected)
            .map(|(i, _)| i as EntityId + 1)
    }

    /// Whether the next step should be closed now: the driver has executed
    /// everything it has, and a third of the step interval has passed.
    #[must_use]
    pub fn is_due(driver: &LockstepDriver) -> bool {
        driver.latest_available() <= driver.step() && driver.timer_ms() >= BUILD_THRESHOLD_MS
    }

    /// Turn all queued actions into the event list of `step`: connected
    /// remotes in ID order, then the host, then the terminator.
    pub fn build_step(&mut self, step: Step, is_dead: impl Fn(EntityId) -> bool) -> Vec<Event> {
        let mut events = Vec::new();
        for (i, slot) in self.remotes.iter_mut().enumerate() {
            if slot.connected {
                drain_queue(&mut slot.actions, i as EntityId + 1, step, &is_dead, &mut events);
            }
        }
        drain_queue(&mut self.local, LOCAL_PLAYER, step, &is_dead, &mut events);
        events.push(Event::NoMoreEvents { step });
        events
    }
}

fn drain_queue(
    queue: &mut VecDeque<Action>,
    player: EntityId,
    step: Step,
    is_dead: &impl Fn(EntityId) -> bool,
    events: &mut Vec<Event>,
) {
    if is_dead(player) {
        if !queue.is_empty() {
            debug!(player, dropped = queue.len(), "Dropped actions of dead player");
        }
        queue.clear();
        return;
    }
    events.extend(
        queue
            .drain(..)
            .map(|action| Event::PlayerAction { step, player, action }),
    );
}

/// The hosting participant: its own match and driver plus the authority.
#[derive(Debug, Clone)]
pub struct Host {
    game: Match,
    driver: LockstepDriver,
    authority: Authority,
}

impl Host {
    /// Host `game`. Every participant of the match gets a queue.
    #[must_use]
    pub fn new(game: Match) -> Self {
        let authority = Authority::new(game.players().len() as u32);
        Self {
            game,
            driver: LockstepDriver::new(),
            authority,
        }
    }

    /// The host's match.
    #[must_use]
    pub fn game(&self) -> &Match {
        &self.game
    }

    /// The host's lockstep driver.
    #[must_use]
    pub fn driver(&self) -> &LockstepDriver {
        &self.driver
    }

    /// The action queues.
    #[must_use]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Mutable access to the action queues.
    pub fn authority_mut(&mut self) -> &mut Authority {
        &mut self.authority
    }

    /// One frame: close the next step if it is due, then let the driver
    /// run whatever is ready. Returns the event list of the step closed in
    /// this frame, which must be sent to every connected remote.
    ///
    /// # Errors
    ///
    /// Propagates fatal simulation errors.
    pub fn frame(&mut self, elapsed_ms: u32) -> Result<Option<Vec<Event>>> {
        let mut built = None;
        if Authority::is_due(&self.driver) {
            let step = self.driver.latest_available() + 1;
            let game = &self.game;
            let events = self
                .authority
                .build_step(step, |player| game.is_player_dead(player));
            for event in &events {
                self.driver.receive(*event)?;
            }
            built = Some(events);
        }
        self.driver.advance(elapsed_ms, &mut self.game)?;
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::entity::PlayerClass;
    use wave_test_utils::fixtures::{party_match, solo_match};

    fn keys() -> Action {
        Action::MovementKeys {
            keys: [true, false, false, false],
        }
    }

    #[test]
    fn test_build_orders_remotes_then_host() {
        let mut authority = Authority::new(3);
        authority.queue_action(0, Action::SelfSkill { slot: 1 }).unwrap();
        authority.queue_action(2, keys()).unwrap();
        authority.queue_action(1, keys()).unwrap();
        authority.queue_action(1, Action::UpgradeSkill { slot: 2 }).unwrap();

        let events = authority.build_step(7, |_| false);
        let players: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::PlayerAction { player, .. } => Some(*player),
                Event::NoMoreEvents { .. } => None,
            })
            .collect();
        assert_eq!(players, vec![1, 1, 2, 0]);
        assert!(events.iter().all(|e| e.step() == 7));
        assert_eq!(events.last(), Some(&Event::NoMoreEvents { step: 7 }));
    }

    #[test]
    fn test_queues_drain() {
        let mut authority = Authority::new(2);
        authority.queue_action(1, keys()).unwrap();
        assert_eq!(authority.build_step(1, |_| false).len(), 2);
        assert_eq!(authority.build_step(2, |_| false), vec![Event::NoMoreEvents { step: 2 }]);
    }

    #[test]
    fn test_dead_player_actions_discarded() {
        let mut authority = Authority::new(2);
        authority.queue_action(1, keys()).unwrap();
        authority.queue_action(0, keys()).unwrap();
        let events = authority.build_step(1, |player| player == 1);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::PlayerAction { player: 0, .. }));

        // Discarded, not deferred.
        let events = authority.build_step(2, |_| false);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_disconnect_keeps_others_flowing() {
        let mut authority = Authority::new(3);
        authority.queue_action(1, keys()).unwrap();
        authority.disconnect(1).unwrap();
        authority.queue_action(1, keys()).unwrap();
        authority.queue_action(2, keys()).unwrap();

        assert!(!authority.is_connected(1));
        assert!(authority.is_connected(0));
        assert_eq!(authority.connected_remotes().collect::<Vec<_>>(), vec![2]);
        let events = authority.build_step(1, |_| false);
        assert_eq!(events.len(), 2);

        authority.connect(1).unwrap();
        assert!(authority.is_connected(1));
    }

    #[test]
    fn test_unknown_participant_rejected() {
        let mut authority = Authority::new(2);
        assert!(matches!(
            authority.queue_action(5, keys()),
            Err(ServerError::UnknownParticipant(5))
        ));
        assert!(authority.disconnect(0).is_err());
    }

    #[test]
    fn test_host_closes_step_after_a_third() {
        let mut host = Host::new(solo_match(PlayerClass::Knight, 1));
        assert!(host.frame(BUILD_THRESHOLD_MS).unwrap().is_none());
        let events = host.frame(0).unwrap().unwrap();
        assert_eq!(events, vec![Event::NoMoreEvents { step: 1 }]);
        assert_eq!(host.driver().latest_available(), 1);
        assert_eq!(host.game().step(), 0);

        assert!(host.frame(STEP_MS).unwrap().is_none());
        assert_eq!(host.game().step(), 1);
    }

    #[test]
    fn test_host_runs_at_step_rate() {
        let mut host = Host::new(party_match(3));
        let start = host.game().entity(2).unwrap().character.position;
        assert_eq!(host.authority().num_players(), 4);
        host.authority_mut().queue_action(2, keys()).unwrap();
        let mut closed = 0;
        for _ in 0..400 {
            if host.frame(STEP_MS / 4).unwrap().is_some() {
                closed += 1;
            }
        }
        assert!(closed >= 60);
        assert!(host.game().step() + 1 >= closed);
        assert_ne!(host.game().entity(2).unwrap().character.position, start);
    }
}

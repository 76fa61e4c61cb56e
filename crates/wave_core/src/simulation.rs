//! The match: world, entities and the per-step update.
//!
//! # Determinism
//!
//! Every participant builds the same [`Match`] from the same world
//! description and [`MatchConfig`], then executes the same event lists in
//! the same step order. Entities live in a `BTreeMap` and are simulated in a
//! fixed order: players, then creeps, then allies, each group by ID. All
//! randomness comes from the match seed.
//!
//! # Example
//!
//! ```
//! use wave_core::config::MatchConfig;
//! use wave_core::entity::PlayerClass;
//! use wave_core::simulation::Match;
//! use wave_core::world::WorldDescription;
//!
//! let mut game = Match::new(
//!     WorldDescription::open_field(30, 30),
//!     &MatchConfig::solo(1, PlayerClass::Knight),
//! )
//! .unwrap();
//! game.execute_step(1, &[]).unwrap();
//! assert_eq!(game.step(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::combat::{KillCredit, StepContext};
use crate::config::MatchConfig;
use crate::creep_ai::{new_creep, new_guard, new_scarecrow, reached_goal, step_creep};
use crate::entity::{Entity, EntityId};
use crate::error::{GameError, Result};
use crate::lockstep::StepExecutor;
use crate::player::new_player;
use crate::protocol::{Action, Event, Step};
use crate::rng::SeededRandom;
use crate::spatial::SpatialIndex;
use crate::tuning::{
    CREEP_SPAWN_COOLDOWN_MS, CREEP_SPAWN_NEXT_LEVEL_SEC, CREEP_SPAWN_POINT_2_ACTIVATE_MIN,
    CREEP_SPAWN_POINT_3_ACTIVATE_MIN, DEFAULT_CHARACTER_RADIUS, MAX_LIVES, MAX_NUM_PLAYERS,
    NUM_SPAWN_ZONES, SPAWN_TRIALS, STEP_MS,
};
use crate::world::{WorldDescription, WorldMap};

/// How the match stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Outcome {
    /// Still running.
    #[default]
    InProgress,
    /// All three guards are dead.
    Won,
    /// The last life was lost.
    Lost,
}

/// Complete simulation state of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    world: WorldMap,
    index: SpatialIndex,
    entities: BTreeMap<EntityId, Entity>,
    players: Vec<EntityId>,
    creeps: Vec<EntityId>,
    allies: Vec<EntityId>,
    guards: [Option<EntityId>; NUM_SPAWN_ZONES],
    /// Dead creeps playing their death animation.
    corpses: Vec<EntityId>,
    next_entity_id: EntityId,
    lives: u32,
    outcome: Outcome,
    rng: SeededRandom,
    step: Step,
}

impl Match {
    /// Build the initial state: validate the world and place one player per
    /// participant at its spawn position.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Config`] for an invalid world or roster.
    pub fn new(description: WorldDescription, config: &MatchConfig) -> Result<Self> {
        config.validate()?;
        let world = WorldMap::new(description)?;
        let mut rng = SeededRandom::new(config.seed);
        let mut index = SpatialIndex::new(world.width(), world.height());
        let mut entities = BTreeMap::new();
        let mut players = Vec::with_capacity(config.participants.len());

        for (id, participant) in (0..).zip(&config.participants) {
            let position = *world.player_spawn_positions().get(id as usize).ok_or_else(|| {
                GameError::Config(format!("no spawn position for player {id}"))
            })?;
            let player = new_player(id, participant.class, &participant.name, position, rng.fork_seed());
            index.insert(id, position, player.character.radius);
            entities.insert(id, player);
            players.push(id);
        }

        info!(
            players = players.len(),
            seed = config.seed,
            width = world.width(),
            height = world.height(),
            "Match created"
        );

        Ok(Self {
            world,
            index,
            entities,
            players,
            creeps: Vec::new(),
            allies: Vec::new(),
            guards: [None; NUM_SPAWN_ZONES],
            corpses: Vec::new(),
            next_entity_id: MAX_NUM_PLAYERS,
            lives: MAX_LIVES,
            outcome: Outcome::InProgress,
            rng,
            step: 0,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Last executed step.
    #[must_use]
    pub fn step(&self) -> Step {
        self.step
    }

    /// Remaining lives.
    #[must_use]
    pub fn lives(&self) -> u32 {
        self.lives
    }

    /// Current outcome.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Static world.
    #[must_use]
    pub fn world(&self) -> &WorldMap {
        &self.world
    }

    /// Spatial index of living entities.
    #[must_use]
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Any entity, alive or not, that is still part of the match.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access for tools and tests.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// All entities by ID.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Player IDs in join order.
    #[must_use]
    pub fn players(&self) -> &[EntityId] {
        &self.players
    }

    /// Living creep IDs and creeps that died this step.
    #[must_use]
    pub fn creeps(&self) -> &[EntityId] {
        &self.creeps
    }

    /// Ally IDs.
    #[must_use]
    pub fn allies(&self) -> &[EntityId] {
        &self.allies
    }

    /// Guard per spawn zone, once spawned.
    #[must_use]
    pub fn guards(&self) -> &[Option<EntityId>; NUM_SPAWN_ZONES] {
        &self.guards
    }

    /// Dead creeps still animating.
    #[must_use]
    pub fn corpses(&self) -> &[EntityId] {
        &self.corpses
    }

    /// Whether `player` is a participant that is currently dead.
    #[must_use]
    pub fn is_player_dead(&self, player: EntityId) -> bool {
        self.entities
            .get(&player)
            .is_some_and(|e| e.is_player() && e.character.is_dead())
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Execute `step` with its events.
    ///
    /// Order: events, creep spawns, players, creeps, allies, corpses,
    /// outcome. Commands that are not possible right now are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Protocol`] if `step` is not the next step or an
    /// event belongs to another step or an unknown player. Fatal errors from
    /// the update propagate; the state is then unusable.
    pub fn execute_step(&mut self, step: Step, events: &[Event]) -> Result<()> {
        if step != self.step + 1 {
            return Err(GameError::Protocol(format!(
                "step {step} executed after step {}",
                self.step
            )));
        }
        for event in events {
            if event.step() != step {
                return Err(GameError::Protocol(format!(
                    "event for step {} in step {step}",
                    event.step()
                )));
            }
            if let Event::PlayerAction { player, .. } = event {
                if !self.players.contains(player) {
                    return Err(GameError::Protocol(format!("event for unknown player {player}")));
                }
            }
        }
        self.step = step;

        for event in events {
            if let Event::PlayerAction { player, action, .. } = event {
                self.apply_action(*player, action)?;
            }
        }

        self.spawn_creeps()?;
        self.simulate_players()?;
        self.simulate_creeps()?;
        self.simulate_allies()?;
        self.simulate_corpses()?;
        self.update_outcome();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(step = self.step, state_hash = hash, "Match state hash");
        }

        #[cfg(feature = "debug-validation")]
        self.validate_index()?;

        Ok(())
    }

    /// Every registered footprint must belong to a living entity.
    #[cfg(feature = "debug-validation")]
    fn validate_index(&self) -> Result<()> {
        for id in self.index.registered() {
            match self.entities.get(&id) {
                Some(entity) if !entity.character.is_dead() => {}
                _ => {
                    return Err(GameError::InvalidState(format!(
                        "step {}: index holds dead or unknown entity {id}",
                        self.step
                    )))
                }
            }
        }
        Ok(())
    }

    /// Run `f` on an entity taken out of the map, then put it back and pay
    /// the kill credits it earned.
    fn with_entity<R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut Entity, &mut StepContext<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut entity = self.entities.remove(&id).ok_or(GameError::EntityNotFound(id))?;
        let mut credits = Vec::new();
        let result = {
            let mut ctx = StepContext {
                world: &self.world,
                index: &mut self.index,
                others: &mut self.entities,
                credits: &mut credits,
            };
            f(&mut entity, &mut ctx)
        };
        self.entities.insert(id, entity);
        self.pay_credits(&credits)?;
        result
    }

    fn pay_credits(&mut self, credits: &[KillCredit]) -> Result<()> {
        for credit in credits {
            if let Some(player) = self.entities.get_mut(&credit.player) {
                player.killed_creep(credit.fraction)?;
            }
        }
        Ok(())
    }

    fn apply_action(&mut self, player: EntityId, action: &Action) -> Result<()> {
        let outcome = self.with_entity(player, |entity, ctx| entity.apply_action(action, ctx));
        match outcome {
            Ok(()) => {}
            Err(err) if !err.is_fatal() => {
                warn!(step = self.step, player, ?action, %err, "Discarded command");
            }
            Err(err) => return Err(err),
        }

        let pending = self
            .entities
            .get_mut(&player)
            .and_then(Entity::as_player_mut)
            .and_then(|state| {
                let position = state.pending_scarecrow.take()?;
                let level = match *action {
                    Action::PositionTargetSkill { slot, .. } => state.skill_slot(slot).map_or(1, |s| s.level),
                    _ => 1,
                };
                Some((position, level))
            });
        if let Some((position, level)) = pending {
            let id = self.allocate_id();
            let scarecrow = new_scarecrow(id, position, level, self.rng.fork_seed());
            self.index.insert(id, position, scarecrow.character.radius);
            self.entities.insert(id, scarecrow);
            self.allies.push(id);
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Spawn point 0 fires every `CREEP_SPAWN_COOLDOWN_MS / players`
    /// milliseconds; points 1 and 2 join after their activation minute.
    fn spawn_creeps(&mut self) -> Result<()> {
        let players = self.players.len().max(1) as u64;
        let interval = u64::from(CREEP_SPAWN_COOLDOWN_MS) / players;
        let elapsed = u64::from(self.step) * u64::from(STEP_MS);
        if interval == 0 || elapsed % interval != 0 {
            return Ok(());
        }
        let activations = [
            0,
            u64::from(CREEP_SPAWN_POINT_2_ACTIVATE_MIN) * 60_000,
            u64::from(CREEP_SPAWN_POINT_3_ACTIVATE_MIN) * 60_000,
        ];
        for (zone, activation) in activations.into_iter().enumerate() {
            if elapsed >= activation {
                self.spawn_at(zone, elapsed)?;
            }
        }
        Ok(())
    }

    /// Each zone first yields its guard, then creeps until the guard dies.
    fn spawn_at(&mut self, zone: usize, elapsed_ms: u64) -> Result<()> {
        let guard = self.guards[zone];
        if guard.is_some_and(|id| self.entities.get(&id).map_or(true, |g| g.character.is_dead())) {
            return Ok(());
        }
        let Some(area) = self.world.creep_spawn_zones().get(zone).copied() else {
            return Err(GameError::Config(format!("missing creep spawn zone {zone}")));
        };
        let position = match self.index.find_free_spawn_position(
            &area,
            DEFAULT_CHARACTER_RADIUS,
            &mut self.rng,
            SPAWN_TRIALS,
        ) {
            Ok(position) => position,
            Err(err) if !err.is_fatal() => {
                warn!(step = self.step, zone, %err, "Spawn zone crowded, skipping this spawn");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let id = self.allocate_id();
        let seed = self.rng.fork_seed();
        let entity = if guard.is_none() {
            info!(step = self.step, zone, guard = id, "Guard spawned");
            self.guards[zone] = Some(id);
            new_guard(id, position, seed)
        } else {
            let level = (elapsed_ms / (u64::from(CREEP_SPAWN_NEXT_LEVEL_SEC) * 1000)) as u32 + 1;
            self.creeps.push(id);
            new_creep(id, level, position, seed)
        };
        self.index.insert(id, position, entity.character.radius);
        self.entities.insert(id, entity);
        Ok(())
    }

    fn simulate_players(&mut self) -> Result<()> {
        for id in self.players.clone() {
            self.with_entity(id, |entity, ctx| entity.step_player(ctx))?;
        }
        Ok(())
    }

    fn simulate_creeps(&mut self) -> Result<()> {
        let goal = *self.world.creep_goal();
        let mut remaining = Vec::with_capacity(self.creeps.len());
        for id in std::mem::take(&mut self.creeps) {
            let dead = self
                .entities
                .get(&id)
                .map_or(true, |e| e.character.is_dead());
            if dead {
                self.corpses.push(id);
                continue;
            }
            let arrived = self.with_entity(id, |entity, ctx| {
                step_creep(entity, ctx)?;
                Ok(reached_goal(entity, &goal))
            })?;
            if arrived {
                if let Some(creep) = self.entities.remove(&id) {
                    let c = &creep.character;
                    self.index.remove(id, c.position, c.radius);
                }
                self.lives = self.lives.saturating_sub(1);
                info!(step = self.step, creep = id, lives = self.lives, "Creep reached the goal");
            } else {
                remaining.push(id);
            }
        }
        self.creeps = remaining;
        Ok(())
    }

    fn simulate_allies(&mut self) -> Result<()> {
        let mut remaining = Vec::with_capacity(self.allies.len());
        for id in std::mem::take(&mut self.allies) {
            let dead = self
                .entities
                .get(&id)
                .map_or(true, |e| e.character.is_dead());
            if dead {
                self.entities.remove(&id);
                continue;
            }
            self.with_entity(id, |entity, ctx| entity.step_character(ctx))?;
            remaining.push(id);
        }
        self.allies = remaining;
        Ok(())
    }

    fn simulate_corpses(&mut self) -> Result<()> {
        let mut remaining = Vec::with_capacity(self.corpses.len());
        for id in std::mem::take(&mut self.corpses) {
            let done = self.with_entity(id, |entity, ctx| {
                entity.step_character(ctx)?;
                entity.character.death_animation_complete()
            })?;
            if done {
                self.entities.remove(&id);
            } else {
                remaining.push(id);
            }
        }
        self.corpses = remaining;
        Ok(())
    }

    fn update_outcome(&mut self) {
        if self.outcome != Outcome::InProgress {
            return;
        }
        let guards_dead = self.guards.iter().all(|guard| {
            guard.is_some_and(|id| self.entities.get(&id).map_or(true, |g| g.character.is_dead()))
        });
        if self.lives == 0 {
            self.outcome = Outcome::Lost;
        } else if guards_dead {
            self.outcome = Outcome::Won;
        } else {
            return;
        }
        info!(step = self.step, outcome = ?self.outcome, "Match decided");
    }

    // ------------------------------------------------------------------
    // Hashing and snapshots
    // ------------------------------------------------------------------

    /// Hash of the complete simulation state.
    ///
    /// Participants compare these to detect desyncs. Entities are hashed in
    /// ID order.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.step.hash(&mut hasher);
        self.lives.hash(&mut hasher);
        self.outcome.hash(&mut hasher);
        self.next_entity_id.hash(&mut hasher);
        self.rng.state().hash(&mut hasher);
        self.guards.hash(&mut hasher);
        self.creeps.hash(&mut hasher);
        self.allies.hash(&mut hasher);
        self.corpses.hash(&mut hasher);
        self.entities.len().hash(&mut hasher);
        for (id, entity) in &self.entities {
            id.hash(&mut hasher);
            entity.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Compare against a remote hash for `step`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DesyncDetected`] if the hashes differ.
    pub fn check_hash(&self, remote_hash: u64) -> Result<()> {
        let local_hash = self.state_hash();
        if local_hash == remote_hash {
            Ok(())
        } else {
            Err(GameError::DesyncDetected {
                step: self.step,
                local_hash,
                remote_hash,
            })
        }
    }

    /// Snapshot the match.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize match: {e}")))
    }

    /// Restore a snapshot written by [`Match::serialize`].
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the bytes are not a snapshot.
    pub fn restore(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to restore match: {e}")))
    }
}

impl StepExecutor for Match {
    fn execute_step(&mut self, step: Step, events: &[Event]) -> Result<()> {
        Match::execute_step(self, step, events)
    }
}

//! Damage, healing, conditions and the per-step character update.
//!
//! The acting entity is always taken out of the entity store while it runs,
//! so everything it can touch goes through a [`StepContext`]: the world, the
//! spatial index, every other entity, and the queue of kill credits that the
//! match pays out once the actor is back in the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{BehaviorState, Character, Condition, Entity, EntityId, Role};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Timer, Vec2Fixed};
use crate::spatial::SpatialIndex;
use crate::tuning::{IMMUNE_DAMAGE_FACTOR, MOVEMENT_DEAD_ZONE, RUN_SPEED_THRESHOLD, STEP_SEC};
use crate::world::WorldMap;

/// Share of a killed creep's reward owed to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillCredit {
    /// Player to pay.
    pub player: EntityId,
    /// Fraction of the total damage this player dealt.
    #[serde(with = "fixed_serde")]
    pub fraction: Fixed,
}

/// Everything an entity may read or modify while it is simulated.
pub struct StepContext<'a> {
    /// Static map.
    pub world: &'a WorldMap,
    /// Spatial index; registration means alive.
    pub index: &'a mut SpatialIndex,
    /// Every entity except the one being simulated.
    pub others: &'a mut BTreeMap<EntityId, Entity>,
    /// Credits earned during this update, paid by the caller.
    pub credits: &'a mut Vec<KillCredit>,
}

impl StepContext<'_> {
    /// Position of another entity if it is alive.
    #[must_use]
    pub fn position_of(&self, id: EntityId) -> Option<Vec2Fixed> {
        if !self.index.is_alive(id) {
            return None;
        }
        self.others.get(&id).map(|e| e.character.position)
    }

    /// Another living entity.
    #[must_use]
    pub fn alive(&self, id: EntityId) -> Option<&Entity> {
        self.others.get(&id).filter(|_| self.index.is_alive(id))
    }

    /// Harm another entity. Unknown IDs are ignored.
    pub fn harm(&mut self, target: EntityId, amount: Fixed, attacker: EntityId) {
        if let Some(entity) = self.others.get_mut(&target) {
            entity.harm(amount, attacker, self.index, self.credits);
        }
    }

    /// Run `effect` on every living creep or guard whose exact distance to
    /// `center` is at most `radius`, in ascending ID order.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `effect`.
    pub fn for_each_hostile_within(
        &mut self,
        center: Vec2Fixed,
        radius: Fixed,
        mut effect: impl FnMut(&mut Entity, &mut SpatialIndex, &mut Vec<KillCredit>) -> Result<()>,
    ) -> Result<()> {
        let radius_sq = radius.saturating_mul(radius);
        for id in self.index.at_with_tolerance(center, radius) {
            let Some(entity) = self.others.get_mut(&id) else {
                continue;
            };
            if entity.is_player_or_ally() || entity.character.is_dead() {
                continue;
            }
            if entity.character.position.distance_squared(center) <= radius_sq {
                effect(entity, self.index, self.credits)?;
            }
        }
        Ok(())
    }

    /// Area damage: every hostile in range flinches and takes `amount`.
    ///
    /// # Errors
    ///
    /// Never fails today; shares the signature of the other area effects.
    pub fn area_of_effect(
        &mut self,
        center: Vec2Fixed,
        radius: Fixed,
        amount: Fixed,
        attacker: EntityId,
    ) -> Result<()> {
        self.for_each_hostile_within(center, radius, |entity, index, credits| {
            entity.character.set_state(BehaviorState::Hit);
            entity.harm(amount, attacker, index, credits);
            Ok(())
        })
    }
}

impl Character {
    /// Restore HP, capped at the maximum.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] if the character is dead.
    pub fn heal(&mut self, amount: Fixed) -> Result<()> {
        if self.is_dead() {
            return Err(GameError::Precondition(format!(
                "cannot heal dead entity {}",
                self.id
            )));
        }
        self.hp = self.hp.saturating_add(amount).min(self.max_hp);
        Ok(())
    }

    /// Apply a timed condition, replacing any running one of the same kind.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] for poison with a negative
    /// damage rate.
    pub fn give_condition(
        &mut self,
        condition: Condition,
        duration: Timer,
        attacker: EntityId,
        payload: Fixed,
    ) -> Result<()> {
        if condition == Condition::Poisoned && payload < Fixed::ZERO {
            return Err(GameError::Precondition(format!(
                "negative poison rate {payload} on entity {}",
                self.id
            )));
        }
        self.conditions
            .set(condition, duration.max(Timer::ZERO), attacker, payload);
        Ok(())
    }

    /// Where the character ends up after one step at its current velocity,
    /// or `None` if that spot is off the map, inside an obstacle or
    /// overlapping another registered character.
    #[must_use]
    pub fn next_position(&self, world: &WorldMap, index: &SpatialIndex) -> Option<Vec2Fixed> {
        let next = self.position + self.velocity * STEP_SEC;
        let valid = world.in_map(next)
            && !world.is_blocked(next)
            && !index.collides(next, self.radius, Some(self.id));
        valid.then_some(next)
    }
}

impl Entity {
    /// Deal damage.
    ///
    /// Dead entities ignore it. Creeps record the damage per attacker before
    /// immunity is applied; when a creep dies its recorded damage is turned
    /// into kill credits. Death removes the entity from the index.
    pub fn harm(
        &mut self,
        amount: Fixed,
        attacker: EntityId,
        index: &mut SpatialIndex,
        credits: &mut Vec<KillCredit>,
    ) {
        if self.character.is_dead() {
            return;
        }
        let mut amount = amount.max(Fixed::ZERO);
        if let Role::Creep(creep) = &mut self.role {
            creep.record_damage(attacker, amount.min(self.character.hp));
        }
        if self.character.has_condition(Condition::ImmuneToDamage) {
            amount = amount.saturating_mul(IMMUNE_DAMAGE_FACTOR);
        }

        let character = &mut self.character;
        character.hp = character.hp.saturating_sub(amount);
        if character.hp > Fixed::ZERO {
            return;
        }
        character.hp = Fixed::ZERO;
        character.velocity = Vec2Fixed::ZERO;
        index.remove(character.id, character.position, character.radius);
        character.set_state(BehaviorState::Die);
        if let Role::Creep(creep) = &self.role {
            credits.extend(creep.kill_credits());
        }
    }

    /// Shared end-of-step update for every acting entity: poison damage,
    /// condition countdown, behavior state and facing.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Geometry`] if the facing cannot be derived.
    pub fn step_character(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        if self.character.has_condition(Condition::Poisoned) {
            let poison = *self.character.conditions.slot(Condition::Poisoned);
            self.harm(
                poison.payload.saturating_mul(STEP_SEC),
                poison.attacker,
                ctx.index,
                ctx.credits,
            );
        }
        self.character.conditions.tick();

        let character = &mut self.character;
        if character.is_dead() {
            character.set_state(BehaviorState::Die);
        } else if character.has_attack_target() {
            character.set_state(BehaviorState::Attack);
            if let Some(target) = ctx.position_of(character.attack_target) {
                character.face(target - character.position)?;
            }
        } else {
            let speed = character.velocity.length();
            if speed > RUN_SPEED_THRESHOLD {
                character.set_state(BehaviorState::Run);
            } else if speed > MOVEMENT_DEAD_ZONE {
                character.set_state(BehaviorState::Walk);
            } else {
                character.set_state(BehaviorState::Stop);
            }
            if speed > MOVEMENT_DEAD_ZONE {
                character.face(character.velocity)?;
            }
        }
        character.state_steps = character.state_steps.saturating_add(1);
        Ok(())
    }
}

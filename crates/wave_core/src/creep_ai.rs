//! Creep behavior: target selection, steering and melee attacks.
//!
//! Creeps follow the map's flow field toward the goal, chase players and
//! scarecrows that come within seek range, and stop to attack anything
//! within attack range. Movement is a weighted blend of steering behaviors
//! (seek, flow following, wander, separation and obstacle avoidance) applied
//! as an instant velocity change.
//!
//! Also hosts the constructors for the non-player roles: creeps, guards and
//! scarecrow allies.

use serde::{Deserialize, Serialize};

use crate::combat::{KillCredit, StepContext};
use crate::entity::{Character, CharacterType, Condition, Entity, EntityId, Role};
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, ratio, Fixed, Orientation, Rect, Timer, Vec2Fixed};
use crate::rng::SeededRandom;
use crate::tuning::{
    ARCHER_SCARECROW_HP, ARCHER_SCARECROW_LEVELUP_EXTRA_HP, AVOID_OBSTACLES_CHECK_LENGTH,
    AVOID_OBSTACLES_DISTANCE, CREEP_INITIAL_ATTACK_COOLDOWN_MS, CREEP_INITIAL_ATTACK_DMG,
    CREEP_INITIAL_HP, CREEP_SPAWN_POINT_HP, CREEP_STUCK_TIMER_MS,
    DEFAULT_CREEP_MAX_MOVEMENT_PER_SEC, DEFAULT_CREEP_SEEK_RANGE, LEVELUP_ATTACK_COOLDOWN_FACTOR,
    LEVELUP_ATTACK_DMG_FACTOR, LEVELUP_HP_FACTOR, MAX_NUM_PLAYERS, MOVEMENT_DEAD_ZONE,
    SEPARATION_THRESHOLD_SQ, SEPARATION_TOLERANCE, STEP_MS, STEP_TIMER, WANDER_OFFSET_FACTOR,
};

/// Damage ledger slots: one per player plus one for everyone else.
pub const LEDGER_SLOTS: usize = MAX_NUM_PLAYERS as usize + 1;

const SEEK_WEIGHT: Fixed = Fixed::const_from_int(2);
const FLOW_WEIGHT: Fixed = Fixed::const_from_int(2);
const SEPARATION_WEIGHT: Fixed = Fixed::const_from_int(3);
const AVOID_WEIGHT: Fixed = Fixed::const_from_int(3);

// ============================================================================
// Creep state
// ============================================================================

/// Damage dealt by one attacker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DamageEntry(#[serde(with = "fixed_serde")] pub Fixed);

/// Last computed steering components, kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Steering {
    /// Toward the seek target.
    pub seek: Vec2Fixed,
    /// Along the flow field.
    pub flow: Vec2Fixed,
    /// Random walk.
    pub wander: Vec2Fixed,
    /// Away from crowding neighbours.
    pub separation: Vec2Fixed,
    /// Around obstacles ahead.
    pub avoid: Vec2Fixed,
}

/// Creep-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreepState {
    /// Spawn level.
    pub level: u32,
    ledger: [DamageEntry; LEDGER_SLOTS],
    /// Heading of the wander target on its circle.
    #[serde(with = "fixed_serde")]
    pub wander_angle: Fixed,
    /// Player or ally being chased.
    pub seek_target: Option<EntityId>,
    /// Radius in which targets are noticed.
    #[serde(with = "fixed_serde")]
    pub seek_range: Fixed,
    /// Consecutive steps the creep failed to move.
    pub stuck_counter: u32,
    /// Steering output of the last step.
    pub steering: Steering,
}

impl CreepState {
    /// Fresh state for a creep of `level`.
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level,
            ledger: [DamageEntry::default(); LEDGER_SLOTS],
            wander_angle: Fixed::ZERO,
            seek_target: None,
            seek_range: DEFAULT_CREEP_SEEK_RANGE,
            stuck_counter: 0,
            steering: Steering::default(),
        }
    }

    /// Add to the damage recorded for `attacker`. Non-player attackers share
    /// the last slot.
    pub fn record_damage(&mut self, attacker: EntityId, amount: Fixed) {
        let slot = attacker.min(MAX_NUM_PLAYERS) as usize;
        self.ledger[slot].0 = self.ledger[slot].0.saturating_add(amount);
    }

    /// Damage recorded for a player.
    #[must_use]
    pub fn damage_by(&self, player: EntityId) -> Fixed {
        self.ledger
            .get(player as usize)
            .map_or(Fixed::ZERO, |entry| entry.0)
    }

    /// Each damaging player's share of all recorded damage.
    #[must_use]
    pub fn kill_credits(&self) -> Vec<KillCredit> {
        let total = self
            .ledger
            .iter()
            .fold(Fixed::ZERO, |sum, entry| sum.saturating_add(entry.0));
        if total <= Fixed::ZERO {
            return Vec::new();
        }
        (0..MAX_NUM_PLAYERS)
            .filter_map(|player| {
                let dealt = self.ledger[player as usize].0;
                (dealt > Fixed::ZERO).then(|| KillCredit {
                    player,
                    fraction: dealt / total,
                })
            })
            .collect()
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Combat stats of a freshly spawned creep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreepStats {
    /// Max HP.
    pub hp: Fixed,
    /// Attack damage.
    pub attack_damage: Fixed,
    /// Attack cooldown.
    pub attack_cooldown: Timer,
    /// Speed in cells per second.
    pub max_speed: Fixed,
}

/// Stats for `level`, drawing the speed jitter from `rng`.
///
/// Every level scales HP, damage and cooldown by the level-up factors. A few
/// levels introduce creep variants with their own trade-offs.
pub fn creep_stats(level: u32, rng: &mut SeededRandom) -> CreepStats {
    let nominal = DEFAULT_CREEP_MAX_MOVEMENT_PER_SEC * 1000;
    let mut stats = CreepStats {
        hp: CREEP_INITIAL_HP,
        attack_damage: CREEP_INITIAL_ATTACK_DMG,
        attack_cooldown: CREEP_INITIAL_ATTACK_COOLDOWN_MS,
        max_speed: ratio(rng.range_inclusive(nominal - 500, nominal + 500), 1000),
    };
    for _ in 1..level {
        stats.hp = stats.hp.saturating_mul(LEVELUP_HP_FACTOR);
        stats.attack_damage = stats.attack_damage.saturating_mul(LEVELUP_ATTACK_DMG_FACTOR);
        stats.attack_cooldown *= Timer::from_num(LEVELUP_ATTACK_COOLDOWN_FACTOR);
    }
    match level {
        3 => {
            stats.attack_cooldown *= Timer::from_num(ratio(3, 2));
            stats.hp = stats.hp.saturating_mul(ratio(3, 2));
        }
        7 => {
            stats.max_speed *= 2;
            stats.hp /= 3;
        }
        10 => {
            stats.attack_damage = stats.attack_damage.saturating_mul(Fixed::const_from_int(2));
            stats.hp = stats.hp / 3 * 2;
        }
        13 => {
            stats.max_speed *= ratio(5, 2);
            stats.hp /= 2;
        }
        16 => {
            stats.max_speed /= 3;
            stats.hp = stats.hp.saturating_mul(Fixed::const_from_int(3));
        }
        18 => {
            stats.attack_damage /= 3;
            stats.hp = stats.hp.saturating_mul(Fixed::const_from_int(4));
        }
        _ => {}
    }
    stats
}

/// A creep of `level` at `position`.
#[must_use]
pub fn new_creep(id: EntityId, level: u32, position: Vec2Fixed, seed: u32) -> Entity {
    let mut character = Character::new(id, CharacterType::for_creep_level(level), position, seed);
    let stats = creep_stats(level, &mut character.rng);
    character.hp = stats.hp;
    character.max_hp = stats.hp;
    character.attack_damage = stats.attack_damage;
    character.base_attack_cooldown = stats.attack_cooldown;
    character.max_speed = stats.max_speed;
    Entity {
        character,
        role: Role::Creep(Box::new(CreepState::new(level))),
    }
}

/// The stationary guardian of a spawn zone.
#[must_use]
pub fn new_guard(id: EntityId, position: Vec2Fixed, seed: u32) -> Entity {
    let mut character = Character::new(id, CharacterType::Sheep, position, seed);
    character.hp = CREEP_SPAWN_POINT_HP;
    character.max_hp = CREEP_SPAWN_POINT_HP;
    Entity {
        character,
        role: Role::Guard,
    }
}

/// A scarecrow summoned with the given skill level.
#[must_use]
pub fn new_scarecrow(id: EntityId, position: Vec2Fixed, skill_level: u32, seed: u32) -> Entity {
    let mut character = Character::new(id, CharacterType::Scarecrow, position, seed);
    let extra = Fixed::from_num(skill_level.saturating_sub(1));
    let hp = ARCHER_SCARECROW_HP.saturating_add(ARCHER_SCARECROW_LEVELUP_EXTRA_HP.saturating_mul(extra));
    character.hp = hp;
    character.max_hp = hp;
    character.orientation = Orientation::S;
    Entity {
        character,
        role: Role::Ally,
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// One creep step: retarget, then attack or move, then the shared update.
///
/// # Errors
///
/// Returns [`GameError::InvalidState`] for a non-creep entity, or a
/// [`GameError::Geometry`] error from steering.
pub fn step_creep(entity: &mut Entity, ctx: &mut StepContext<'_>) -> Result<()> {
    {
        let Entity { character, role } = entity;
        let Role::Creep(creep) = role else {
            return Err(GameError::InvalidState(format!(
                "entity {} is not a creep",
                character.id
            )));
        };
        update_targets(character, creep, ctx);
        if character.has_attack_target() {
            attack(character, creep, ctx);
        } else {
            steer(character, creep, ctx)?;
        }
    }
    entity.step_character(ctx)
}

/// True once a living creep stands inside the goal zone.
#[must_use]
pub fn reached_goal(entity: &Entity, goal: &Rect) -> bool {
    !entity.character.is_dead() && goal.contains(entity.character.position)
}

fn within(ctx: &StepContext<'_>, from: Vec2Fixed, target: EntityId, range: Fixed) -> bool {
    ctx.position_of(target)
        .is_some_and(|p| p.distance_squared(from) <= range.saturating_mul(range))
}

fn update_targets(character: &mut Character, creep: &mut CreepState, ctx: &StepContext<'_>) {
    let disabled = character.has_condition(Condition::Immobile) || character.has_condition(Condition::Confused);
    let position = character.position;

    if character.has_attack_target()
        && (disabled || !within(ctx, position, character.attack_target, character.attack_range))
    {
        character.clear_attack_target();
    }
    if character.has_attack_target() {
        return;
    }

    if let Some(target) = creep.seek_target {
        if disabled || !within(ctx, position, target, creep.seek_range) {
            creep.seek_target = None;
        }
    }
    if disabled {
        return;
    }

    let attack_sq = character.attack_range.saturating_mul(character.attack_range);
    let seek_sq = creep.seek_range.saturating_mul(creep.seek_range);
    let scan = character.attack_range.max(creep.seek_range);
    let mut attack_candidates = Vec::new();
    let mut seek_candidates = Vec::new();
    for id in ctx.index.at_with_tolerance(position, scan) {
        let Some(other) = ctx.alive(id) else {
            continue;
        };
        if !other.is_player_or_ally() {
            continue;
        }
        let d2 = other.character.position.distance_squared(position);
        if d2 <= attack_sq {
            attack_candidates.push(id);
        } else if creep.seek_target.is_none() && d2 <= seek_sq {
            seek_candidates.push(id);
        }
    }

    if let Some(&target) = character.rng.pick(&attack_candidates) {
        character.attack_target = target;
    } else if let Some(&target) = character.rng.pick(&seek_candidates) {
        creep.seek_target = Some(target);
    }
}

fn attack(character: &mut Character, creep: &mut CreepState, ctx: &mut StepContext<'_>) {
    character.velocity = Vec2Fixed::ZERO;
    creep.steering = Steering::default();
    if character.attack_timer <= Timer::ZERO {
        character.attack_timer = character.attack_cooldown();
        ctx.harm(character.attack_target, character.attack_damage, character.id);
    } else {
        character.attack_timer -= STEP_TIMER;
    }
}

fn steer(character: &mut Character, creep: &mut CreepState, ctx: &mut StepContext<'_>) -> Result<()> {
    creep.steering = Steering::default();
    if character.has_condition(Condition::Immobile) {
        character.velocity = Vec2Fixed::ZERO;
        return Ok(());
    }

    let stuck = creep.stuck_counter.saturating_mul(STEP_MS) >= CREEP_STUCK_TIMER_MS;
    let desired = if stuck {
        creep.steering.wander = wander(character, creep)?;
        creep.steering.wander
    } else if character.has_condition(Condition::Confused) {
        creep.steering.wander = wander(character, creep)?;
        creep.steering.separation = separation(character, ctx)?;
        creep.steering.avoid = avoid_obstacles(character, ctx)?;
        creep.steering.wander
            + creep.steering.separation * SEPARATION_WEIGHT
            + creep.steering.avoid * AVOID_WEIGHT
    } else {
        match creep.seek_target.and_then(|t| ctx.position_of(t)) {
            Some(target) => creep.steering.seek = seek(character, target)?,
            None => {
                creep.steering.flow = follow_flow_field(character, ctx)?;
                creep.steering.wander = wander(character, creep)?;
            }
        }
        creep.steering.separation = separation(character, ctx)?;
        creep.steering.avoid = avoid_obstacles(character, ctx)?;
        let s = &creep.steering;
        s.seek * SEEK_WEIGHT
            + s.flow * FLOW_WEIGHT
            + s.wander
            + s.separation * SEPARATION_WEIGHT
            + s.avoid * AVOID_WEIGHT
    };

    character.velocity = desired.clip_length(character.max_speed, MOVEMENT_DEAD_ZONE);
    match character.next_position(ctx.world, ctx.index) {
        Some(next) => {
            creep.stuck_counter = 0;
            if ctx.world.creep_goal().contains(next) {
                ctx.index.remove(character.id, character.position, character.radius);
            } else {
                ctx.index
                    .update(character.id, character.position, next, character.radius);
            }
            character.position = next;
        }
        None => {
            character.velocity = Vec2Fixed::ZERO;
            creep.stuck_counter = creep.stuck_counter.saturating_add(1);
        }
    }
    Ok(())
}

fn seek(character: &Character, target: Vec2Fixed) -> Result<Vec2Fixed> {
    (target - character.position).set_length(character.max_speed)
}

fn follow_flow_field(character: &Character, ctx: &StepContext<'_>) -> Result<Vec2Fixed> {
    match ctx.world.flow_at(character.position) {
        Some(direction) => direction.direction().set_length(character.max_speed),
        None => Ok(Vec2Fixed::ZERO),
    }
}

fn wander(character: &mut Character, creep: &mut CreepState) -> Result<Vec2Fixed> {
    let ahead = character.velocity.normalize() * (character.radius * WANDER_OFFSET_FACTOR);
    let center = character.position + ahead;
    if character.velocity.is_zero() {
        creep.wander_angle = ratio(character.rng.range_inclusive(0, 1000), 1000) * Fixed::TAU;
    } else {
        let jitter = character.rng.range_inclusive(0, 1000) - character.rng.range_inclusive(0, 1000);
        creep.wander_angle += ratio(jitter, 1000);
        if creep.wander_angle < Fixed::ZERO {
            creep.wander_angle += Fixed::TAU;
        } else if creep.wander_angle >= Fixed::TAU {
            creep.wander_angle -= Fixed::TAU;
        }
    }
    seek(character, center + Vec2Fixed::from_angle(creep.wander_angle) * character.radius)
}

fn separation(character: &Character, ctx: &StepContext<'_>) -> Result<Vec2Fixed> {
    let heading = character.velocity.normalize();
    let mut push = Vec2Fixed::ZERO;
    let mut count = 0;
    for id in ctx.index.at_with_tolerance(character.position, SEPARATION_TOLERANCE) {
        if id == character.id {
            continue;
        }
        let Some(other) = ctx.alive(id) else {
            continue;
        };
        if other.is_player_or_ally() {
            continue;
        }
        let to = other.character.position - character.position;
        if to.dot(heading) < Fixed::ZERO {
            continue;
        }
        let d2 = to.length_squared();
        if d2 < SEPARATION_THRESHOLD_SQ {
            let strength = character.max_speed * ((SEPARATION_THRESHOLD_SQ - d2) / 2);
            push += -to.normalize() * strength;
            count += 1;
        }
    }
    if count == 0 {
        return Ok(Vec2Fixed::ZERO);
    }
    Ok((push / Fixed::from_num(count)).clip_length(character.max_speed, Fixed::ZERO))
}

fn avoid_obstacles(character: &Character, ctx: &StepContext<'_>) -> Result<Vec2Fixed> {
    let heading = character.velocity.normalize();
    match ctx
        .world
        .line_of_sight_check(character.position, heading, AVOID_OBSTACLES_CHECK_LENGTH)
    {
        Some(hit) => seek(character, hit.position + hit.normal.set_length(AVOID_OBSTACLES_DISTANCE)?),
        None => Ok(Vec2Fixed::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BehaviorState, PlayerClass};
    use crate::math::millis;
    use crate::player::new_player;
    use crate::spatial::SpatialIndex;
    use crate::world::{WorldDescription, WorldMap};
    use std::collections::BTreeMap;

    struct Arena {
        world: WorldMap,
        index: SpatialIndex,
        others: BTreeMap<EntityId, Entity>,
        credits: Vec<KillCredit>,
    }

    impl Arena {
        fn new(description: WorldDescription) -> Self {
            let index = SpatialIndex::new(description.width, description.height);
            Self {
                world: WorldMap::new(description).unwrap(),
                index,
                others: BTreeMap::new(),
                credits: Vec::new(),
            }
        }

        fn add(&mut self, entity: Entity) {
            self.index
                .insert(entity.id(), entity.character.position, entity.character.radius);
            self.others.insert(entity.id(), entity);
        }

        fn step(&mut self, entity: &mut Entity) {
            let mut ctx = StepContext {
                world: &self.world,
                index: &mut self.index,
                others: &mut self.others,
                credits: &mut self.credits,
            };
            step_creep(entity, &mut ctx).unwrap();
        }
    }

    fn at(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    fn spawned(arena: &mut Arena, id: EntityId, position: Vec2Fixed) -> Entity {
        let creep = new_creep(id, 1, position, 77);
        arena
            .index
            .insert(id, creep.character.position, creep.character.radius);
        creep
    }

    #[test]
    fn test_stats_scale_with_level() {
        let mut rng = SeededRandom::new(1);
        let one = creep_stats(1, &mut rng);
        let two = creep_stats(2, &mut rng);
        assert_eq!(one.hp, CREEP_INITIAL_HP);
        assert!(two.hp > one.hp);
        assert!(two.attack_damage > one.attack_damage);
        assert!(two.attack_cooldown < one.attack_cooldown);
        assert!(one.max_speed >= ratio(3, 2) && one.max_speed <= ratio(5, 2));
    }

    #[test]
    fn test_special_level_seven_is_fast_and_frail() {
        let mut a = SeededRandom::new(9);
        let mut b = SeededRandom::new(9);
        let six = creep_stats(6, &mut a);
        let seven = creep_stats(7, &mut b);
        assert!(seven.max_speed >= ratio(3, 1));
        assert!(seven.hp < six.hp);
    }

    #[test]
    fn test_creep_follows_flow_toward_goal() {
        let mut arena = Arena::new(WorldDescription::open_field(20, 10));
        let mut creep = spawned(&mut arena, 10, at(15.5, 5.5));
        let start = creep.character.position;
        for _ in 0..40 {
            arena.step(&mut creep);
        }
        assert!(creep.character.position.x < start.x);
        assert!(arena.index.is_alive(10));
    }

    #[test]
    fn test_creep_picks_player_in_attack_range() {
        let mut arena = Arena::new(WorldDescription::open_field(20, 10));
        arena.add(new_player(0, PlayerClass::Knight, "p", at(10.0, 5.0), 1));
        let mut creep = spawned(&mut arena, 10, at(10.8, 5.0));

        arena.step(&mut creep);

        assert_eq!(creep.character.attack_target, 0);
        assert_eq!(creep.character.velocity, Vec2Fixed::ZERO);
        assert_eq!(creep.character.state, BehaviorState::Attack);
        assert!(arena.others[&0].character.hp < arena.others[&0].character.max_hp);
    }

    #[test]
    fn test_creep_seeks_player_in_seek_range() {
        let mut arena = Arena::new(WorldDescription::open_field(20, 10));
        arena.add(new_player(0, PlayerClass::Knight, "p", at(10.0, 5.0), 1));
        let mut creep = spawned(&mut arena, 10, at(13.0, 5.0));

        arena.step(&mut creep);

        assert_eq!(creep.as_creep().unwrap().seek_target, Some(0));
        assert!(!creep.character.has_attack_target());
        assert!(creep.character.position.x < Fixed::from_num(13));
    }

    #[test]
    fn test_confused_creep_ignores_players() {
        let mut arena = Arena::new(WorldDescription::open_field(20, 10));
        arena.add(new_player(0, PlayerClass::Knight, "p", at(10.0, 5.0), 1));
        let mut creep = spawned(&mut arena, 10, at(10.8, 5.0));
        creep
            .character
            .give_condition(Condition::Confused, millis(1000), 0, Fixed::ZERO)
            .unwrap();

        arena.step(&mut creep);

        assert!(!creep.character.has_attack_target());
        assert_eq!(creep.as_creep().unwrap().seek_target, None);
    }

    #[test]
    fn test_immobile_creep_stays_put() {
        let mut arena = Arena::new(WorldDescription::open_field(20, 10));
        let mut creep = spawned(&mut arena, 10, at(15.5, 5.5));
        creep
            .character
            .give_condition(Condition::Immobile, millis(1000), 0, Fixed::ZERO)
            .unwrap();
        arena.step(&mut creep);
        assert_eq!(creep.character.position, at(15.5, 5.5));
    }

    #[test]
    fn test_blocked_creep_counts_stuck_steps() {
        let description = WorldDescription::open_field(20, 10).with_obstacle(Rect::from_ints(14, 0, 1, 10));
        let mut arena = Arena::new(description);
        let mut creep = spawned(&mut arena, 10, at(15.05, 5.5));
        creep.character.max_speed = Fixed::from_num(2);
        for _ in 0..5 {
            arena.step(&mut creep);
        }
        assert!(creep.as_creep().unwrap().stuck_counter > 0);
        assert!(creep.character.position.x >= Fixed::from_num(15));
    }

    #[test]
    fn test_creep_entering_goal_leaves_index() {
        let mut arena = Arena::new(WorldDescription::open_field(20, 10));
        let mut creep = spawned(&mut arena, 10, at(1.05, 5.5));
        for _ in 0..10 {
            arena.step(&mut creep);
            if reached_goal(&creep, arena.world.creep_goal()) {
                break;
            }
        }
        assert!(reached_goal(&creep, arena.world.creep_goal()));
        assert!(!arena.index.is_alive(10));
    }

    #[test]
    fn test_non_player_damage_dilutes_credit() {
        let mut state = CreepState::new(1);
        state.record_damage(1, Fixed::from_num(10));
        state.record_damage(42, Fixed::from_num(10));
        let credits = state.kill_credits();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].fraction, Fixed::from_num(0.5));
        assert_eq!(state.damage_by(1), Fixed::from_num(10));
    }

    #[test]
    fn test_scarecrow_hp_grows_with_level() {
        let one = new_scarecrow(20, Vec2Fixed::ZERO, 1, 1);
        let three = new_scarecrow(21, Vec2Fixed::ZERO, 3, 1);
        assert_eq!(one.character.hp, ARCHER_SCARECROW_HP);
        assert!(three.character.hp > one.character.hp);
        assert!(three.is_player_or_ally());
        assert_eq!(three.character.orientation, Orientation::S);
    }
}

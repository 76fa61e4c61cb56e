//! Gameplay tuning constants.
//!
//! Every participant must run with the same values, so these are compiled in
//! rather than loaded. Lengths are in map cells, timers in milliseconds.

use crate::math::{millis, ratio, Fixed, Timer};

// ============================================================================
// Simulation clock
// ============================================================================

/// Duration of one simulation step in milliseconds.
pub const STEP_MS: u32 = 50;

/// Simulation steps per second.
pub const TICK_RATE: u32 = 1000 / STEP_MS;

/// Duration of one step as a millisecond timer.
pub const STEP_TIMER: Timer = millis(STEP_MS as i32);

/// Duration of one step in seconds.
pub const STEP_SEC: Fixed = ratio(STEP_MS as i32, 1000);

// ============================================================================
// Match
// ============================================================================

/// Maximum number of participants. Player IDs are `0..MAX_NUM_PLAYERS`.
pub const MAX_NUM_PLAYERS: u32 = 4;

/// Lives at match start. Each creep reaching the goal costs one.
pub const MAX_LIVES: u32 = 10;

/// Number of creep spawn zones, each guarded by one guard.
pub const NUM_SPAWN_ZONES: usize = 3;

/// Sample count for spawn position searches.
pub const SPAWN_TRIALS: u32 = 10;

/// Largest accepted map edge. Keeps squared map distances inside [`Fixed`].
pub const MAX_MAP_DIMENSION: u32 = 100;

// ============================================================================
// Characters
// ============================================================================

/// Ground radius of every character.
pub const DEFAULT_CHARACTER_RADIUS: Fixed = ratio(35, 100);

/// Melee attack range.
pub const DEFAULT_CHARACTER_ATTACK_RANGE: Fixed = Fixed::ONE;

/// Damage multiplier while IMMUNE_TO_DAMAGE is active.
pub const IMMUNE_DAMAGE_FACTOR: Fixed = ratio(1, 5);

/// Speed above which a moving character runs instead of walking.
pub const RUN_SPEED_THRESHOLD: Fixed = Fixed::const_from_int(3);

/// Speeds at or below this count as standing still.
pub const MOVEMENT_DEAD_ZONE: Fixed = ratio(1, 100);

/// Steps a Hit or Spell state holds before movement states may replace it.
pub const STATE_HOLD_STEPS: u32 = 6;

/// Steps after death until a corpse is discarded.
pub const DEATH_ANIMATION_STEPS: u32 = 20;

/// HP multiplier per level gained.
pub const LEVELUP_HP_FACTOR: Fixed = ratio(11, 10);

/// MP multiplier per level gained.
pub const LEVELUP_MP_FACTOR: Fixed = ratio(11, 10);

/// Attack cooldown multiplier per level gained.
pub const LEVELUP_ATTACK_COOLDOWN_FACTOR: Fixed = ratio(95, 100);

/// Attack damage multiplier per level gained.
pub const LEVELUP_ATTACK_DMG_FACTOR: Fixed = ratio(11, 10);

// ============================================================================
// Creeps
// ============================================================================

/// Nominal creep speed in cells per second, jittered by ±0.5 per creep.
pub const DEFAULT_CREEP_MAX_MOVEMENT_PER_SEC: i32 = 2;

/// HP of a level 1 creep.
pub const CREEP_INITIAL_HP: Fixed = Fixed::const_from_int(30);

/// Attack cooldown of a level 1 creep.
pub const CREEP_INITIAL_ATTACK_COOLDOWN_MS: Timer = millis(1000);

/// Attack damage of a level 1 creep.
pub const CREEP_INITIAL_ATTACK_DMG: Fixed = Fixed::const_from_int(5);

/// Radius in which creeps notice and chase players.
pub const DEFAULT_CREEP_SEEK_RANGE: Fixed = Fixed::const_from_int(5);

/// Blocked time after which a creep only wanders.
pub const CREEP_STUCK_TIMER_MS: u32 = 1000;

/// Spawn interval of the first spawn zone, divided by the participant count.
pub const CREEP_SPAWN_COOLDOWN_MS: u32 = 6000;

/// Minute at which the second spawn zone activates.
pub const CREEP_SPAWN_POINT_2_ACTIVATE_MIN: u32 = 5;

/// Minute at which the third spawn zone activates.
pub const CREEP_SPAWN_POINT_3_ACTIVATE_MIN: u32 = 10;

/// Seconds per creep level.
pub const CREEP_SPAWN_NEXT_LEVEL_SEC: u32 = 60;

/// HP of a spawn-zone guard.
pub const CREEP_SPAWN_POINT_HP: Fixed = Fixed::const_from_int(500);

/// Gold and XP shared among the attackers of a killed creep.
pub const XP_GOLD_PER_KILLED_CREEP: Fixed = Fixed::const_from_int(100);

/// Steering: wander circle offset in ground radii.
pub const WANDER_OFFSET_FACTOR: Fixed = ratio(21, 10);

/// Steering: squared distance below which neighbours repel.
pub const SEPARATION_THRESHOLD_SQ: Fixed = Fixed::const_from_int(2);

/// Steering: neighbour search tolerance for separation.
pub const SEPARATION_TOLERANCE: Fixed = Fixed::ONE;

/// Steering: obstacle probe length.
pub const AVOID_OBSTACLES_CHECK_LENGTH: Fixed = ratio(3, 2);

/// Steering: distance kept from a probed obstacle.
pub const AVOID_OBSTACLES_DISTANCE: Fixed = ratio(1, 2);

// ============================================================================
// Players
// ============================================================================

/// Player movement speed in cells per second.
pub const PLAYER_INITIAL_MAX_MOVEMENT_PER_SEC: Fixed = ratio(7, 2);

/// Time from death to respawn.
pub const PLAYER_RESPAWN_MS: Timer = millis(10_000);

/// Percentage of max MP regained per second everywhere.
pub const PLAYER_MAX_MP_PERCENTAGE_REGEN_SEC: i32 = 1;

/// Percentage of max HP regained per second inside the healing zone.
pub const HEALING_ZONE_MAX_HP_PERCENTAGE_REGEN_SEC: i32 = 5;

/// Percentage of max MP regained per second inside the healing zone.
pub const HEALING_ZONE_MAX_MP_PERCENTAGE_REGEN_SEC: i32 = 5;

/// Highest player level. Keeps the XP threshold inside [`Fixed`] range.
pub const MAX_PLAYER_LEVEL: u32 = 30;

/// XP needed per current level to reach the next one.
pub const XP_PER_LEVEL: u32 = 1000;

/// Base cooldown of every skill slot.
pub const PLAYER_SKILL_BASE_COOLDOWN_MS: Timer = millis(10_000);

/// Base stats of a player class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassStats {
    /// Initial max HP.
    pub hp: Fixed,
    /// Initial max MP.
    pub mp: Fixed,
    /// Initial attack damage.
    pub attack_damage: Fixed,
    /// Initial attack cooldown.
    pub attack_cooldown: Timer,
    /// Attack range.
    pub attack_range: Fixed,
}

/// Knight base stats.
pub const KNIGHT_STATS: ClassStats = ClassStats {
    hp: Fixed::const_from_int(120),
    mp: Fixed::const_from_int(50),
    attack_damage: Fixed::const_from_int(10),
    attack_cooldown: millis(1000),
    attack_range: Fixed::ONE,
};

/// Archer base stats.
pub const ARCHER_STATS: ClassStats = ClassStats {
    hp: Fixed::const_from_int(80),
    mp: Fixed::const_from_int(60),
    attack_damage: Fixed::const_from_int(8),
    attack_cooldown: millis(1000),
    attack_range: Fixed::const_from_int(5),
};

/// Mage base stats.
pub const MAGE_STATS: ClassStats = ClassStats {
    hp: Fixed::const_from_int(70),
    mp: Fixed::const_from_int(100),
    attack_damage: Fixed::const_from_int(12),
    attack_cooldown: millis(1500),
    attack_range: Fixed::const_from_int(4),
};

/// Monk base stats.
pub const MONK_STATS: ClassStats = ClassStats {
    hp: Fixed::const_from_int(90),
    mp: Fixed::const_from_int(80),
    attack_damage: Fixed::const_from_int(6),
    attack_cooldown: millis(1000),
    attack_range: Fixed::const_from_int(3),
};

// ============================================================================
// Skills
// ============================================================================

/// Archer: damage factor when a player or ally stands near the target.
pub const ARCHER_DISTRACTION_DMG_FACTOR: Fixed = ratio(3, 2);
/// Archer: distraction factor added per skill level.
pub const ARCHER_DISTRACTION_LEVELUP_DMG_FACTOR_ADD: Fixed = ratio(1, 4);
/// Archer: how close the distracting ally must be to the target.
pub const ARCHER_DISTRACTION_MAX_DISTANCE_TO_ALLY: Fixed = Fixed::const_from_int(2);
/// Archer: multi arrow radius.
pub const ARCHER_MULTIARROW_RADIUS: Fixed = Fixed::const_from_int(2);
/// Archer: cold arrow immobilization.
pub const ARCHER_COLDARROW_MS: i32 = 3000;
/// Archer: cold arrow extra time per level.
pub const ARCHER_COLDARROW_LEVELUP_EXTRA_MS: i32 = 1000;
/// Archer: scarecrow HP.
pub const ARCHER_SCARECROW_HP: Fixed = Fixed::const_from_int(100);
/// Archer: scarecrow HP per level.
pub const ARCHER_SCARECROW_LEVELUP_EXTRA_HP: Fixed = Fixed::const_from_int(50);
/// Archer: poison vial radius.
pub const ARCHER_POISON_VIAL_RADIUS: Fixed = Fixed::const_from_int(2);
/// Archer: poison duration.
pub const ARCHER_POISON_VIAL_MS: i32 = 5000;
/// Archer: poison duration per level.
pub const ARCHER_POISON_VIAL_LEVELUP_EXTRA_MS: i32 = 1000;
/// Archer: poison damage per second.
pub const ARCHER_POISON_VIAL_DMG_PER_SEC: Fixed = Fixed::const_from_int(5);
/// Archer: poison damage per second per level.
pub const ARCHER_POISON_VIAL_LEVELUP_EXTRA_DMG: Fixed = Fixed::const_from_int(2);

/// Knight: tank duration.
pub const KNIGHT_TANK_MS: i32 = 5000;
/// Knight: tank duration per level.
pub const KNIGHT_TANK_LEVELUP_EXTRA_MS: i32 = 1000;
/// Knight: carnage radius.
pub const KNIGHT_CARNAGE_RADIUS: Fixed = Fixed::const_from_int(2);
/// Knight: carnage radius per level.
pub const KNIGHT_CARNAGE_EXTRA_RADIUS: Fixed = ratio(1, 2);
/// Knight: might damage factor.
pub const KNIGHT_MIGHT_FACTOR: Fixed = Fixed::const_from_int(3);
/// Knight: might damage factor per level.
pub const KNIGHT_MIGHT_LEVELUP_EXTRA_FACTOR: Fixed = ratio(1, 2);
/// Knight: rage duration.
pub const KNIGHT_RAGE_MS: i32 = 5000;
/// Knight: rage duration per level.
pub const KNIGHT_RAGE_LEVELUP_EXTRA_MS: i32 = 1000;
/// Knight: attack cooldown multiplier while ENRAGED.
pub const KNIGHT_RAGE_ATTACK_COOLDOWN_FACTOR: Fixed = ratio(1, 2);

/// Mage: fireball damage factor.
pub const MAGE_FIREBALL_FACTOR: Fixed = Fixed::const_from_int(3);
/// Mage: fireball damage factor per level.
pub const MAGE_FIREBALL_LEVELUP_EXTRA_FACTOR: Fixed = ratio(1, 2);
/// Mage: death zone radius.
pub const MAGE_DEATHZONE_RADIUS: Fixed = Fixed::const_from_int(2);
/// Mage: death zone duration.
pub const MAGE_DEATHZONE_MS: i32 = 5000;
/// Mage: death zone duration per level.
pub const MAGE_DEATHZONE_LEVELUP_EXTRA_MS: i32 = 1000;
/// Mage: death zone damage relative to the regular attack rate.
pub const MAGE_DEATHZONE_FACTOR: Fixed = Fixed::ONE;
/// Mage: cooldown multiplier of the death zone slot.
pub const MAGE_DEATHZONE_COOLDOWN_FACTOR: i32 = 2;
/// Mage: ice bomb radius.
pub const MAGE_ICEBOMB_RADIUS: Fixed = Fixed::const_from_int(2);
/// Mage: ice bomb damage factor.
pub const MAGE_ICEBOMB_FACTOR: Fixed = Fixed::ONE;
/// Mage: ice bomb immobilization.
pub const MAGE_ICEBOMB_MS: i32 = 2000;
/// Mage: ice bomb immobilization per level.
pub const MAGE_ICEBOMB_EXTRA_MS: i32 = 1000;
/// Mage: confuse radius.
pub const MAGE_CONFUSE_RADIUS: Fixed = ratio(5, 2);
/// Mage: confuse duration.
pub const MAGE_CONFUSE_MS: i32 = 4000;
/// Mage: confuse duration per level.
pub const MAGE_CONFUSE_LEVELUP_EXTRA_MS: i32 = 1000;

/// Monk: heal amount.
pub const MONK_HEAL_HP: Fixed = Fixed::const_from_int(40);
/// Monk: heal amount per level.
pub const MONK_HEAL_LEVELUP_EXTRA_HP: Fixed = Fixed::const_from_int(20);
/// Monk: XP for healing.
pub const MONK_HEAL_XP: Fixed = Fixed::const_from_int(20);
/// Monk: death zone radius.
pub const MONK_DEATHZONE_RADIUS: Fixed = Fixed::const_from_int(2);
/// Monk: death zone duration.
pub const MONK_DEATHZONE_MS: i32 = 5000;
/// Monk: death zone duration per level.
pub const MONK_DEATHZONE_LEVELUP_EXTRA_MS: i32 = 1000;
/// Monk: death zone damage relative to the regular attack rate.
pub const MONK_DEATHZONE_FACTOR: Fixed = Fixed::ONE;
/// Monk: cooldown multiplier of the death zone slot.
pub const MONK_DEATHZONE_COOLDOWN_FACTOR: i32 = 2;
/// Monk: mass heal amount.
pub const MONK_MASS_HEAL_HP: Fixed = Fixed::const_from_int(30);
/// Monk: mass heal amount per level.
pub const MONK_MASS_HEAL_LEVELUP_EXTRA_HP: Fixed = Fixed::const_from_int(15);
/// Monk: XP for mass healing.
pub const MONK_MASS_HEAL_XP: Fixed = Fixed::const_from_int(50);

// ============================================================================
// Items
// ============================================================================

/// HP restored by an HP potion.
pub const ITEM_HP_POTION_HP_GAIN: Fixed = Fixed::const_from_int(50);
/// MP restored by an MP potion.
pub const ITEM_MP_POTION_MP_GAIN: Fixed = Fixed::const_from_int(50);
/// Max HP added by a tome of health.
pub const ITEM_HP_TOME_MAX_HP_INCREASE: Fixed = Fixed::const_from_int(20);
/// Max MP added by a tome of magic.
pub const ITEM_MP_TOME_MAX_MP_INCREASE: Fixed = Fixed::const_from_int(20);
/// XP granted by a tome of experience.
pub const ITEM_XP_TOME_XP_GAIN: Fixed = Fixed::const_from_int(500);
/// Speed added by a tome of speed.
pub const ITEM_MOVEMENT_TOME_MOVEMENT_GAIN: Fixed = ratio(1, 2);
/// Attack cooldown multiplier of a tome of agility.
pub const ITEM_ATTACK_COOLDOWN_TOME_FACTOR: Fixed = ratio(9, 10);
/// Attack damage multiplier of a tome of might.
pub const ITEM_ATTACK_DAMAGE_TOME_FACTOR: Fixed = ratio(11, 10);
/// Skill cooldown multiplier of a tome of skills.
pub const ITEM_SKILL_COOLDOWN_TOME_FACTOR: Fixed = ratio(9, 10);

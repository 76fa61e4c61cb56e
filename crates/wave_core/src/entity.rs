//! Entity data shared by every participant of a match.
//!
//! An [`Entity`] is a [`Character`] (position, health, attack stats,
//! conditions, behavior state) tagged with a [`Role`] that carries the
//! role-specific state of players, creeps, guards and allies.

use serde::{Deserialize, Serialize};

use crate::creep_ai::CreepState;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, timer_serde, Fixed, Orientation, Timer, Vec2Fixed};
use crate::player::PlayerState;
use crate::rng::SeededRandom;
use crate::tuning::{
    DEFAULT_CHARACTER_ATTACK_RANGE, DEFAULT_CHARACTER_RADIUS, DEATH_ANIMATION_STEPS,
    KNIGHT_RAGE_ATTACK_COOLDOWN_FACTOR, STATE_HOLD_STEPS, STEP_TIMER,
};

/// Unique identifier for entities.
///
/// Players use `0..MAX_NUM_PLAYERS` in join order; every other entity gets
/// the next value of a strictly increasing counter.
pub type EntityId = u32;

// ============================================================================
// Conditions
// ============================================================================

/// Timed status effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    /// Cannot move.
    Immobile,
    /// Incoming damage is reduced to a fifth.
    ImmuneToDamage,
    /// Creeps wander aimlessly and pick no targets.
    Confused,
    /// Attack cooldown is shortened.
    Enraged,
    /// Loses HP every step, credited to the poisoner.
    Poisoned,
}

impl Condition {
    /// All conditions in table order.
    pub const ALL: [Self; 5] = [
        Self::Immobile,
        Self::ImmuneToDamage,
        Self::Confused,
        Self::Enraged,
        Self::Poisoned,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Immobile => 0,
            Self::ImmuneToDamage => 1,
            Self::Confused => 2,
            Self::Enraged => 3,
            Self::Poisoned => 4,
        }
    }
}

/// One row of the condition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConditionSlot {
    /// Time left; zero means inactive.
    #[serde(with = "timer_serde")]
    pub remaining: Timer,
    /// Who applied the condition.
    pub attacker: EntityId,
    /// Damage per second for POISONED, unused otherwise.
    #[serde(with = "fixed_serde")]
    pub payload: Fixed,
}

/// Condition table with one slot per [`Condition`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Conditions {
    slots: [ConditionSlot; 5],
}

impl Conditions {
    /// True while the condition's timer is running.
    #[must_use]
    pub fn has(&self, condition: Condition) -> bool {
        self.slots[condition.index()].remaining > Timer::ZERO
    }

    /// Slot of a condition.
    #[must_use]
    pub fn slot(&self, condition: Condition) -> &ConditionSlot {
        &self.slots[condition.index()]
    }

    /// Overwrite a condition. Durations do not stack.
    pub fn set(&mut self, condition: Condition, duration: Timer, attacker: EntityId, payload: Fixed) {
        self.slots[condition.index()] = ConditionSlot {
            remaining: duration,
            attacker,
            payload,
        };
    }

    /// Count every timer down by one step, clamping at zero.
    pub fn tick(&mut self) {
        for slot in &mut self.slots {
            slot.remaining = (slot.remaining - STEP_TIMER).max(Timer::ZERO);
        }
    }

    /// Clear every condition.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.remaining = Timer::ZERO;
        }
    }

    /// Active conditions in table order.
    pub fn active(&self) -> impl Iterator<Item = Condition> + '_ {
        Condition::ALL.into_iter().filter(|c| self.has(*c))
    }
}

// ============================================================================
// Behavior state
// ============================================================================

/// Coarse activity of a character, consumed by presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviorState {
    /// Standing still.
    #[default]
    Stop,
    /// Moving slowly.
    Walk,
    /// Moving fast.
    Run,
    /// Attacking a target.
    Attack,
    /// Just got hit by a skill.
    Hit,
    /// Casting a skill.
    Spell,
    /// Dead or dying.
    Die,
}

// ============================================================================
// Character kinds
// ============================================================================

/// Playable classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerClass {
    /// Melee tank.
    Knight,
    /// Ranged damage, summons scarecrows.
    Archer,
    /// Area damage and crowd control.
    Mage,
    /// Healer.
    Monk,
}

impl PlayerClass {
    /// All classes.
    pub const ALL: [Self; 4] = [Self::Knight, Self::Archer, Self::Mage, Self::Monk];

    /// Character kind of this class.
    #[must_use]
    pub const fn character_type(self) -> CharacterType {
        match self {
            Self::Knight => CharacterType::Knight,
            Self::Archer => CharacterType::Archer,
            Self::Mage => CharacterType::Mage,
            Self::Monk => CharacterType::Monk,
        }
    }
}

/// Kind tag selecting sprite sets and creep variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum CharacterType {
    Knight,
    Archer,
    Mage,
    Monk,
    Wolf,
    Gnome,
    Ogre,
    Ghost,
    Zombie,
    Orc,
    Spider,
    Dino,
    BlueKnight,
    Crocodile,
    GreenZombie,
    GreenDwarf,
    Bat,
    RedKnight,
    GreenDino,
    DarkDwarf,
    GreenKnight,
    PinkZombie,
    BlackKnight,
    /// Spawn-zone guard.
    Sheep,
    /// Player-summoned ally.
    Scarecrow,
}

impl CharacterType {
    /// Creep kind spawned at `level`. Levels past 18 all use the final kind.
    #[must_use]
    pub const fn for_creep_level(level: u32) -> Self {
        match level {
            0 | 1 => Self::Wolf,
            2 => Self::Gnome,
            3 => Self::Ogre,
            4 => Self::Ghost,
            5 => Self::Zombie,
            6 => Self::Orc,
            7 => Self::Spider,
            8 => Self::Dino,
            9 => Self::BlueKnight,
            10 => Self::Crocodile,
            11 => Self::GreenZombie,
            12 => Self::GreenDwarf,
            13 => Self::Bat,
            14 => Self::RedKnight,
            15 => Self::GreenDino,
            16 => Self::DarkDwarf,
            17 => Self::GreenKnight,
            18 => Self::PinkZombie,
            _ => Self::BlackKnight,
        }
    }

    /// Human readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Knight => "Knight",
            Self::Archer => "Archer",
            Self::Mage => "Mage",
            Self::Monk => "Monk",
            Self::Wolf => "Wolf",
            Self::Gnome => "Gnome",
            Self::Ogre => "Ogre",
            Self::Ghost => "Ghost",
            Self::Zombie => "Zombie",
            Self::Orc => "Orc",
            Self::Spider => "Spider",
            Self::Dino => "Dino",
            Self::BlueKnight => "Ice Knight",
            Self::Crocodile => "Crocodile",
            Self::GreenZombie => "Acid Zombie",
            Self::GreenDwarf => "Dwarf",
            Self::Bat => "Bat",
            Self::RedKnight => "Fire Knight",
            Self::GreenDino => "Dino King",
            Self::DarkDwarf => "Evil Dwarf",
            Self::GreenKnight => "Vanguard",
            Self::PinkZombie => "Zombie King",
            Self::BlackKnight => "Executioner",
            Self::Sheep => "Guardian",
            Self::Scarecrow => "Scarecrow",
        }
    }
}

// ============================================================================
// Character
// ============================================================================

/// State common to every entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Character {
    /// Unique ID.
    pub id: EntityId,
    /// Kind tag.
    pub kind: CharacterType,
    /// Map position.
    pub position: Vec2Fixed,
    /// Velocity in cells per second.
    pub velocity: Vec2Fixed,
    /// Ground circle radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Current HP.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Maximum HP.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Attack reach.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Damage per attack.
    #[serde(with = "fixed_serde")]
    pub attack_damage: Fixed,
    /// Time between attacks, before ENRAGED.
    #[serde(with = "timer_serde")]
    pub base_attack_cooldown: Timer,
    /// Time until the next attack may land.
    #[serde(with = "timer_serde")]
    pub attack_timer: Timer,
    /// Attack target; the own ID means none.
    pub attack_target: EntityId,
    /// Speed limit in cells per second.
    #[serde(with = "fixed_serde")]
    pub max_speed: Fixed,
    /// Timed status effects.
    pub conditions: Conditions,
    /// Current behavior state.
    pub state: BehaviorState,
    /// Steps spent in the current state.
    pub state_steps: u32,
    /// Facing.
    pub orientation: Orientation,
    /// Private random stream.
    pub rng: SeededRandom,
}

impl Character {
    /// A character with default radius, range and 30 HP, facing west.
    #[must_use]
    pub fn new(id: EntityId, kind: CharacterType, position: Vec2Fixed, seed: u32) -> Self {
        let hp = Fixed::const_from_int(30);
        Self {
            id,
            kind,
            position,
            velocity: Vec2Fixed::ZERO,
            radius: DEFAULT_CHARACTER_RADIUS,
            hp,
            max_hp: hp,
            attack_range: DEFAULT_CHARACTER_ATTACK_RANGE,
            attack_damage: Fixed::ZERO,
            base_attack_cooldown: Timer::ZERO,
            attack_timer: Timer::ZERO,
            attack_target: id,
            max_speed: Fixed::ZERO,
            conditions: Conditions::default(),
            state: BehaviorState::Stop,
            state_steps: 0,
            orientation: Orientation::W,
            rng: SeededRandom::new(seed),
        }
    }

    /// HP has reached zero.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.hp <= Fixed::ZERO
    }

    /// An attack target is set.
    #[must_use]
    pub fn has_attack_target(&self) -> bool {
        self.attack_target != self.id
    }

    /// Drop the attack target.
    pub fn clear_attack_target(&mut self) {
        self.attack_target = self.id;
    }

    /// Shorthand for a condition check.
    #[must_use]
    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.has(condition)
    }

    /// Effective attack cooldown, shortened while ENRAGED.
    #[must_use]
    pub fn attack_cooldown(&self) -> Timer {
        if self.has_condition(Condition::Enraged) {
            self.base_attack_cooldown * Timer::from_num(KNIGHT_RAGE_ATTACK_COOLDOWN_FACTOR)
        } else {
            self.base_attack_cooldown
        }
    }

    /// Circle overlap test against this character's ground circle.
    #[must_use]
    pub fn collides_with_circle(&self, center: Vec2Fixed, radius: Fixed) -> bool {
        let reach = self.radius + radius;
        self.position.distance_squared(center) < reach * reach
    }

    /// Switch behavior state.
    ///
    /// Die is sticky while dead. Hit and Spell hold for a few steps before a
    /// movement or attack state may replace them.
    pub fn set_state(&mut self, state: BehaviorState) {
        if self.state == BehaviorState::Die && self.is_dead() {
            return;
        }
        let held = matches!(self.state, BehaviorState::Hit | BehaviorState::Spell);
        let replaceable = matches!(
            state,
            BehaviorState::Run | BehaviorState::Walk | BehaviorState::Stop | BehaviorState::Attack
        );
        if held && replaceable && self.state_steps < STATE_HOLD_STEPS {
            return;
        }
        if self.state != state {
            self.state_steps = 0;
        }
        self.state = state;
    }

    /// Whether the corpse has finished dying and can be discarded.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] unless the character is in the
    /// Die state.
    pub fn death_animation_complete(&self) -> Result<bool> {
        if self.state != BehaviorState::Die {
            return Err(GameError::Precondition(format!(
                "entity {} is not dying",
                self.id
            )));
        }
        Ok(self.state_steps >= DEATH_ANIMATION_STEPS)
    }

    /// Point the character towards `direction`.
    pub fn face(&mut self, direction: Vec2Fixed) -> Result<()> {
        if !direction.is_zero() {
            self.orientation = Orientation::from_vector(direction)?;
        }
        Ok(())
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Role-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// A participant's avatar.
    Player(Box<PlayerState>),
    /// An autonomous attacker.
    Creep(Box<CreepState>),
    /// Stationary spawn-zone guardian. Never acts.
    Guard,
    /// Player-summoned decoy. Never acts.
    Ally,
}

/// A character together with its role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Shared character state.
    pub character: Character,
    /// Role-specific state.
    pub role: Role,
}

impl Entity {
    /// Entity ID.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.character.id
    }

    /// Players only.
    #[must_use]
    pub fn is_player(&self) -> bool {
        matches!(self.role, Role::Player(_))
    }

    /// Players and allies; creeps target these.
    #[must_use]
    pub fn is_player_or_ally(&self) -> bool {
        matches!(self.role, Role::Player(_) | Role::Ally)
    }

    /// Player state, if this is a player.
    #[must_use]
    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.role {
            Role::Player(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable player state, if this is a player.
    pub fn as_player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.role {
            Role::Player(p) => Some(p),
            _ => None,
        }
    }

    /// Creep state, if this is a creep.
    #[must_use]
    pub fn as_creep(&self) -> Option<&CreepState> {
        match &self.role {
            Role::Creep(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character() -> Character {
        Character::new(7, CharacterType::Wolf, Vec2Fixed::from_ints(1, 1), 99)
    }

    #[test]
    fn test_new_character_has_no_target() {
        let c = character();
        assert!(!c.has_attack_target());
        assert_eq!(c.attack_target, 7);
        assert!(!c.is_dead());
    }

    #[test]
    fn test_conditions_overwrite_and_tick_to_zero() {
        let mut conditions = Conditions::default();
        conditions.set(Condition::Immobile, Timer::from_num(120), 1, Fixed::ZERO);
        conditions.set(Condition::Immobile, Timer::from_num(60), 2, Fixed::ZERO);
        assert_eq!(conditions.slot(Condition::Immobile).attacker, 2);

        conditions.tick();
        assert!(conditions.has(Condition::Immobile));
        conditions.tick();
        assert!(!conditions.has(Condition::Immobile));
        assert_eq!(conditions.slot(Condition::Immobile).remaining, Timer::ZERO);
    }

    #[test]
    fn test_enraged_shortens_cooldown() {
        let mut c = character();
        c.base_attack_cooldown = Timer::from_num(1000);
        assert_eq!(c.attack_cooldown(), Timer::from_num(1000));
        c.conditions
            .set(Condition::Enraged, Timer::from_num(500), 0, Fixed::ZERO);
        assert!(c.attack_cooldown() < Timer::from_num(1000));
    }

    #[test]
    fn test_die_state_is_sticky() {
        let mut c = character();
        c.hp = Fixed::ZERO;
        c.set_state(BehaviorState::Die);
        c.set_state(BehaviorState::Walk);
        assert_eq!(c.state, BehaviorState::Die);
    }

    #[test]
    fn test_hit_state_holds() {
        let mut c = character();
        c.set_state(BehaviorState::Hit);
        c.set_state(BehaviorState::Walk);
        assert_eq!(c.state, BehaviorState::Hit);
        c.state_steps = STATE_HOLD_STEPS;
        c.set_state(BehaviorState::Walk);
        assert_eq!(c.state, BehaviorState::Walk);
    }

    #[test]
    fn test_death_animation_requires_die_state() {
        let mut c = character();
        assert!(matches!(
            c.death_animation_complete(),
            Err(GameError::Precondition(_))
        ));
        c.hp = Fixed::ZERO;
        c.set_state(BehaviorState::Die);
        assert!(!c.death_animation_complete().unwrap());
        c.state_steps = DEATH_ANIMATION_STEPS;
        assert!(c.death_animation_complete().unwrap());
    }

    #[test]
    fn test_creep_level_table() {
        assert_eq!(CharacterType::for_creep_level(1), CharacterType::Wolf);
        assert_eq!(CharacterType::for_creep_level(3), CharacterType::Ogre);
        assert_eq!(CharacterType::for_creep_level(18), CharacterType::PinkZombie);
        assert_eq!(CharacterType::for_creep_level(40), CharacterType::BlackKnight);
    }

    #[test]
    fn test_circle_collision_is_strict() {
        let c = character();
        let touching = Vec2Fixed::new(Fixed::from_num(1) + c.radius * 2, Fixed::from_num(1));
        assert!(!c.collides_with_circle(touching, c.radius));
        assert!(c.collides_with_circle(Vec2Fixed::from_ints(1, 1), Fixed::DELTA));
    }
}

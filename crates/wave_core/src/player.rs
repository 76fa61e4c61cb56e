//! Player avatars.
//!
//! Everything a participant can ask for goes through [`Entity::apply_action`].
//! Each command has a `can_*` query and an executing counterpart that
//! re-checks the same conditions, so a command that became invalid between
//! being issued and being executed is rejected with
//! [`GameError::Precondition`] and leaves the player untouched.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::combat::StepContext;
use crate::entity::{BehaviorState, Character, Condition, Entity, EntityId, PlayerClass, Role};
use crate::error::{GameError, Result};
use crate::items::{Item, Potion};
use crate::math::{fixed_serde, millis, timer_serde, Fixed, Orientation, Timer, Vec2Fixed};
use crate::protocol::Action;
use crate::skills::{deathzone_radius, Skill, TargetMode, MAX_SKILL_SLOTS};
use crate::tuning::{
    ClassStats, ARCHER_COLDARROW_LEVELUP_EXTRA_MS, ARCHER_COLDARROW_MS,
    ARCHER_DISTRACTION_DMG_FACTOR, ARCHER_DISTRACTION_LEVELUP_DMG_FACTOR_ADD,
    ARCHER_DISTRACTION_MAX_DISTANCE_TO_ALLY, ARCHER_POISON_VIAL_DMG_PER_SEC,
    ARCHER_POISON_VIAL_LEVELUP_EXTRA_DMG, ARCHER_POISON_VIAL_LEVELUP_EXTRA_MS,
    ARCHER_POISON_VIAL_MS, ARCHER_STATS, HEALING_ZONE_MAX_HP_PERCENTAGE_REGEN_SEC,
    HEALING_ZONE_MAX_MP_PERCENTAGE_REGEN_SEC, ITEM_ATTACK_COOLDOWN_TOME_FACTOR,
    ITEM_ATTACK_DAMAGE_TOME_FACTOR, ITEM_HP_POTION_HP_GAIN, ITEM_HP_TOME_MAX_HP_INCREASE,
    ITEM_MOVEMENT_TOME_MOVEMENT_GAIN, ITEM_MP_POTION_MP_GAIN, ITEM_MP_TOME_MAX_MP_INCREASE,
    ITEM_SKILL_COOLDOWN_TOME_FACTOR, ITEM_XP_TOME_XP_GAIN, KNIGHT_CARNAGE_EXTRA_RADIUS,
    KNIGHT_CARNAGE_RADIUS, KNIGHT_MIGHT_FACTOR, KNIGHT_MIGHT_LEVELUP_EXTRA_FACTOR,
    KNIGHT_RAGE_LEVELUP_EXTRA_MS, KNIGHT_RAGE_MS, KNIGHT_STATS, KNIGHT_TANK_LEVELUP_EXTRA_MS,
    KNIGHT_TANK_MS, LEVELUP_ATTACK_COOLDOWN_FACTOR, LEVELUP_ATTACK_DMG_FACTOR, LEVELUP_HP_FACTOR,
    LEVELUP_MP_FACTOR, MAGE_CONFUSE_LEVELUP_EXTRA_MS, MAGE_CONFUSE_MS,
    MAGE_DEATHZONE_COOLDOWN_FACTOR, MAGE_DEATHZONE_FACTOR, MAGE_DEATHZONE_LEVELUP_EXTRA_MS,
    MAGE_DEATHZONE_MS, MAGE_FIREBALL_FACTOR, MAGE_FIREBALL_LEVELUP_EXTRA_FACTOR,
    MAGE_ICEBOMB_EXTRA_MS, MAGE_ICEBOMB_FACTOR, MAGE_ICEBOMB_MS, MAGE_STATS, MAX_NUM_PLAYERS,
    MAX_PLAYER_LEVEL, MONK_DEATHZONE_COOLDOWN_FACTOR, MONK_DEATHZONE_FACTOR,
    MONK_DEATHZONE_LEVELUP_EXTRA_MS, MONK_DEATHZONE_MS, MONK_HEAL_HP, MONK_HEAL_LEVELUP_EXTRA_HP,
    MONK_HEAL_XP, MONK_MASS_HEAL_HP, MONK_MASS_HEAL_LEVELUP_EXTRA_HP, MONK_MASS_HEAL_XP,
    MONK_STATS, PLAYER_INITIAL_MAX_MOVEMENT_PER_SEC, PLAYER_MAX_MP_PERCENTAGE_REGEN_SEC,
    PLAYER_RESPAWN_MS, PLAYER_SKILL_BASE_COOLDOWN_MS, SPAWN_TRIALS, STEP_SEC, STEP_TIMER,
    XP_GOLD_PER_KILLED_CREEP, XP_PER_LEVEL,
};

/// Cooldown, timer and level of one skill slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillSlot {
    /// Time between casts.
    #[serde(with = "timer_serde")]
    pub cooldown: Timer,
    /// Time until the next cast.
    #[serde(with = "timer_serde")]
    pub timer: Timer,
    /// Current level, starting at 1.
    pub level: u32,
}

/// Player-specific state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerState {
    /// Chosen class.
    pub class: PlayerClass,
    /// Display name.
    pub name: String,
    /// Gold for the shop.
    pub gold: u32,
    /// Experience level, starting at 1.
    pub level: u32,
    /// Experience towards the next level.
    #[serde(with = "fixed_serde")]
    pub xp: Fixed,
    /// Current MP.
    #[serde(with = "fixed_serde")]
    pub mp: Fixed,
    /// Maximum MP.
    #[serde(with = "fixed_serde")]
    pub max_mp: Fixed,
    /// Potion counts indexed by [`Potion::slot`].
    pub potions: [u32; 2],
    /// Skill slots; slot `n` lives at index `n - 1`.
    pub skills: [SkillSlot; MAX_SKILL_SLOTS],
    /// Skill upgrades spent so far.
    pub skill_upgrades: u32,
    /// Time until respawn while dead.
    #[serde(with = "timer_serde")]
    pub respawn_timer: Timer,
    /// Center of the active death zone.
    pub deathzone_position: Vec2Fixed,
    /// Remaining death zone time.
    #[serde(with = "timer_serde")]
    pub deathzone_timer: Timer,
    /// Where a scarecrow should be summoned this step.
    pub pending_scarecrow: Option<Vec2Fixed>,
}

impl PlayerState {
    /// XP needed to reach the next level.
    #[must_use]
    pub fn xp_for_next_level(&self) -> Fixed {
        Fixed::saturating_from_num(self.level.saturating_mul(XP_PER_LEVEL))
    }

    /// State of a 1-based skill slot.
    #[must_use]
    pub fn skill_slot(&self, slot: u32) -> Option<&SkillSlot> {
        slot.checked_sub(1).and_then(|i| self.skills.get(i as usize))
    }

    fn regain_mp(&mut self, amount: Fixed) {
        self.mp = self.mp.saturating_add(amount).min(self.max_mp);
    }
}

/// Base stats of a class.
#[must_use]
pub const fn class_stats(class: PlayerClass) -> ClassStats {
    match class {
        PlayerClass::Knight => KNIGHT_STATS,
        PlayerClass::Archer => ARCHER_STATS,
        PlayerClass::Mage => MAGE_STATS,
        PlayerClass::Monk => MONK_STATS,
    }
}

/// A fresh player of `class` at `position`. The caller registers it in the
/// spatial index.
#[must_use]
pub fn new_player(id: EntityId, class: PlayerClass, name: &str, position: Vec2Fixed, seed: u32) -> Entity {
    let stats = class_stats(class);
    let mut character = Character::new(id, class.character_type(), position, seed);
    character.hp = stats.hp;
    character.max_hp = stats.hp;
    character.attack_damage = stats.attack_damage;
    character.base_attack_cooldown = stats.attack_cooldown;
    character.attack_range = stats.attack_range;
    character.max_speed = PLAYER_INITIAL_MAX_MOVEMENT_PER_SEC;

    let mut skills = [SkillSlot {
        cooldown: PLAYER_SKILL_BASE_COOLDOWN_MS,
        timer: Timer::ZERO,
        level: 1,
    }; MAX_SKILL_SLOTS];
    match class {
        PlayerClass::Mage => skills[1].cooldown *= MAGE_DEATHZONE_COOLDOWN_FACTOR,
        PlayerClass::Monk => skills[1].cooldown *= MONK_DEATHZONE_COOLDOWN_FACTOR,
        PlayerClass::Knight | PlayerClass::Archer => {}
    }

    Entity {
        character,
        role: Role::Player(Box::new(PlayerState {
            class,
            name: name.to_owned(),
            gold: 0,
            level: 1,
            xp: Fixed::ZERO,
            mp: stats.mp,
            max_mp: stats.mp,
            potions: [0; 2],
            skills,
            skill_upgrades: 0,
            respawn_timer: Timer::ZERO,
            deathzone_position: position,
            deathzone_timer: Timer::ZERO,
            pending_scarecrow: None,
        })),
    }
}

fn rejected(id: EntityId, reason: impl std::fmt::Display) -> GameError {
    GameError::Precondition(format!("player {id}: {reason}"))
}

fn regen_per_step(max: Fixed, percent_per_sec: i32) -> Fixed {
    max.saturating_mul(STEP_SEC) * percent_per_sec / 100
}

fn extra_ms(base: i32, per_level: i32, extra_levels: i32) -> Timer {
    millis(base.saturating_add(per_level.saturating_mul(extra_levels)))
}

fn can_attack_position(character: &Character, ctx: &StepContext<'_>, position: Vec2Fixed, los: bool) -> bool {
    if character.is_dead() || !ctx.world.in_map(position) {
        return false;
    }
    let to_target = position - character.position;
    let distance = to_target.length();
    if distance > character.attack_range {
        return false;
    }
    !los || distance <= Fixed::ONE
        || ctx
            .world
            .line_of_sight_check(character.position, to_target.normalize(), distance)
            .is_none()
}

fn can_attack_entity(character: &Character, ctx: &StepContext<'_>, target: EntityId, los: bool) -> bool {
    ctx.position_of(target)
        .is_some_and(|position| can_attack_position(character, ctx, position, los))
}

fn gain_xp(character: &mut Character, player: &mut PlayerState, amount: Fixed) {
    player.xp = player.xp.saturating_add(amount);
    while player.level < MAX_PLAYER_LEVEL && player.xp >= player.xp_for_next_level() {
        player.xp -= player.xp_for_next_level();
        player.level += 1;

        let extra_hp = character.max_hp.saturating_mul(LEVELUP_HP_FACTOR) - character.max_hp;
        let extra_mp = player.max_mp.saturating_mul(LEVELUP_MP_FACTOR) - player.max_mp;
        character.max_hp = character.max_hp.saturating_add(extra_hp);
        player.max_mp = player.max_mp.saturating_add(extra_mp);
        if !character.is_dead() {
            character.hp = character.hp.saturating_add(extra_hp);
            player.mp = player.mp.saturating_add(extra_mp);
        }
        character.base_attack_cooldown *= Timer::from_num(LEVELUP_ATTACK_COOLDOWN_FACTOR);
        character.attack_damage = character.attack_damage.saturating_mul(LEVELUP_ATTACK_DMG_FACTOR);
    }
}

impl Entity {
    fn player_parts(&mut self) -> Result<(&mut Character, &mut PlayerState)> {
        let Self { character, role } = self;
        match role {
            Role::Player(player) => Ok((character, &mut **player)),
            _ => Err(rejected(character.id, "not a player")),
        }
    }

    // ------------------------------------------------------------------
    // Movement and attacks
    // ------------------------------------------------------------------

    /// New state of the W, A, S and D keys. Moves in the matching compass
    /// direction at full speed, or stops, and drops any attack target.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] for non-players.
    pub fn movement_keys_changed(&mut self, keys: [bool; 4]) -> Result<()> {
        let (character, _) = self.player_parts()?;
        let [w, a, s, d] = keys;
        let direction = if a {
            Some(if s {
                Orientation::SW
            } else if w {
                Orientation::NW
            } else {
                Orientation::W
            })
        } else if d {
            Some(if s {
                Orientation::SE
            } else if w {
                Orientation::NE
            } else {
                Orientation::E
            })
        } else if s {
            Some(Orientation::S)
        } else if w {
            Some(Orientation::N)
        } else {
            None
        };
        character.velocity =
            direction.map_or(Vec2Fixed::ZERO, |o| o.direction() * character.max_speed);
        character.clear_attack_target();
        Ok(())
    }

    /// Attack `target` from now on. Range is checked every step.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] for non-players.
    pub fn start_attacking(&mut self, target: EntityId) -> Result<()> {
        let (character, _) = self.player_parts()?;
        character.attack_target = target;
        character.velocity = Vec2Fixed::ZERO;
        Ok(())
    }

    /// Whether a point is within attack range and, if `los` is set, visible.
    #[must_use]
    pub fn can_attack_position(&self, ctx: &StepContext<'_>, position: Vec2Fixed, los: bool) -> bool {
        can_attack_position(&self.character, ctx, position, los)
    }

    /// Whether a living entity is within attack range and, if `los` is set,
    /// visible.
    #[must_use]
    pub fn can_attack_entity(&self, ctx: &StepContext<'_>, target: EntityId, los: bool) -> bool {
        can_attack_entity(&self.character, ctx, target, los)
    }

    // ------------------------------------------------------------------
    // Skills
    // ------------------------------------------------------------------

    fn validate_skill(
        &self,
        ctx: &StepContext<'_>,
        slot: u32,
        target: EntityId,
        position: Vec2Fixed,
    ) -> Result<Skill> {
        let character = &self.character;
        let id = character.id;
        let player = self.as_player().ok_or_else(|| rejected(id, "not a player"))?;
        let skill = Skill::for_slot(player.class, slot)?;
        let state = player
            .skill_slot(slot)
            .ok_or_else(|| rejected(id, format!("no skill slot {slot}")))?;
        let info = skill.info();

        if character.is_dead() {
            return Err(rejected(id, "dead players cannot cast"));
        }
        if state.timer > Timer::ZERO {
            return Err(rejected(id, format!("{} is on cooldown", info.name)));
        }
        if player.mp < info.mp_cost {
            return Err(rejected(id, format!("not enough MP for {}", info.name)));
        }
        let valid = match info.mode {
            TargetMode::Passive => false,
            TargetMode::SelfCast => true,
            TargetMode::SingleCreep => {
                can_attack_entity(character, ctx, target, info.line_of_sight)
                    && ctx.alive(target).is_some_and(|e| !e.is_player_or_ally())
            }
            // The caster is not among `ctx.others` while it acts.
            TargetMode::SingleAlly => {
                target == id
                    || (can_attack_entity(character, ctx, target, info.line_of_sight)
                        && ctx.alive(target).is_some_and(Entity::is_player_or_ally))
            }
            TargetMode::Radius => can_attack_position(character, ctx, position, info.line_of_sight),
            TargetMode::FreeSpot => {
                ctx.world.in_map(position)
                    && !ctx.world.is_blocked(position)
                    && !ctx.index.collides(position, character.radius, Some(id))
            }
        };
        if valid {
            Ok(skill)
        } else {
            Err(rejected(id, format!("invalid target for {}", info.name)))
        }
    }

    /// Whether the skill in `slot` could be cast at the given target now.
    #[must_use]
    pub fn can_use_skill(
        &self,
        ctx: &StepContext<'_>,
        slot: u32,
        target: EntityId,
        position: Vec2Fixed,
    ) -> bool {
        self.validate_skill(ctx, slot, target, position).is_ok()
    }

    /// Cast the skill in `slot`: spend MP, start the cooldown and apply the
    /// effect, scaled by the slot's level.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] if the cast is not possible; no MP
    /// is spent and no cooldown starts in that case.
    pub fn use_skill(
        &mut self,
        ctx: &mut StepContext<'_>,
        slot: u32,
        target: EntityId,
        position: Vec2Fixed,
    ) -> Result<()> {
        let skill = self.validate_skill(ctx, slot, target, position)?;
        let (character, player) = self.player_parts()?;
        let id = character.id;
        let index = (slot - 1) as usize;
        player.mp -= skill.info().mp_cost;
        player.skills[index].timer = player.skills[index].cooldown;
        let extra = player.skills[index].level.saturating_sub(1) as i32;
        let extra_fixed = Fixed::from_num(extra);
        let damage = character.attack_damage;

        match skill {
            Skill::Distraction => {}
            Skill::MultiArrow => ctx.area_of_effect(position, skill.info().radius, damage, id)?,
            Skill::ColdArrow => {
                if let Some(victim) = ctx.others.get_mut(&target) {
                    victim.character.set_state(BehaviorState::Hit);
                    victim.harm(damage, id, ctx.index, ctx.credits);
                    victim.character.give_condition(
                        Condition::Immobile,
                        extra_ms(ARCHER_COLDARROW_MS, ARCHER_COLDARROW_LEVELUP_EXTRA_MS, extra),
                        id,
                        Fixed::ZERO,
                    )?;
                }
            }
            Skill::Tank => character.give_condition(
                Condition::ImmuneToDamage,
                extra_ms(KNIGHT_TANK_MS, KNIGHT_TANK_LEVELUP_EXTRA_MS, extra),
                id,
                Fixed::ZERO,
            )?,
            Skill::Carnage => {
                let radius = KNIGHT_CARNAGE_RADIUS + KNIGHT_CARNAGE_EXTRA_RADIUS * extra;
                ctx.area_of_effect(character.position, radius, damage, id)?;
            }
            Skill::Might | Skill::Fireball => {
                let factor = if skill == Skill::Might {
                    KNIGHT_MIGHT_FACTOR + KNIGHT_MIGHT_LEVELUP_EXTRA_FACTOR * extra
                } else {
                    MAGE_FIREBALL_FACTOR + MAGE_FIREBALL_LEVELUP_EXTRA_FACTOR * extra
                };
                if let Some(victim) = ctx.others.get_mut(&target) {
                    victim.character.set_state(BehaviorState::Hit);
                    victim.harm(damage.saturating_mul(factor), id, ctx.index, ctx.credits);
                }
            }
            Skill::DeathzoneMage => {
                player.deathzone_position = position;
                player.deathzone_timer =
                    extra_ms(MAGE_DEATHZONE_MS, MAGE_DEATHZONE_LEVELUP_EXTRA_MS, extra);
            }
            Skill::DeathzoneMonk => {
                player.deathzone_position = position;
                player.deathzone_timer =
                    extra_ms(MONK_DEATHZONE_MS, MONK_DEATHZONE_LEVELUP_EXTRA_MS, extra);
            }
            Skill::IceBomb => {
                let amount = damage.saturating_mul(MAGE_ICEBOMB_FACTOR);
                let duration = extra_ms(MAGE_ICEBOMB_MS, MAGE_ICEBOMB_EXTRA_MS, extra);
                ctx.for_each_hostile_within(position, skill.info().radius, |victim, index, credits| {
                    victim.character.set_state(BehaviorState::Hit);
                    victim.harm(amount, id, index, credits);
                    victim
                        .character
                        .give_condition(Condition::Immobile, duration, id, Fixed::ZERO)
                })?;
            }
            Skill::Confuse => {
                let duration = extra_ms(MAGE_CONFUSE_MS, MAGE_CONFUSE_LEVELUP_EXTRA_MS, extra);
                ctx.for_each_hostile_within(position, skill.info().radius, |victim, _, _| {
                    victim.character.set_state(BehaviorState::Hit);
                    victim
                        .character
                        .give_condition(Condition::Confused, duration, id, Fixed::ZERO)
                })?;
            }
            Skill::PoisonVial => {
                let duration =
                    extra_ms(ARCHER_POISON_VIAL_MS, ARCHER_POISON_VIAL_LEVELUP_EXTRA_MS, extra);
                let rate = ARCHER_POISON_VIAL_DMG_PER_SEC
                    .saturating_add(ARCHER_POISON_VIAL_LEVELUP_EXTRA_DMG.saturating_mul(extra_fixed));
                ctx.for_each_hostile_within(position, skill.info().radius, |victim, _, _| {
                    victim.character.set_state(BehaviorState::Hit);
                    victim
                        .character
                        .give_condition(Condition::Poisoned, duration, id, rate)
                })?;
            }
            Skill::Rage => character.give_condition(
                Condition::Enraged,
                extra_ms(KNIGHT_RAGE_MS, KNIGHT_RAGE_LEVELUP_EXTRA_MS, extra),
                id,
                Fixed::ZERO,
            )?,
            Skill::Heal => {
                let amount =
                    MONK_HEAL_HP.saturating_add(MONK_HEAL_LEVELUP_EXTRA_HP.saturating_mul(extra_fixed));
                if target == id {
                    character.heal(amount)?;
                } else if let Some(friend) = ctx.others.get_mut(&target) {
                    friend.character.heal(amount)?;
                }
                gain_xp(character, player, MONK_HEAL_XP);
            }
            Skill::Teleport => {
                ctx.index
                    .update(id, character.position, position, character.radius);
                character.position = position;
            }
            Skill::Scarecrow => player.pending_scarecrow = Some(position),
            Skill::MassHeal => {
                let amount = MONK_MASS_HEAL_HP
                    .saturating_add(MONK_MASS_HEAL_LEVELUP_EXTRA_HP.saturating_mul(extra_fixed));
                for other in 0..MAX_NUM_PLAYERS {
                    if !ctx.index.is_alive(other) {
                        continue;
                    }
                    if other == id {
                        character.heal(amount)?;
                    } else if let Some(friend) = ctx.others.get_mut(&other) {
                        friend.character.heal(amount)?;
                    }
                }
                gain_xp(character, player, MONK_MASS_HEAL_XP);
            }
        }

        character.set_state(BehaviorState::Spell);
        Ok(())
    }

    /// Whether the skill in `slot` can be raised one level.
    #[must_use]
    pub fn can_upgrade_skill(&self, slot: u32) -> bool {
        let Some(player) = self.as_player() else {
            return false;
        };
        let (Ok(skill), Some(state)) = (Skill::for_slot(player.class, slot), player.skill_slot(slot)) else {
            return false;
        };
        state.level < skill.info().max_level
            && player.skill_upgrades < player.level.saturating_sub(1)
    }

    /// Raise the skill in `slot` one level.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] if no upgrade is available.
    pub fn upgrade_skill(&mut self, slot: u32) -> Result<()> {
        if !self.can_upgrade_skill(slot) {
            return Err(rejected(self.id(), format!("cannot upgrade skill slot {slot}")));
        }
        let (_, player) = self.player_parts()?;
        player.skills[(slot - 1) as usize].level += 1;
        player.skill_upgrades += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shop and potions
    // ------------------------------------------------------------------

    /// Whether the player stands in the shop alive with enough gold.
    #[must_use]
    pub fn can_buy_item(&self, ctx: &StepContext<'_>, item: Item) -> bool {
        self.as_player().is_some_and(|player| {
            !self.character.is_dead()
                && player.gold >= item.cost()
                && ctx.world.shop().contains(self.character.position)
        })
    }

    /// Pay for `item` and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] if the purchase is not possible.
    pub fn buy_item(&mut self, ctx: &StepContext<'_>, item: Item) -> Result<()> {
        if !self.can_buy_item(ctx, item) {
            return Err(rejected(self.id(), format!("cannot buy {}", item.name())));
        }
        let (character, player) = self.player_parts()?;
        player.gold -= item.cost();
        match item {
            Item::HpPotion => player.potions[Potion::Hp.slot()] += 1,
            Item::MpPotion => player.potions[Potion::Mp.slot()] += 1,
            Item::HpTome => {
                character.max_hp = character.max_hp.saturating_add(ITEM_HP_TOME_MAX_HP_INCREASE);
                character.hp = character.hp.saturating_add(ITEM_HP_TOME_MAX_HP_INCREASE);
            }
            Item::MpTome => {
                player.max_mp = player.max_mp.saturating_add(ITEM_MP_TOME_MAX_MP_INCREASE);
                player.mp = player.mp.saturating_add(ITEM_MP_TOME_MAX_MP_INCREASE);
            }
            Item::XpTome => gain_xp(character, player, ITEM_XP_TOME_XP_GAIN),
            Item::MovementTome => {
                character.max_speed = character.max_speed.saturating_add(ITEM_MOVEMENT_TOME_MOVEMENT_GAIN);
            }
            Item::AttackCooldownTome => {
                character.base_attack_cooldown *= Timer::from_num(ITEM_ATTACK_COOLDOWN_TOME_FACTOR);
            }
            Item::AttackDamageTome => {
                character.attack_damage = character.attack_damage.saturating_mul(ITEM_ATTACK_DAMAGE_TOME_FACTOR);
            }
            Item::SkillCooldownTome => {
                for slot in &mut player.skills {
                    slot.cooldown *= Timer::from_num(ITEM_SKILL_COOLDOWN_TOME_FACTOR);
                }
            }
        }
        Ok(())
    }

    /// Whether a potion of this kind can be drunk now.
    #[must_use]
    pub fn can_use_potion(&self, potion: Potion) -> bool {
        self.as_player()
            .is_some_and(|p| !self.character.is_dead() && p.potions[potion.slot()] > 0)
    }

    /// Drink a potion.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] if the player is dead or has none.
    pub fn use_potion(&mut self, potion: Potion) -> Result<()> {
        if !self.can_use_potion(potion) {
            return Err(rejected(self.id(), format!("cannot use {potion:?} potion")));
        }
        let (character, player) = self.player_parts()?;
        player.potions[potion.slot()] -= 1;
        match potion {
            Potion::Hp => character.heal(ITEM_HP_POTION_HP_GAIN)?,
            Potion::Mp => player.regain_mp(ITEM_MP_POTION_MP_GAIN),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Progression
    // ------------------------------------------------------------------

    /// Reward for a share of a creep kill: gold and XP in proportion to the
    /// damage dealt.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] for non-players.
    pub fn killed_creep(&mut self, fraction: Fixed) -> Result<()> {
        let (character, player) = self.player_parts()?;
        let gain = fraction.saturating_mul(XP_GOLD_PER_KILLED_CREEP);
        player.gold = player.gold.saturating_add(gain.round().saturating_to_num::<u32>());
        gain_xp(character, player, gain);
        Ok(())
    }

    /// Grant experience, levelling up as often as it covers.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] for non-players.
    pub fn gain_xp(&mut self, amount: Fixed) -> Result<()> {
        let (character, player) = self.player_parts()?;
        gain_xp(character, player, amount);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command surface and step
    // ------------------------------------------------------------------

    /// Execute one participant action.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] when the action is not possible
    /// right now, and propagates anything else the action raises.
    pub fn apply_action(&mut self, action: &Action, ctx: &mut StepContext<'_>) -> Result<()> {
        let own_id = self.id();
        let own_position = self.character.position;
        match *action {
            Action::MovementKeys { keys } => self.movement_keys_changed(keys),
            Action::Attack { target } => self.start_attacking(target),
            Action::BuyItem { item } => self.buy_item(ctx, item),
            Action::UsePotion { potion } => self.use_potion(potion),
            Action::CharacterTargetSkill { slot, target } => {
                let position = ctx.position_of(target).unwrap_or(own_position);
                self.use_skill(ctx, slot, target, position)
            }
            Action::PositionTargetSkill { slot, position } => {
                self.use_skill(ctx, slot, own_id, position)
            }
            Action::SelfSkill { slot } => self.use_skill(ctx, slot, own_id, own_position),
            Action::UpgradeSkill { slot } => self.upgrade_skill(slot),
        }
    }

    /// One player step: death zone, respawn, regeneration, attacking or
    /// moving, then the shared character update.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] for non-players and propagates
    /// geometry errors.
    pub fn step_player(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        {
            let (character, player) = self.player_parts()?;
            tick_deathzone(character, player, ctx)?;

            if character.is_dead() {
                character.velocity = Vec2Fixed::ZERO;
                if player.respawn_timer <= Timer::ZERO {
                    player.respawn_timer = PLAYER_RESPAWN_MS;
                    return Ok(());
                }
                player.respawn_timer -= STEP_TIMER;
                if player.respawn_timer > Timer::ZERO || !respawn(character, player, ctx)? {
                    return Ok(());
                }
            }

            if character.has_condition(Condition::Immobile) {
                character.velocity = Vec2Fixed::ZERO;
            }
            for slot in &mut player.skills {
                slot.timer = (slot.timer - STEP_TIMER).max(Timer::ZERO);
            }
            player.regain_mp(regen_per_step(player.max_mp, PLAYER_MAX_MP_PERCENTAGE_REGEN_SEC));
            if ctx.world.healing_zone().contains(character.position) {
                character.heal(regen_per_step(character.max_hp, HEALING_ZONE_MAX_HP_PERCENTAGE_REGEN_SEC))?;
                player.regain_mp(regen_per_step(player.max_mp, HEALING_ZONE_MAX_MP_PERCENTAGE_REGEN_SEC));
            }

            if character.has_attack_target() {
                character.velocity = Vec2Fixed::ZERO;
                if !can_attack_entity(character, ctx, character.attack_target, true) {
                    character.clear_attack_target();
                } else if character.attack_timer <= Timer::ZERO {
                    character.attack_timer = character.attack_cooldown();
                    let damage = attack_damage(character, player, ctx);
                    ctx.harm(character.attack_target, damage, character.id);
                } else {
                    character.attack_timer -= STEP_TIMER;
                }
            } else if !character.velocity.is_zero() {
                match character.next_position(ctx.world, ctx.index) {
                    Some(next) => {
                        ctx.index
                            .update(character.id, character.position, next, character.radius);
                        character.position = next;
                    }
                    None => character.velocity = Vec2Fixed::ZERO,
                }
            }
        }
        self.step_character(ctx)
    }
}

fn tick_deathzone(character: &Character, player: &mut PlayerState, ctx: &mut StepContext<'_>) -> Result<()> {
    if player.deathzone_timer <= Timer::ZERO {
        return Ok(());
    }
    player.deathzone_timer = (player.deathzone_timer - STEP_TIMER).max(Timer::ZERO);
    let Some(radius) = deathzone_radius(player.class) else {
        return Ok(());
    };
    let factor = if player.class == PlayerClass::Mage {
        MAGE_DEATHZONE_FACTOR
    } else {
        MONK_DEATHZONE_FACTOR
    };
    // Regular damage per millisecond of attack cooldown, times one step.
    let per_step = Timer::saturating_from_num(character.attack_damage.saturating_mul(factor))
        .saturating_mul(STEP_TIMER);
    let amount = per_step
        .checked_div(character.attack_cooldown())
        .map_or(Fixed::ZERO, Fixed::saturating_from_num);
    ctx.area_of_effect(player.deathzone_position, radius, amount, character.id)
}

/// Returns whether the player is back on the map.
fn respawn(character: &mut Character, player: &mut PlayerState, ctx: &mut StepContext<'_>) -> Result<bool> {
    let found = ctx.index.find_free_spawn_position(
        ctx.world.respawn_zone(),
        character.radius,
        &mut character.rng,
        SPAWN_TRIALS,
    );
    let position = match found {
        Ok(position) => position,
        Err(err) if !err.is_fatal() => {
            warn!(player = character.id, %err, "Respawn zone is crowded, retrying next step");
            player.respawn_timer = Timer::DELTA;
            return Ok(false);
        }
        Err(err) => return Err(err),
    };
    character.position = position;
    character.hp = character.max_hp;
    player.mp = player.max_mp;
    for slot in &mut player.skills {
        slot.timer = Timer::ZERO;
    }
    character.conditions.clear();
    character.clear_attack_target();
    character.set_state(BehaviorState::Stop);
    ctx.index.insert(character.id, position, character.radius);
    Ok(true)
}

fn attack_damage(character: &Character, player: &PlayerState, ctx: &StepContext<'_>) -> Fixed {
    let damage = character.attack_damage;
    if player.class != PlayerClass::Archer {
        return damage;
    }
    let Some(target) = ctx.position_of(character.attack_target) else {
        return damage;
    };
    let reach = ARCHER_DISTRACTION_MAX_DISTANCE_TO_ALLY;
    let near = |p: Vec2Fixed| (p - target).length() <= reach;
    let distracted = near(character.position)
        || ctx
            .index
            .at_with_tolerance(target, reach)
            .into_iter()
            .filter_map(|id| ctx.alive(id))
            .any(|e| e.is_player_or_ally() && near(e.character.position));
    if !distracted {
        return damage;
    }
    let level = player.skills[0].level.saturating_sub(1) as i32;
    damage.saturating_mul(ARCHER_DISTRACTION_DMG_FACTOR + ARCHER_DISTRACTION_LEVELUP_DMG_FACTOR_ADD * level)
}

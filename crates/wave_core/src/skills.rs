//! Static skill metadata and the class to slot table.

use serde::{Deserialize, Serialize};

use crate::entity::PlayerClass;
use crate::error::{GameError, Result};
use crate::math::Fixed;
use crate::tuning::{
    ARCHER_MULTIARROW_RADIUS, ARCHER_POISON_VIAL_RADIUS, KNIGHT_CARNAGE_RADIUS,
    MAGE_CONFUSE_RADIUS, MAGE_DEATHZONE_RADIUS, MAGE_ICEBOMB_RADIUS, MONK_DEATHZONE_RADIUS,
};

/// Most skill slots any class has.
pub const MAX_SKILL_SLOTS: usize = 5;

/// What a skill needs as its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetMode {
    /// Always on; cannot be cast.
    Passive,
    /// Affects the caster.
    SelfCast,
    /// A living creep or guard.
    SingleCreep,
    /// A point within attack range.
    Radius,
    /// A living player or ally.
    SingleAlly,
    /// A free, walkable point.
    FreeSpot,
}

/// Every skill in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Skill {
    Distraction,
    MultiArrow,
    ColdArrow,
    Scarecrow,
    PoisonVial,
    Tank,
    Carnage,
    Might,
    Rage,
    Fireball,
    DeathzoneMage,
    IceBomb,
    Confuse,
    Heal,
    DeathzoneMonk,
    Teleport,
    MassHeal,
}

/// Static description of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillInfo {
    /// Display name.
    pub name: &'static str,
    /// Targeting rule.
    pub mode: TargetMode,
    /// Effect radius, zero for single-target skills.
    pub radius: Fixed,
    /// Whether the target must be visible from the caster.
    pub line_of_sight: bool,
    /// MP spent per cast.
    pub mp_cost: Fixed,
    /// Highest reachable level.
    pub max_level: u32,
}

const fn info(
    name: &'static str,
    mode: TargetMode,
    radius: Fixed,
    line_of_sight: bool,
    mp_cost: i32,
    max_level: u32,
) -> SkillInfo {
    SkillInfo {
        name,
        mode,
        radius,
        line_of_sight,
        mp_cost: Fixed::const_from_int(mp_cost),
        max_level,
    }
}

impl Skill {
    /// Metadata table.
    #[must_use]
    pub const fn info(self) -> SkillInfo {
        use TargetMode::{FreeSpot, Passive, Radius, SelfCast, SingleAlly, SingleCreep};
        let none = Fixed::ZERO;
        match self {
            Self::Distraction => info("Distraction", Passive, none, false, 0, 5),
            Self::MultiArrow => info("Multi Arrow", Radius, ARCHER_MULTIARROW_RADIUS, true, 20, 1),
            Self::ColdArrow => info("Cold Arrow", SingleCreep, none, true, 15, 5),
            Self::Scarecrow => info("Scarecrow", FreeSpot, none, false, 30, 5),
            Self::PoisonVial => info("Poison Vial", Radius, ARCHER_POISON_VIAL_RADIUS, false, 25, 5),
            Self::Tank => info("Tank", SelfCast, none, false, 20, 5),
            Self::Carnage => info("Carnage", SelfCast, KNIGHT_CARNAGE_RADIUS, false, 20, 5),
            Self::Might => info("Might", SingleCreep, none, true, 15, 5),
            Self::Rage => info("Rage", SelfCast, none, false, 25, 5),
            Self::Fireball => info("Fireball", SingleCreep, none, true, 20, 5),
            Self::DeathzoneMage => info("Death Zone", Radius, MAGE_DEATHZONE_RADIUS, false, 40, 5),
            Self::IceBomb => info("Ice Bomb", Radius, MAGE_ICEBOMB_RADIUS, false, 30, 5),
            Self::Confuse => info("Confuse", Radius, MAGE_CONFUSE_RADIUS, false, 25, 5),
            Self::Heal => info("Heal", SingleAlly, none, false, 20, 5),
            Self::DeathzoneMonk => info("Holy Ground", Radius, MONK_DEATHZONE_RADIUS, false, 40, 5),
            Self::Teleport => info("Teleport", FreeSpot, none, false, 20, 1),
            Self::MassHeal => info("Mass Heal", SelfCast, none, false, 50, 5),
        }
    }

    /// Skills of a class in slot order (slot 1 first).
    #[must_use]
    pub const fn slots(class: PlayerClass) -> &'static [Self] {
        match class {
            PlayerClass::Archer => &[
                Self::Distraction,
                Self::MultiArrow,
                Self::ColdArrow,
                Self::Scarecrow,
                Self::PoisonVial,
            ],
            PlayerClass::Knight => &[Self::Tank, Self::Carnage, Self::Might, Self::Rage],
            PlayerClass::Mage => &[Self::Fireball, Self::DeathzoneMage, Self::IceBomb, Self::Confuse],
            PlayerClass::Monk => &[Self::Heal, Self::DeathzoneMonk, Self::Teleport, Self::MassHeal],
        }
    }

    /// Skill in a 1-based slot.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Precondition`] if the class has no such slot.
    pub fn for_slot(class: PlayerClass, slot: u32) -> Result<Self> {
        slot.checked_sub(1)
            .and_then(|i| Self::slots(class).get(i as usize))
            .copied()
            .ok_or_else(|| GameError::Precondition(format!("{class:?} has no skill slot {slot}")))
    }
}

/// Radius of a class's death zone, if it has one.
#[must_use]
pub const fn deathzone_radius(class: PlayerClass) -> Option<Fixed> {
    match class {
        PlayerClass::Mage => Some(MAGE_DEATHZONE_RADIUS),
        PlayerClass::Monk => Some(MONK_DEATHZONE_RADIUS),
        PlayerClass::Knight | PlayerClass::Archer => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_counts() {
        assert_eq!(Skill::slots(PlayerClass::Archer).len(), MAX_SKILL_SLOTS);
        for class in [PlayerClass::Knight, PlayerClass::Mage, PlayerClass::Monk] {
            assert_eq!(Skill::slots(class).len(), 4);
        }
    }

    #[test]
    fn test_for_slot_is_one_based() {
        assert_eq!(Skill::for_slot(PlayerClass::Mage, 1).unwrap(), Skill::Fireball);
        assert_eq!(Skill::for_slot(PlayerClass::Archer, 5).unwrap(), Skill::PoisonVial);
        assert!(matches!(
            Skill::for_slot(PlayerClass::Knight, 0),
            Err(GameError::Precondition(_))
        ));
        assert!(matches!(
            Skill::for_slot(PlayerClass::Knight, 5),
            Err(GameError::Precondition(_))
        ));
    }

    #[test]
    fn test_only_distraction_is_passive() {
        for class in PlayerClass::ALL {
            for skill in Skill::slots(class) {
                let passive = skill.info().mode == TargetMode::Passive;
                assert_eq!(passive, *skill == Skill::Distraction);
            }
        }
    }

    #[test]
    fn test_radius_skills_have_radius() {
        for class in PlayerClass::ALL {
            for skill in Skill::slots(class) {
                let info = skill.info();
                if info.mode == TargetMode::Radius {
                    assert!(info.radius > Fixed::ZERO, "{}", info.name);
                }
            }
        }
    }

    #[test]
    fn test_deathzone_slot_is_two() {
        assert_eq!(Skill::for_slot(PlayerClass::Mage, 2).unwrap(), Skill::DeathzoneMage);
        assert_eq!(Skill::for_slot(PlayerClass::Monk, 2).unwrap(), Skill::DeathzoneMonk);
        assert!(deathzone_radius(PlayerClass::Knight).is_none());
    }
}

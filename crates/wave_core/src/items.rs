//! Shop items and potions.
//!
//! Wire codes are the declaration order and must not change.

use serde::{Deserialize, Serialize};

/// Purchasable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Item {
    /// One HP potion.
    HpPotion,
    /// One MP potion.
    MpPotion,
    /// Raises max HP.
    HpTome,
    /// Raises max MP.
    MpTome,
    /// Grants experience.
    XpTome,
    /// Raises movement speed.
    MovementTome,
    /// Shortens the attack cooldown.
    AttackCooldownTome,
    /// Raises attack damage.
    AttackDamageTome,
    /// Shortens every skill cooldown.
    SkillCooldownTome,
}

impl Item {
    /// All items in wire-code order.
    pub const ALL: [Self; 9] = [
        Self::HpPotion,
        Self::MpPotion,
        Self::HpTome,
        Self::MpTome,
        Self::XpTome,
        Self::MovementTome,
        Self::AttackCooldownTome,
        Self::AttackDamageTome,
        Self::SkillCooldownTome,
    ];

    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Item for a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Price in gold.
    #[must_use]
    pub const fn cost(self) -> u32 {
        match self {
            Self::HpPotion | Self::MpPotion => 50,
            Self::HpTome | Self::MpTome => 200,
            Self::MovementTome => 250,
            Self::XpTome
            | Self::AttackCooldownTome
            | Self::AttackDamageTome
            | Self::SkillCooldownTome => 300,
        }
    }

    /// Shop label.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HpPotion => "Health Potion",
            Self::MpPotion => "Mana Potion",
            Self::HpTome => "Tome of Health",
            Self::MpTome => "Tome of Magic",
            Self::XpTome => "Tome of Experience",
            Self::MovementTome => "Tome of Speed",
            Self::AttackCooldownTome => "Tome of Agility",
            Self::AttackDamageTome => "Tome of Might",
            Self::SkillCooldownTome => "Tome of Skills",
        }
    }
}

/// Consumable potions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Potion {
    /// Restores HP.
    Hp,
    /// Restores MP.
    Mp,
}

impl Potion {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Potion for a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Hp),
            1 => Some(Self::Mp),
            _ => None,
        }
    }

    /// Index into a player's potion counts.
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_codes_are_stable() {
        for (i, item) in Item::ALL.iter().enumerate() {
            assert_eq!(usize::from(item.code()), i);
            assert_eq!(Item::from_code(item.code()), Some(*item));
        }
        assert_eq!(Item::from_code(9), None);
    }

    #[test]
    fn test_potion_codes() {
        assert_eq!(Potion::from_code(Potion::Mp.code()), Some(Potion::Mp));
        assert_eq!(Potion::from_code(2), None);
    }

    #[test]
    fn test_tomes_cost_more_than_potions() {
        assert!(Item::HpTome.cost() > Item::HpPotion.cost());
    }
}

//! Actions, events and their wire format.
//!
//! An [`Action`] is what a participant wants to do, without a time. The
//! authority turns actions into [`Event`]s by stamping them with a step and
//! the originating player, and closes every step with
//! [`Event::NoMoreEvents`].
//!
//! # Wire format
//!
//! All integers are big-endian. Discriminator `0` is reserved and never
//! valid.
//!
//! ```text
//! Action  = u8 kind + fields
//!   1 MovementKeys          4 x u8 (0 or 1): W, A, S, D
//!   2 Attack                u32 target
//!   3 BuyItem               u8 item code
//!   4 UsePotion             u8 potion code
//!   5 CharacterTargetSkill  u32 slot, u32 target
//!   6 PositionTargetSkill   u32 slot, i32 raw x, i32 raw y
//!   7 SelfSkill             u32 slot
//!   8 UpgradeSkill          u32 slot
//! Event   = u8 kind + u32 step [+ u32 player + Action]
//!   1 PlayerAction
//!   2 NoMoreEvents
//! Batch   = u16 count + count x Event
//! ```

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{GameError, Result};
use crate::items::{Item, Potion};
use crate::math::Vec2Fixed;

/// Step counter type.
pub type Step = u32;

// ============================================================================
// Types
// ============================================================================

/// A participant's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// New state of the W, A, S, D keys.
    MovementKeys {
        /// Pressed flags in W, A, S, D order.
        keys: [bool; 4],
    },
    /// Attack an entity.
    Attack {
        /// Target entity.
        target: EntityId,
    },
    /// Buy a shop item.
    BuyItem {
        /// Item to buy.
        item: Item,
    },
    /// Drink a potion.
    UsePotion {
        /// Potion kind.
        potion: Potion,
    },
    /// Cast a skill at an entity.
    CharacterTargetSkill {
        /// 1-based skill slot.
        slot: u32,
        /// Target entity.
        target: EntityId,
    },
    /// Cast a skill at a point.
    PositionTargetSkill {
        /// 1-based skill slot.
        slot: u32,
        /// Target point.
        position: Vec2Fixed,
    },
    /// Cast a skill on oneself.
    SelfSkill {
        /// 1-based skill slot.
        slot: u32,
    },
    /// Spend a skill point.
    UpgradeSkill {
        /// 1-based skill slot.
        slot: u32,
    },
}

/// A step-stamped action or the end-of-step marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// An action of `player`, executed at `step`.
    PlayerAction {
        /// Step the action belongs to.
        step: Step,
        /// Originating player.
        player: EntityId,
        /// The action.
        action: Action,
    },
    /// No further events exist for `step`.
    NoMoreEvents {
        /// The closed step.
        step: Step,
    },
}

impl Event {
    /// Step this event belongs to.
    #[must_use]
    pub const fn step(&self) -> Step {
        match *self {
            Self::PlayerAction { step, .. } | Self::NoMoreEvents { step } => step,
        }
    }

    /// Whether this is the step terminator.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(self, Self::NoMoreEvents { .. })
    }
}

// ============================================================================
// Codec
// ============================================================================

mod kind {
    pub const MOVEMENT_KEYS: u8 = 1;
    pub const ATTACK: u8 = 2;
    pub const BUY_ITEM: u8 = 3;
    pub const USE_POTION: u8 = 4;
    pub const CHARACTER_TARGET_SKILL: u8 = 5;
    pub const POSITION_TARGET_SKILL: u8 = 6;
    pub const SELF_SKILL: u8 = 7;
    pub const UPGRADE_SKILL: u8 = 8;

    pub const PLAYER_ACTION: u8 = 1;
    pub const NO_MORE_EVENTS: u8 = 2;
}

impl Action {
    /// Append the wire form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match *self {
            Self::MovementKeys { keys } => {
                out.push(kind::MOVEMENT_KEYS);
                out.extend(keys.iter().map(|&pressed| u8::from(pressed)));
            }
            Self::Attack { target } => {
                out.push(kind::ATTACK);
                out.extend_from_slice(&target.to_be_bytes());
            }
            Self::BuyItem { item } => out.extend_from_slice(&[kind::BUY_ITEM, item.code()]),
            Self::UsePotion { potion } => out.extend_from_slice(&[kind::USE_POTION, potion.code()]),
            Self::CharacterTargetSkill { slot, target } => {
                out.push(kind::CHARACTER_TARGET_SKILL);
                out.extend_from_slice(&slot.to_be_bytes());
                out.extend_from_slice(&target.to_be_bytes());
            }
            Self::PositionTargetSkill { slot, position } => {
                let (x, y) = position.to_bits();
                out.push(kind::POSITION_TARGET_SKILL);
                out.extend_from_slice(&slot.to_be_bytes());
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&y.to_be_bytes());
            }
            Self::SelfSkill { slot } => {
                out.push(kind::SELF_SKILL);
                out.extend_from_slice(&slot.to_be_bytes());
            }
            Self::UpgradeSkill { slot } => {
                out.push(kind::UPGRADE_SKILL);
                out.extend_from_slice(&slot.to_be_bytes());
            }
        }
    }

    /// Wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Parse exactly one action from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Protocol`] on malformed or trailing input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let action = reader.action()?;
        reader.finish()?;
        Ok(action)
    }
}

impl Event {
    /// Append the wire form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match *self {
            Self::PlayerAction {
                step,
                player,
                action,
            } => {
                out.push(kind::PLAYER_ACTION);
                out.extend_from_slice(&step.to_be_bytes());
                out.extend_from_slice(&player.to_be_bytes());
                action.encode_into(out);
            }
            Self::NoMoreEvents { step } => {
                out.push(kind::NO_MORE_EVENTS);
                out.extend_from_slice(&step.to_be_bytes());
            }
        }
    }

    /// Wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Parse exactly one event from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Protocol`] on malformed or trailing input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let event = reader.event()?;
        reader.finish()?;
        Ok(event)
    }
}

/// Encode a batch of events behind a u16 count.
///
/// # Errors
///
/// Returns [`GameError::Protocol`] if the batch has more than `u16::MAX`
/// events.
pub fn encode_batch(events: &[Event]) -> Result<Vec<u8>> {
    let count = u16::try_from(events.len())
        .map_err(|_| GameError::Protocol(format!("batch of {} events is too large", events.len())))?;
    let mut out = count.to_be_bytes().to_vec();
    for event in events {
        event.encode_into(&mut out);
    }
    Ok(out)
}

/// Decode a batch written by [`encode_batch`].
///
/// # Errors
///
/// Returns [`GameError::Protocol`] on malformed or trailing input.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Event>> {
    let mut reader = Reader::new(bytes);
    let count = reader.u16()?;
    let events = (0..count)
        .map(|_| reader.event())
        .collect::<Result<Vec<_>>>()?;
    reader.finish()?;
    Ok(events)
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        let chunk = self.bytes.get(self.offset..end).ok_or_else(|| {
            GameError::Protocol(format!(
                "truncated input: wanted {N} bytes at offset {}, have {}",
                self.offset,
                self.bytes.len()
            ))
        })?;
        self.offset = end;
        let mut out = [0; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Result<u16> {
        self.take().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.take().map(u32::from_be_bytes)
    }

    fn i32(&mut self) -> Result<i32> {
        self.take().map(i32::from_be_bytes)
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GameError::Protocol(format!("invalid bool byte {other}"))),
        }
    }

    fn action(&mut self) -> Result<Action> {
        let action = match self.u8()? {
            kind::MOVEMENT_KEYS => Action::MovementKeys {
                keys: [self.bool()?, self.bool()?, self.bool()?, self.bool()?],
            },
            kind::ATTACK => Action::Attack { target: self.u32()? },
            kind::BUY_ITEM => {
                let code = self.u8()?;
                let item = Item::from_code(code)
                    .ok_or_else(|| GameError::Protocol(format!("unknown item code {code}")))?;
                Action::BuyItem { item }
            }
            kind::USE_POTION => {
                let code = self.u8()?;
                let potion = Potion::from_code(code)
                    .ok_or_else(|| GameError::Protocol(format!("unknown potion code {code}")))?;
                Action::UsePotion { potion }
            }
            kind::CHARACTER_TARGET_SKILL => Action::CharacterTargetSkill {
                slot: self.u32()?,
                target: self.u32()?,
            },
            kind::POSITION_TARGET_SKILL => {
                let slot = self.u32()?;
                let x = self.i32()?;
                let y = self.i32()?;
                Action::PositionTargetSkill {
                    slot,
                    position: Vec2Fixed::from_bits(x, y),
                }
            }
            kind::SELF_SKILL => Action::SelfSkill { slot: self.u32()? },
            kind::UPGRADE_SKILL => Action::UpgradeSkill { slot: self.u32()? },
            0 => return Err(GameError::Protocol("empty action".into())),
            other => return Err(GameError::Protocol(format!("unknown action kind {other}"))),
        };
        Ok(action)
    }

    fn event(&mut self) -> Result<Event> {
        match self.u8()? {
            kind::PLAYER_ACTION => Ok(Event::PlayerAction {
                step: self.u32()?,
                player: self.u32()?,
                action: self.action()?,
            }),
            kind::NO_MORE_EVENTS => Ok(Event::NoMoreEvents { step: self.u32()? }),
            0 => Err(GameError::Protocol("empty event".into())),
            other => Err(GameError::Protocol(format!("unknown event kind {other}"))),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.offset == self.bytes.len() {
            Ok(())
        } else {
            Err(GameError::Protocol(format!(
                "{} trailing bytes",
                self.bytes.len() - self.offset
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use proptest::prelude::*;

    #[test]
    fn test_attack_layout() {
        let bytes = Action::Attack { target: 0x0102_0304 }.encode();
        assert_eq!(bytes, vec![2, 1, 2, 3, 4]);
    }

    #[test]
    fn test_event_layout() {
        let event = Event::PlayerAction {
            step: 7,
            player: 1,
            action: Action::SelfSkill { slot: 2 },
        };
        assert_eq!(
            event.encode(),
            vec![1, 0, 0, 0, 7, 0, 0, 0, 1, 7, 0, 0, 0, 2]
        );
        assert_eq!(Event::NoMoreEvents { step: 9 }.encode(), vec![2, 0, 0, 0, 9]);
    }

    #[test]
    fn test_position_uses_raw_bits() {
        let position = Vec2Fixed::new(Fixed::from_num(-1.5), Fixed::from_num(2));
        let action = Action::PositionTargetSkill { slot: 3, position };
        let bytes = action.encode();
        assert_eq!(&bytes[5..9], &(-98_304_i32).to_be_bytes());
        assert_eq!(Action::decode(&bytes).unwrap(), action);
    }

    #[test]
    fn test_empty_discriminator_rejected() {
        assert!(matches!(Action::decode(&[0]), Err(GameError::Protocol(_))));
        assert!(matches!(Event::decode(&[0, 0, 0, 0, 1]), Err(GameError::Protocol(_))));
    }

    #[test]
    fn test_unknown_codes_rejected() {
        assert!(Action::decode(&[9]).is_err());
        assert!(Action::decode(&[3, 42]).is_err());
        assert!(Action::decode(&[4, 2]).is_err());
        assert!(Action::decode(&[1, 0, 1, 2, 0]).is_err());
    }

    #[test]
    fn test_truncated_and_trailing_rejected() {
        assert!(Event::decode(&[2, 0, 0]).is_err());
        assert!(Event::decode(&[2, 0, 0, 0, 1, 0]).is_err());
        assert!(decode_batch(&[0]).is_err());
        assert!(decode_batch(&[0, 1]).is_err());
    }

    #[test]
    fn test_batch_roundtrip() {
        let events = vec![
            Event::PlayerAction {
                step: 4,
                player: 0,
                action: Action::MovementKeys {
                    keys: [true, false, false, true],
                },
            },
            Event::PlayerAction {
                step: 4,
                player: 2,
                action: Action::BuyItem { item: Item::XpTome },
            },
            Event::NoMoreEvents { step: 4 },
        ];
        let bytes = encode_batch(&events).unwrap();
        assert_eq!(&bytes[..2], &[0, 3]);
        assert_eq!(decode_batch(&bytes).unwrap(), events);
        assert!(decode_batch(&[0, 0]).unwrap().is_empty());
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            any::<[bool; 4]>().prop_map(|keys| Action::MovementKeys { keys }),
            any::<u32>().prop_map(|target| Action::Attack { target }),
            proptest::sample::select(Item::ALL.to_vec()).prop_map(|item| Action::BuyItem { item }),
            prop_oneof![Just(Potion::Hp), Just(Potion::Mp)]
                .prop_map(|potion| Action::UsePotion { potion }),
            (any::<u32>(), any::<u32>())
                .prop_map(|(slot, target)| Action::CharacterTargetSkill { slot, target }),
            (any::<u32>(), any::<i32>(), any::<i32>()).prop_map(|(slot, x, y)| {
                Action::PositionTargetSkill {
                    slot,
                    position: Vec2Fixed::from_bits(x, y),
                }
            }),
            any::<u32>().prop_map(|slot| Action::SelfSkill { slot }),
            any::<u32>().prop_map(|slot| Action::UpgradeSkill { slot }),
        ]
    }

    proptest! {
        #[test]
        fn prop_event_codec_roundtrip(step in any::<u32>(), player in any::<u32>(), action in arb_action()) {
            let event = Event::PlayerAction { step, player, action };
            prop_assert_eq!(Event::decode(&event.encode())?, event);
        }

        #[test]
        fn prop_truncation_always_fails(action in arb_action(), cut in 1usize..8) {
            let bytes = action.encode();
            let keep = bytes.len().saturating_sub(cut);
            prop_assert!(Action::decode(&bytes[..keep]).is_err());
        }
    }
}

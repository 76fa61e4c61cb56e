//! Test fixtures and helpers.
//!
//! Pre-built worlds, matches and input scripts for consistent testing.

use wave_core::config::{MatchConfig, Participant};
use wave_core::entity::{EntityId, PlayerClass};
use wave_core::math::{Fixed, Rect, Vec2Fixed};
use wave_core::protocol::{Action, Event, Step};
use wave_core::simulation::Match;
use wave_core::world::WorldDescription;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Vector shorthand from floats (for tests only).
#[must_use]
pub fn vec2(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed_f(x), fixed_f(y))
}

/// A 40 x 30 obstacle-free field.
#[must_use]
pub fn open_world() -> WorldDescription {
    WorldDescription::open_field(40, 30)
}

/// A 40 x 30 field with pillars between the spawn zones and the goal, so
/// creeps have to steer around obstacles.
#[must_use]
pub fn arena_world() -> WorldDescription {
    WorldDescription::open_field(40, 30)
        .with_obstacle(Rect::from_ints(28, 4, 2, 3))
        .with_obstacle(Rect::from_ints(28, 14, 2, 3))
        .with_obstacle(Rect::from_ints(28, 24, 2, 3))
        .with_obstacle(Rect::from_ints(8, 8, 3, 2))
        .with_obstacle(Rect::from_ints(8, 20, 3, 2))
}

/// Config with one participant per class, in class order.
#[must_use]
pub fn party_config(seed: u32) -> MatchConfig {
    MatchConfig {
        seed,
        participants: PlayerClass::ALL
            .iter()
            .map(|&class| Participant::new(format!("{class:?}").to_lowercase(), class))
            .collect(),
    }
}

/// Single-player match on [`open_world`].
///
/// # Panics
///
/// Panics if the fixture world is invalid.
#[must_use]
pub fn solo_match(class: PlayerClass, seed: u32) -> Match {
    Match::new(open_world(), &MatchConfig::solo(seed, class)).expect("fixture world is valid")
}

/// Four-player match on [`arena_world`].
///
/// # Panics
///
/// Panics if the fixture world is invalid.
#[must_use]
pub fn party_match(seed: u32) -> Match {
    Match::new(arena_world(), &party_config(seed)).expect("fixture world is valid")
}

/// One player action stamped for `step`.
#[must_use]
pub fn action_event(step: Step, player: EntityId, action: Action) -> Event {
    Event::PlayerAction {
        step,
        player,
        action,
    }
}

/// Input script that never sends anything.
#[must_use]
pub fn idle_script(_step: Step) -> Vec<Event> {
    Vec::new()
}

/// Input script where every player changes direction every second,
/// cycling through the compass, and the host casts slot 1 now and then.
#[must_use]
pub fn wandering_script(players: u32) -> impl Fn(Step) -> Vec<Event> + Sync {
    move |step| {
        let mut events = Vec::new();
        if step % 20 == 1 {
            let phase = step / 20;
            for player in 0..players {
                let turn = (phase + player) % 4;
                let keys = [turn == 0, turn == 1, turn == 2, turn == 3];
                events.push(action_event(step, player, Action::MovementKeys { keys }));
            }
        }
        if step % 250 == 5 {
            events.push(action_event(step, 0, Action::SelfSkill { slot: 1 }));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::world::WorldMap;

    #[test]
    fn test_fixture_worlds_validate() {
        assert!(WorldMap::new(open_world()).is_ok());
        assert!(WorldMap::new(arena_world()).is_ok());
    }

    #[test]
    fn test_party_has_every_class() {
        let game = party_match(1);
        assert_eq!(game.players(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_wandering_script_targets_every_player() {
        let script = wandering_script(3);
        assert_eq!(script(1).len(), 3);
        assert!(script(2).is_empty());
        assert!(script(5).is_empty());
        assert_eq!(script(255).len(), 1);
    }
}

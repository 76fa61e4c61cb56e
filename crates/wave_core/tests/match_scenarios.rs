//! End-to-end scenarios across the simulation modules.
//!
//! These drive a full [`Match`] through the public API, the way a
//! participant or the authority server would.

use wave_core::creep_ai::new_creep;
use wave_core::entity::PlayerClass;
use wave_core::error::GameError;
use wave_core::lockstep::LockstepDriver;
use wave_core::math::{Fixed, Rect, Timer, Vec2Fixed};
use wave_core::player::new_player;
use wave_core::protocol::{Action, Event};
use wave_core::replay::{Replay, ReplayPlayer};
use wave_core::rng::SeededRandom;
use wave_core::spatial::SpatialIndex;
use wave_core::tuning::{STEP_MS, TICK_RATE};
use wave_test_utils::determinism::verify_match_determinism;
use wave_test_utils::fixtures::{
    action_event, arena_world, party_config, party_match, solo_match, wandering_script,
};

// =============================================================================
// Kill credit
// =============================================================================

#[test]
fn test_kill_credit_split_thirty_seventy() {
    let mut index = SpatialIndex::new(20, 20);
    let mut credits = Vec::new();
    let position = Vec2Fixed::from_ints(5, 5);
    let mut creep = new_creep(10, 1, position, 3);
    creep.character.hp = Fixed::from_num(100);
    index.insert(10, position, creep.character.radius);

    creep.harm(Fixed::from_num(30), 0, &mut index, &mut credits);
    assert!(credits.is_empty());
    creep.harm(Fixed::from_num(70), 1, &mut index, &mut credits);
    assert!(!index.is_alive(10));
    assert_eq!(credits.len(), 2);

    let mut first = new_player(0, PlayerClass::Knight, "a", Vec2Fixed::from_ints(1, 1), 1);
    let mut second = new_player(1, PlayerClass::Archer, "b", Vec2Fixed::from_ints(2, 2), 2);
    for credit in &credits {
        let player = if credit.player == 0 { &mut first } else { &mut second };
        player.killed_creep(credit.fraction).unwrap();
    }

    assert_eq!(first.as_player().unwrap().gold, 30);
    assert_eq!(second.as_player().unwrap().gold, 70);
}

// =============================================================================
// Spawn search
// =============================================================================

#[test]
fn test_spawn_search_zero_trials_fails() {
    let index = SpatialIndex::new(10, 10);
    let mut rng = SeededRandom::new(5);
    let err = index
        .find_free_spawn_position(&Rect::from_ints(0, 0, 2, 2), Fixed::from_num(0.25), &mut rng, 0)
        .unwrap_err();
    assert!(matches!(err, GameError::NoFreeSpawnPosition { trials: 0 }));
    assert!(!err.is_fatal());
}

#[test]
fn test_spawn_search_crowded_zone_fails() {
    let mut index = SpatialIndex::new(10, 10);
    let mut rng = SeededRandom::new(5);
    let center = Vec2Fixed::new(Fixed::from_num(1.5), Fixed::from_num(1.5));
    index.insert(99, center, Fixed::from_num(3));
    let result = index.find_free_spawn_position(
        &Rect::from_ints(1, 1, 1, 1),
        Fixed::from_num(0.25),
        &mut rng,
        10,
    );
    assert!(matches!(result, Err(GameError::NoFreeSpawnPosition { trials: 10 })));
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn test_second_cast_in_same_step_is_discarded() {
    let mut once = solo_match(PlayerClass::Knight, 7);
    let mut twice = solo_match(PlayerClass::Knight, 7);
    let tank = action_event(1, 0, Action::SelfSkill { slot: 1 });

    once.execute_step(1, &[tank]).unwrap();
    twice.execute_step(1, &[tank, tank]).unwrap();

    assert_eq!(once.state_hash(), twice.state_hash());
    let slot = once.entity(0).unwrap().as_player().unwrap().skills[0];
    assert!(slot.timer > Timer::ZERO);
}

#[test]
fn test_commands_for_other_players_rejected_whole_step() {
    let mut game = solo_match(PlayerClass::Monk, 3);
    let events = [
        action_event(1, 0, Action::MovementKeys { keys: [true, false, false, false] }),
        action_event(1, 2, Action::SelfSkill { slot: 1 }),
    ];
    assert!(matches!(game.execute_step(1, &events), Err(GameError::Protocol(_))));
    assert_eq!(game.step(), 0);
    assert!(game.entity(0).unwrap().character.velocity.is_zero());
}

// =============================================================================
// Lockstep
// =============================================================================

fn close_steps(driver: &mut LockstepDriver, last: u32) {
    for step in 1..=last {
        driver.receive(Event::NoMoreEvents { step }).unwrap();
    }
}

#[test]
fn test_driver_catches_up_five_steps() {
    let mut driver = LockstepDriver::new();
    let mut game = solo_match(PlayerClass::Archer, 1);
    close_steps(&mut driver, 5);

    let executed = driver.advance(STEP_MS + 1, &mut game).unwrap();
    assert_eq!(executed, 5);
    assert_eq!(game.step(), 5);
    assert_eq!(driver.step(), 5);
}

#[test]
fn test_driver_keeps_one_step_buffered_without_time() {
    let mut driver = LockstepDriver::new();
    let mut game = solo_match(PlayerClass::Archer, 1);
    close_steps(&mut driver, 5);

    assert_eq!(driver.advance(0, &mut game).unwrap(), 4);
    assert_eq!(game.step(), 4);
    assert_eq!(driver.advance(STEP_MS + 1, &mut game).unwrap(), 1);
    assert_eq!(game.step(), 5);
}

#[test]
fn test_driver_delivers_actions_to_match() {
    let mut driver = LockstepDriver::new();
    let mut game = solo_match(PlayerClass::Knight, 1);
    driver
        .receive(action_event(1, 0, Action::MovementKeys { keys: [false, false, false, true] }))
        .unwrap();
    driver.receive(Event::NoMoreEvents { step: 1 }).unwrap();

    driver.advance(STEP_MS + 1, &mut game).unwrap();
    assert_eq!(game.step(), 1);
    assert!(!game.entity(0).unwrap().character.velocity.is_zero());
}

// =============================================================================
// Whole matches
// =============================================================================

#[test]
fn test_arena_party_is_deterministic() {
    assert!(verify_match_determinism(
        || party_match(77),
        &wandering_script(4),
        TICK_RATE * 120
    ));
}

#[test]
fn test_recorded_replay_verifies() {
    let script = wandering_script(4);
    let mut game = party_match(31);
    let mut replay = Replay::new(arena_world(), party_config(31));
    for step in 1..=TICK_RATE * 30 {
        let mut events = script(step);
        events.push(Event::NoMoreEvents { step });
        game.execute_step(step, &events).unwrap();
        replay.record_step(step, &events).unwrap();
    }
    replay.finalize(game.state_hash());

    let restored = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
    let mut player = ReplayPlayer::new(restored).unwrap();
    assert!(player.verify().unwrap());
    assert!(player.is_finished());
}

//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the match simulation produces
//! identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep multiplayer only works if every participant computes exactly
//! the same state from the same event lists. Sources of non-determinism
//! include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`wave_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Entities live in a `BTreeMap` and are simulated in ID order.
//!
//! - **System randomness**: Every random draw comes from the match seed.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual behaviors (combat, steering, skills)
//! 2. **Property tests**: Random input scripts must still replay identically
//! 3. **Integration tests**: Full match scenarios are reproducible
//! 4. **Parallel tests**: Running N matches on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use wave_core::protocol::{Event, Step};
use wave_core::simulation::Match;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel match runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each match.
    pub hashes: Vec<u64>,
    /// Number of steps each match ran.
    pub steps: Step,
    /// Number of matches run.
    pub num_matches: usize,
}

impl ParallelSimResult {
    /// Check if all matches produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all matches agreed.
    ///
    /// # Panics
    ///
    /// Panics if matches produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel matches diverged!\n\
                 Matches: {}\n\
                 Steps: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_matches,
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run any state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `steps` - Number of steps to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use wave_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 steps each
///     || solo_match(PlayerClass::Knight, 1),
///     |game| { let next = game.step() + 1; game.execute_step(next, &[]).unwrap(); },
///     |game| game.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, StepFn, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: StepFn,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    StepFn: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Execute the next `steps` steps of `game`, feeding each the events the
/// script produces for it.
///
/// # Panics
///
/// Panics if a step fails; scripts used in tests must be well-formed.
pub fn run_match<S>(game: &mut Match, script: &S, steps: Step)
where
    S: Fn(Step) -> Vec<Event> + ?Sized,
{
    for _ in 0..steps {
        let next = game.step() + 1;
        let events = script(next);
        game.execute_step(next, &events)
            .unwrap_or_else(|e| panic!("step {next} failed: {e}"));
    }
}

/// Run two identically set up matches with the same script and compare
/// their final hashes.
pub fn verify_match_determinism<F, S>(setup_fn: F, script: &S, steps: Step) -> bool
where
    F: Fn() -> Match,
    S: Fn(Step) -> Vec<Event> + ?Sized,
{
    let result = verify_determinism(
        2,
        u64::from(steps),
        &setup_fn,
        |game| run_match(game, script, 1),
        Match::state_hash,
    );
    result.is_deterministic
}

/// Run N matches on scoped threads and collect their final hashes.
///
/// Catches non-determinism that only shows up under different thread
/// scheduling or memory layout.
///
/// # Example
///
/// ```ignore
/// use wave_test_utils::determinism::run_parallel_matches_scoped;
///
/// let result = run_parallel_matches_scoped(|| party_match(3), &idle_script, 8, 500);
/// result.assert_deterministic();
/// ```
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_matches_scoped<F, S>(
    setup_fn: F,
    script: &S,
    num_matches: usize,
    steps: Step,
) -> ParallelSimResult
where
    F: Fn() -> Match + Sync,
    S: Fn(Step) -> Vec<Event> + Sync + ?Sized,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_matches)
            .map(|_| {
                s.spawn(|| {
                    let mut game = setup_fn();
                    run_match(&mut game, script, steps);
                    game.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("match thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        steps,
        num_matches,
    }
}

/// Compare two match runs step by step, finding the first divergence.
///
/// # Returns
///
/// `None` if the matches agree throughout, `Some(step)` for the first step
/// after which their hashes differ.
pub fn find_first_divergence<F, S>(setup_fn: F, script: &S, steps: Step) -> Option<Step>
where
    F: Fn() -> Match,
    S: Fn(Step) -> Vec<Event> + ?Sized,
{
    let mut first = setup_fn();
    let mut second = setup_fn();
    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for _ in 0..steps {
        run_match(&mut first, script, 1);
        run_match(&mut second, script, 1);
        if first.state_hash() != second.state_hash() {
            return Some(first.step());
        }
    }

    None
}

/// Verify that a snapshot taken halfway continues exactly like the
/// original match.
///
/// # Panics
///
/// Panics if the snapshot cannot be written or restored.
pub fn verify_serialization_determinism<F, S>(setup_fn: F, script: &S, steps: Step) -> bool
where
    F: Fn() -> Match,
    S: Fn(Step) -> Vec<Event> + ?Sized,
{
    let mut original = setup_fn();
    let half = steps / 2;
    run_match(&mut original, script, half);

    let bytes = original.serialize().expect("snapshot serializes");
    let mut restored = Match::restore(&bytes).expect("snapshot restores");
    if restored.state_hash() != original.state_hash() {
        return false;
    }

    run_match(&mut original, script, steps - half);
    run_match(&mut restored, script, steps - half);
    original.state_hash() == restored.state_hash()
}

/// Compute a hash of any hashable value.
#[must_use]
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Property-based testing strategies.
pub mod strategies {
    use proptest::prelude::*;
    use wave_core::entity::{EntityId, PlayerClass};
    use wave_core::items::{Item, Potion};
    use wave_core::math::{Fixed, Vec2Fixed};
    use wave_core::protocol::{Action, Event, Step};

    /// Generate a coordinate inside a 40-cell map.
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (0i32..40 * 256).prop_map(|n| Fixed::from_num(n) / 256)
    }

    /// Generate a point inside a 40 x 30 map.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), (0i32..30 * 256).prop_map(|n| Fixed::from_num(n) / 256))
            .prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a damage amount.
    pub fn arb_damage() -> impl Strategy<Value = Fixed> {
        (0i32..200 * 16).prop_map(|n| Fixed::from_num(n) / 16)
    }

    /// Generate a player class.
    pub fn arb_player_class() -> impl Strategy<Value = PlayerClass> {
        proptest::sample::select(PlayerClass::ALL.to_vec())
    }

    /// Generate a shop item.
    pub fn arb_item() -> impl Strategy<Value = Item> {
        proptest::sample::select(Item::ALL.to_vec())
    }

    /// Generate any action with plausible slots and targets.
    pub fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            any::<[bool; 4]>().prop_map(|keys| Action::MovementKeys { keys }),
            (0u32..64).prop_map(|target| Action::Attack { target }),
            arb_item().prop_map(|item| Action::BuyItem { item }),
            prop_oneof![Just(Potion::Hp), Just(Potion::Mp)]
                .prop_map(|potion| Action::UsePotion { potion }),
            (1u32..=5, 0u32..64)
                .prop_map(|(slot, target)| Action::CharacterTargetSkill { slot, target }),
            (1u32..=5, arb_vec2_position())
                .prop_map(|(slot, position)| Action::PositionTargetSkill { slot, position }),
            (1u32..=5).prop_map(|slot| Action::SelfSkill { slot }),
            (1u32..=5).prop_map(|slot| Action::UpgradeSkill { slot }),
        ]
    }

    /// Generate a script of `(step, player, action)` entries for `players`
    /// players within the first `steps` steps, sorted by step.
    pub fn arb_script(
        players: EntityId,
        steps: Step,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(Step, EntityId, Action)>> {
        prop::collection::vec((1..=steps, 0..players, arb_action()), 0..max_len).prop_map(
            |mut entries| {
                entries.sort_by_key(|&(step, _, _)| step);
                entries
            },
        )
    }

    /// Turn a generated script into per-step event lists.
    pub fn script_events(script: &[(Step, EntityId, Action)], step: Step) -> Vec<Event> {
        script
            .iter()
            .filter(|&&(s, _, _)| s == step)
            .map(|&(step, player, action)| Event::PlayerAction {
                step,
                player,
                action,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{idle_script, party_match, solo_match, wandering_script};
    use proptest::prelude::*;
    use wave_core::entity::PlayerClass;

    #[test]
    fn test_verify_determinism_counter() {
        let result = verify_determinism(3, 10, || 0u64, |n| *n += 3, |n| *n);
        assert!(result.is_deterministic);
        assert_eq!(result.unique_hashes(), vec![30]);
    }

    #[test]
    #[should_panic(expected = "non-deterministic")]
    fn test_assert_deterministic_panics() {
        DeterminismResult {
            is_deterministic: false,
            hashes: vec![1, 2],
            steps: 1,
        }
        .assert_deterministic();
    }

    #[test]
    fn test_solo_match_is_deterministic() {
        assert!(verify_match_determinism(
            || solo_match(PlayerClass::Archer, 5),
            &wandering_script(1),
            600
        ));
    }

    #[test]
    fn test_no_divergence_in_party() {
        assert_eq!(
            find_first_divergence(|| party_match(8), &wandering_script(4), 400),
            None
        );
    }

    #[test]
    fn test_parallel_matches_agree() {
        run_parallel_matches_scoped(|| party_match(12), &wandering_script(4), 4, 300)
            .assert_deterministic();
    }

    #[test]
    fn test_snapshot_continues_identically() {
        assert!(verify_serialization_determinism(
            || party_match(21),
            &wandering_script(4),
            800
        ));
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = solo_match(PlayerClass::Mage, 1);
        let mut b = solo_match(PlayerClass::Mage, 2);
        run_match(&mut a, &idle_script, 300);
        run_match(&mut b, &idle_script, 300);
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_random_scripts_replay_identically(
            seed in any::<u32>(),
            script in arb_script(4, 200, 40),
        ) {
            let events = |step| script_events(&script, step);
            prop_assert!(verify_match_determinism(|| party_match(seed), &events, 200));
        }
    }
}

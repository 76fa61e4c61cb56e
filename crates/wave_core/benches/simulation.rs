//! Simulation benchmarks for wave_core.
//!
//! Run with: `cargo bench -p wave_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use wave_core::config::{MatchConfig, Participant};
use wave_core::entity::PlayerClass;
use wave_core::math::{Fixed, Vec2Fixed};
use wave_core::protocol::{decode_batch, encode_batch, Action, Event};
use wave_core::simulation::Match;
use wave_core::spatial::SpatialIndex;
use wave_core::tuning::TICK_RATE;
use wave_core::world::WorldDescription;

fn four_player_config() -> MatchConfig {
    MatchConfig {
        seed: 2024,
        participants: PlayerClass::ALL
            .iter()
            .map(|&class| Participant::new(format!("{class:?}"), class))
            .collect(),
    }
}

/// A match that has been running for three minutes, so guards and a crowd
/// of creeps are on the map.
fn populated_match() -> Match {
    let mut game = Match::new(WorldDescription::open_field(60, 40), &four_player_config())
        .expect("valid benchmark world");
    for step in 1..=TICK_RATE * 180 {
        game.execute_step(step, &[]).expect("step");
    }
    game
}

pub fn simulation_benchmark(c: &mut Criterion) {
    let populated = populated_match();

    c.bench_function("match_step_populated", |b| {
        b.iter_batched(
            || populated.clone(),
            |mut game| {
                let next = game.step() + 1;
                game.execute_step(next, &[]).expect("step");
                black_box(game.state_hash())
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("state_hash", |b| b.iter(|| black_box(populated.state_hash())));

    c.bench_function("snapshot_roundtrip", |b| {
        b.iter(|| {
            let bytes = populated.serialize().expect("serialize");
            black_box(Match::restore(&bytes).expect("restore"))
        })
    });
}

pub fn spatial_benchmark(c: &mut Criterion) {
    let mut index = SpatialIndex::new(100, 100);
    let radius = Fixed::from_num(0.35);
    for id in 0..2000u32 {
        let x = Fixed::from_num(id % 100) + Fixed::from_num(0.5);
        let y = Fixed::from_num((id * 7) % 100) + Fixed::from_num(0.5);
        index.insert(id, Vec2Fixed::new(x, y), radius);
    }
    let probe = Vec2Fixed::new(Fixed::from_num(50), Fixed::from_num(50));

    c.bench_function("spatial_collides", |b| {
        b.iter(|| black_box(index.collides(black_box(probe), radius, None)))
    });
    c.bench_function("spatial_at_with_tolerance", |b| {
        b.iter(|| black_box(index.at_with_tolerance(black_box(probe), Fixed::from_num(3))))
    });
}

pub fn protocol_benchmark(c: &mut Criterion) {
    let events: Vec<Event> = (0..64u32)
        .map(|i| Event::PlayerAction {
            step: 10,
            player: i % 4,
            action: Action::CharacterTargetSkill { slot: 1, target: i },
        })
        .chain(std::iter::once(Event::NoMoreEvents { step: 10 }))
        .collect();
    let bytes = encode_batch(&events).expect("encode");

    c.bench_function("encode_batch_65", |b| b.iter(|| black_box(encode_batch(black_box(&events)))));
    c.bench_function("decode_batch_65", |b| b.iter(|| black_box(decode_batch(black_box(&bytes)))));
}

criterion_group!(benches, simulation_benchmark, spatial_benchmark, protocol_benchmark);
criterion_main!(benches);

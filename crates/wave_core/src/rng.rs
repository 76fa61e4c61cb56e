//! Seeded pseudo-random numbers for simulation decisions.
//!
//! Every random choice in a match (spawn positions, creep speed jitter,
//! target selection, wander angles) draws from a [`SeededRandom`]. The match
//! owns one stream; each entity owns a private stream seeded from it at
//! creation, so entity behaviour never depends on who else drew first.

use serde::{Deserialize, Serialize};

/// Xorshift32 generator. Serializable so snapshots resume identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    /// Creates a new RNG with the given seed.
    /// Seed of 0 is treated as 1 to avoid the all-zero fixed point.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Returns the next raw u32 value.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns an integer from 0 (inclusive) to `max` (exclusive).
    pub fn next_int(&mut self, max: u32) -> u32 {
        ((u64::from(self.next_u32()) * u64::from(max)) >> 32) as u32
    }

    /// Returns an integer in `low..=high`.
    pub fn range_inclusive(&mut self, low: i32, high: i32) -> i32 {
        let span = (i64::from(high) - i64::from(low) + 1) as u32;
        low + self.next_int(span) as i32
    }

    /// Returns a uniformly chosen element, or `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            Some(&slice[self.next_int(slice.len() as u32) as usize])
        }
    }

    /// Derives the seed for a child stream (one per spawned entity).
    pub fn fork_seed(&mut self) -> u32 {
        self.next_u32()
    }

    /// Current internal state.
    #[must_use]
    pub const fn state(&self) -> u32 {
        self.state
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::new(1)
    }
}

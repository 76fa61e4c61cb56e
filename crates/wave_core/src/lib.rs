//! # Wave Core
//!
//! Deterministic lockstep simulation for a co-operative wave-defense game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO beyond replay and configuration files
//! - No system randomness
//! - No floating-point math in gameplay state (uses fixed-point)
//!
//! This separation enables:
//! - Lockstep multiplayer (identical simulation on every participant)
//! - A headless authority server
//! - Replays and desync diagnosis
//!
//! ## Crate Structure
//!
//! - [`math`] - Fixed-point numbers, vectors, orientations, rectangles
//! - [`world`] - Read-only map geometry and line of sight
//! - [`spatial`] - Per-cell index of living entities
//! - [`entity`] / [`combat`] - Characters, conditions, damage and healing
//! - [`creep_ai`] - Creep steering and targeting
//! - [`skills`] / [`items`] / [`player`] - Player command surface
//! - [`protocol`] - Actions, events and their byte codec
//! - [`lockstep`] - Fixed-timestep driver with catch-up
//! - [`simulation`] - The match and its per-step update
//! - [`replay`] - Recording and playback
//! - [`config`] / [`rng`] - Match roster and seeded randomness

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod config;
pub mod creep_ai;
pub mod entity;
pub mod error;
pub mod items;
pub mod lockstep;
pub mod math;
pub mod player;
pub mod protocol;
pub mod replay;
pub mod rng;
pub mod simulation;
pub mod skills;
pub mod spatial;
pub mod tuning;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{MatchConfig, Participant};
    pub use crate::entity::{Entity, EntityId, PlayerClass};
    pub use crate::error::{GameError, Result};
    pub use crate::items::{Item, Potion};
    pub use crate::lockstep::{DriverState, LockstepDriver, StepExecutor};
    pub use crate::math::{Fixed, Timer, Vec2Fixed};
    pub use crate::protocol::{decode_batch, encode_batch, Action, Event, Step};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::simulation::{Match, Outcome};
    pub use crate::world::{WorldDescription, WorldMap};
}

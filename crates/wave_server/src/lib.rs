//! # Wave Authority Server
//!
//! Headless host for multiplayer matches.
//!
//! The host runs its own copy of the simulation as player 0 and is the
//! single authority that turns participant actions into step-stamped
//! events. Remote participants connect over a framed TCP relay and run
//! identical simulations from the event batches they receive.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod authority;
pub mod config;
pub mod error;
pub mod network;
pub mod session;

pub use authority::{Authority, Host};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use session::{spawn_session, SessionCommand, SessionHandle};

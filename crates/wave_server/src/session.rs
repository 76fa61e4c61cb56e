//! The session task.
//!
//! One task owns the [`Host`]. Network tasks talk to it only through
//! channels: participant actions and connection changes come in over an
//! `mpsc` channel, encoded event batches go out over a `broadcast` channel.
//! The task wakes on a fixed interval and advances the host by the interval
//! length.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use wave_core::entity::EntityId;
use wave_core::protocol::{encode_batch, Action};
use wave_core::simulation::Outcome;
use wave_core::tuning::STEP_MS;

use crate::authority::Host;
use crate::error::{Result, ServerError};

/// Frame length of the session loop. Several frames per step keep the
/// one-third build threshold meaningful.
pub const FRAME_MS: u32 = STEP_MS / 4;

/// Capacity of the command channel.
pub const COMMAND_BUFFER: usize = 256;

/// Capacity of the batch broadcast channel, in steps.
pub const BATCH_BUFFER: usize = 128;

/// Messages from network tasks to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// A participant sent an action.
    Action {
        /// Sender.
        player: EntityId,
        /// What they want to do.
        action: Action,
    },
    /// A participant's connection came up.
    Connected {
        /// Participant.
        player: EntityId,
    },
    /// A participant's connection went away.
    Disconnected {
        /// Participant.
        player: EntityId,
    },
    /// Stop the session and return the host.
    Shutdown,
}

/// Encoded event list of one step, shared by all connection tasks.
pub type Batch = Arc<[u8]>;

/// Cloneable access to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    batches: broadcast::Sender<Batch>,
}

impl SessionHandle {
    /// Send a command to the session.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::SessionClosed`] if the session has ended.
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServerError::SessionClosed)
    }

    /// Receive every batch produced from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Batch> {
        self.batches.subscribe()
    }
}

/// Start the session on the current runtime.
#[must_use]
pub fn spawn_session(host: Host) -> (SessionHandle, tokio::task::JoinHandle<Result<Host>>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (batch_tx, _) = broadcast::channel(BATCH_BUFFER);
    let handle = SessionHandle {
        commands: command_tx,
        batches: batch_tx.clone(),
    };
    let task = tokio::spawn(run_session(
        host,
        command_rx,
        batch_tx,
        Duration::from_millis(u64::from(FRAME_MS)),
    ));
    (handle, task)
}

/// Drive `host` until a shutdown command arrives, every command sender is
/// gone, or the match is decided. Returns the host in its final state.
///
/// # Errors
///
/// Propagates fatal simulation and codec errors.
pub async fn run_session(
    mut host: Host,
    mut commands: mpsc::Receiver<SessionCommand>,
    batches: broadcast::Sender<Batch>,
    frame: Duration,
) -> Result<Host> {
    let frame_ms = u32::try_from(frame.as_millis()).unwrap_or(u32::MAX);
    let mut interval = tokio::time::interval(frame);
    info!(frame_ms, players = host.authority().num_players(), "Session started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => apply_command(&mut host, command),
                }
            }
            _ = interval.tick() => {
                match host.frame(frame_ms) {
                    Ok(Some(events)) => {
                        let batch: Batch = encode_batch(&events)?.into();
                        // No receivers just means nobody is connected right now.
                        let _ = batches.send(batch);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(%e, step = host.game().step(), "Session step failed");
                        return Err(e);
                    }
                }
                if host.game().outcome() != Outcome::InProgress {
                    info!(step = host.game().step(), outcome = ?host.game().outcome(), "Match decided");
                    break;
                }
            }
        }
    }

    info!(step = host.game().step(), "Session ended");
    Ok(host)
}

fn apply_command(host: &mut Host, command: SessionCommand) {
    let authority = host.authority_mut();
    let result = match command {
        SessionCommand::Action { player, action } => authority.queue_action(player, action),
        SessionCommand::Connected { player } => authority.connect(player),
        SessionCommand::Disconnected { player } => authority.disconnect(player),
        SessionCommand::Shutdown => Ok(()),
    };
    if let Err(e) = result {
        warn!(%e, "Rejected session command");
    }
}

//! Authoritative game simulation modules

pub mod engine;
pub mod spawn;
pub mod state;

pub use engine::GameEngine;
pub use state::{Bullet, GameState, Player};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::ws::protocol::UpdateData;

/// Maximum number of concurrently connected players
pub const MAX_SESSIONS: usize = 50;

/// Arena dimensions in pixels
pub const CANVAS_WIDTH: f64 = 800.0;
pub const CANVAS_HEIGHT: f64 = 600.0;

/// Player circle radius at spawn and after being hit
pub const PLAYER_INITIAL_SIZE: f64 = 20.0;
/// Growth stops at this radius
pub const PLAYER_MAX_SIZE: f64 = 100.0;
/// Radius gained per second of being alive
pub const PLAYER_GROWTH_RATE: f64 = 0.1;
/// Client-side movement speed, sent in the init config
pub const PLAYER_SPEED: f64 = 5.0;

/// Bullet velocity magnitude per tick
pub const BULLET_SPEED: f64 = 10.0;
/// Bullets older than this are culled
pub const BULLET_MAX_AGE_SECS: f64 = 5.0;

/// Distance from the arena edge for respawn positions
pub const RESPAWN_EDGE_MARGIN: f64 = 50.0;
/// New players spawn at least this far from every edge
pub const SPAWN_INTERIOR_MARGIN: f64 = 100.0;

/// Simulation tick rate
pub const SIMULATION_TPS: u32 = 60;

/// Errors surfaced by game state mutations
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Server is full")]
    CapacityExceeded,
}

/// Pre-serialized outbound frames are pushed into this per-connection channel
pub type ConnectionHandle = mpsc::Sender<String>;

/// Per-connection outbound buffer, in frames. Fanout never blocks on a
/// slow client; a full buffer drops the frame instead.
pub const OUTBOUND_BUFFER: usize = 64;

/// Operations a session can request from the engine task.
///
/// All state mutation happens on the engine task; sessions only ever
/// talk to it through these commands.
#[derive(Debug)]
pub enum GameCommand {
    /// New connection accepted; reply carries the assigned player id
    /// or a capacity error.
    Join {
        conn: ConnectionHandle,
        reply: oneshot::Sender<Result<String, GameError>>,
    },
    /// Position/angle update from the client
    Update { player_id: String, data: UpdateData },
    /// Fire a bullet along the player's current angle
    Shoot { player_id: String },
    /// Change display name
    Rename { player_id: String, name: String },
    /// Connection closed
    Leave { player_id: String },
}

/// Handle to the running engine task
#[derive(Clone)]
pub struct GameHandle {
    pub cmd_tx: mpsc::Sender<GameCommand>,
    player_count: Arc<AtomicUsize>,
}

impl GameHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<GameCommand>, player_count: Arc<AtomicUsize>) -> Self {
        Self {
            cmd_tx,
            player_count,
        }
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

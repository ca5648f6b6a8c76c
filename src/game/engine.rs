//! Simulation tick loop, command handling, and broadcast fanout
//!
//! The engine task exclusively owns [`GameState`]; every mutation runs to
//! completion on this task before the next command or tick phase, so no
//! client can ever observe a torn intermediate state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::util::time::now_secs;
use crate::ws::protocol::{ClientConfig, ServerMsg, StateData};

use super::state::GameState;
use super::{
    ConnectionHandle, GameCommand, GameError, GameHandle, CANVAS_HEIGHT, CANVAS_WIDTH,
    PLAYER_SPEED, SIMULATION_TPS,
};

/// The authoritative simulation task
pub struct GameEngine {
    state: GameState,
    cmd_rx: mpsc::Receiver<GameCommand>,
    player_count: Arc<AtomicUsize>,
}

impl GameEngine {
    pub fn new() -> (Self, GameHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));
        let handle = GameHandle::new(cmd_tx, player_count.clone());

        let engine = Self {
            state: GameState::new(),
            cmd_rx,
            player_count,
        };
        (engine, handle)
    }

    /// Run the tick loop for the lifetime of the process.
    ///
    /// A failed tick is logged and followed by a one second backoff;
    /// the loop itself never terminates.
    pub async fn run(mut self) {
        info!(tps = SIMULATION_TPS, "Game engine started");

        let tick_duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        error!(error = %e, "Tick failed, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    self.apply(cmd);
                }
            }
        }
    }

    /// One simulation step: integrate bullets, grow players, resolve
    /// collisions, broadcast the snapshot.
    fn tick(&mut self) -> anyhow::Result<()> {
        let now = now_secs();

        self.state.update_bullets(now);
        self.state.grow_players(now);
        let hits = self.state.check_collisions();

        let snapshot = ServerMsg::State {
            data: StateData {
                players: self.state.players.clone(),
                bullets: self.state.bullets.clone(),
            },
            hits,
        };
        self.broadcast(&snapshot, None)
    }

    /// Apply a single session command.
    fn apply(&mut self, cmd: GameCommand) {
        let now = now_secs();

        match cmd {
            GameCommand::Join { conn, reply } => {
                let _ = reply.send(self.handle_join(conn, now));
            }
            GameCommand::Update { player_id, data } => {
                self.state.update_player(&player_id, &data, now);
            }
            GameCommand::Shoot { player_id } => {
                if let Some(bullet) = self.state.create_bullet(&player_id, now) {
                    if let Err(e) = self.broadcast(&ServerMsg::BulletCreated { bullet }, None) {
                        error!(error = %e, "Failed to announce bullet");
                    }
                }
            }
            GameCommand::Rename { player_id, name } => {
                if self.state.rename_player(&player_id, &name) {
                    let msg = ServerMsg::PlayerNameChanged {
                        player_id,
                        name: name.trim().to_string(),
                    };
                    if let Err(e) = self.broadcast(&msg, None) {
                        error!(error = %e, "Failed to announce name change");
                    }
                } else {
                    self.send_to(
                        &player_id,
                        &ServerMsg::Error {
                            message: "Invalid name".to_string(),
                        },
                    );
                }
            }
            GameCommand::Leave { player_id } => {
                if self.state.players.contains_key(&player_id) {
                    self.drop_player(&player_id);
                    if let Err(e) = self.broadcast(&ServerMsg::PlayerLeft { player_id }, None) {
                        error!(error = %e, "Failed to announce leave");
                    }
                }
            }
        }
    }

    /// Register a new player, deliver its init message, and announce it
    /// to everyone else.
    fn handle_join(&mut self, conn: ConnectionHandle, now: f64) -> Result<String, GameError> {
        let player_id = Uuid::new_v4().to_string();
        let player = self.state.add_player(&player_id, conn, now)?;
        self.player_count
            .store(self.state.players.len(), Ordering::Relaxed);

        let init = ServerMsg::Init {
            player_id: player_id.clone(),
            player: player.clone(),
            config: ClientConfig {
                canvas_width: CANVAS_WIDTH,
                canvas_height: CANVAS_HEIGHT,
                player_speed: PLAYER_SPEED,
            },
        };
        self.send_to(&player_id, &init);

        let joined = ServerMsg::PlayerJoined {
            player_id: player_id.clone(),
            player,
        };
        if let Err(e) = self.broadcast(&joined, Some(&player_id)) {
            error!(error = %e, "Failed to announce join");
        }

        Ok(player_id)
    }

    /// Serialize once and push the frame to every live connection except
    /// the excluded id. Closed connections are pruned after the pass and
    /// a leave notice is broadcast for each.
    fn broadcast(&mut self, msg: &ServerMsg, exclude: Option<&str>) -> anyhow::Result<()> {
        let frame = serde_json::to_string(msg)?;
        let mut dead = Vec::new();

        for (player_id, conn) in &self.state.connections {
            if exclude == Some(player_id.as_str()) {
                continue;
            }

            match conn.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(player_id = %player_id, "Outbound buffer full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(player_id = %player_id, "Connection closed during broadcast");
                    dead.push(player_id.clone());
                }
            }
        }

        for player_id in dead {
            self.drop_player(&player_id);
            self.broadcast(&ServerMsg::PlayerLeft { player_id }, None)?;
        }

        Ok(())
    }

    /// Best-effort send to a single connection.
    fn send_to(&mut self, player_id: &str, msg: &ServerMsg) {
        let frame = match serde_json::to_string(msg) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        if let Some(conn) = self.state.connections.get(player_id) {
            if conn.try_send(frame).is_err() {
                warn!(player_id, "Direct send failed");
            }
        }
    }

    fn drop_player(&mut self, player_id: &str) {
        self.state.remove_player(player_id);
        self.player_count
            .store(self.state.players.len(), Ordering::Relaxed);
    }
}

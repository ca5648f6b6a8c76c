//! Entity records and the authoritative game state store

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ws::protocol::{HitRecord, UpdateData};

use super::spawn::{random_color, random_edge_position, random_interior_position};
use super::{
    ConnectionHandle, GameError, BULLET_MAX_AGE_SECS, BULLET_SPEED, CANVAS_HEIGHT, CANVAS_WIDTH,
    MAX_SESSIONS, PLAYER_GROWTH_RATE, PLAYER_INITIAL_SIZE, PLAYER_MAX_SIZE,
};

/// A player circle. Serialized as-is onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Facing angle in radians, unconstrained
    pub angle: f64,
    /// Circle radius, also the hit radius
    pub size: f64,
    /// `#rrggbb`, fixed at creation
    pub color: String,
    /// Unix seconds of the last movement update or growth step
    pub last_update: f64,
}

/// A bullet in flight. Serialized as-is onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub owner_id: String,
    pub created_at: f64,
}

/// All mutable game state, owned exclusively by the engine task.
///
/// Players and bullets live in `BTreeMap`s so iteration order (and with it
/// multi-hit resolution order) is the ascending id order, not whatever a
/// hash map happens to produce.
pub struct GameState {
    pub players: BTreeMap<String, Player>,
    pub bullets: BTreeMap<String, Bullet>,
    pub connections: BTreeMap<String, ConnectionHandle>,
    bullet_counter: u64,
    player_counter: u64,
    rng: ChaCha8Rng,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            bullets: BTreeMap::new(),
            connections: BTreeMap::new(),
            bullet_counter: 0,
            player_counter: 0,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Register a new player and its outbound connection.
    ///
    /// Fails without mutating anything when the session limit is reached.
    pub fn add_player(
        &mut self,
        player_id: &str,
        conn: ConnectionHandle,
        now: f64,
    ) -> Result<Player, GameError> {
        if self.players.len() >= MAX_SESSIONS {
            return Err(GameError::CapacityExceeded);
        }

        self.player_counter += 1;
        let name = format!("player{}", self.player_counter);
        let (x, y) = random_interior_position(&mut self.rng);
        let color = random_color(&mut self.rng);

        let player = Player {
            id: player_id.to_string(),
            name,
            x,
            y,
            angle: 0.0,
            size: PLAYER_INITIAL_SIZE,
            color,
            last_update: now,
        };

        self.players.insert(player_id.to_string(), player.clone());
        self.connections.insert(player_id.to_string(), conn);
        info!(
            player_id,
            name = %player.name,
            total = self.players.len(),
            "Player joined"
        );
        Ok(player)
    }

    /// Remove a player and its connection. Idempotent.
    pub fn remove_player(&mut self, player_id: &str) {
        self.players.remove(player_id);
        self.connections.remove(player_id);
        info!(player_id, total = self.players.len(), "Player left");
    }

    /// Apply a partial position/angle update. Unknown ids are ignored.
    pub fn update_player(&mut self, player_id: &str, data: &UpdateData, now: f64) {
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };

        if let Some(x) = data.x {
            player.x = x.clamp(0.0, CANVAS_WIDTH);
        }
        if let Some(y) = data.y {
            player.y = y.clamp(0.0, CANVAS_HEIGHT);
        }
        if let Some(angle) = data.angle {
            player.angle = angle;
        }
        player.last_update = now;
    }

    /// Validate and apply a name change. Returns false (and leaves the
    /// name untouched) for unknown ids, empty names, or names longer
    /// than 20 characters after trimming.
    pub fn rename_player(&mut self, player_id: &str, name: &str) -> bool {
        let Some(player) = self.players.get_mut(player_id) else {
            return false;
        };

        let name = name.trim();
        if name.is_empty() || name.chars().count() > 20 {
            return false;
        }

        player.name = name.to_string();
        info!(player_id, name, "Player renamed");
        true
    }

    /// Spawn a bullet at the owner's circle boundary along its facing
    /// angle. Returns None for unknown ids.
    pub fn create_bullet(&mut self, player_id: &str, now: f64) -> Option<Bullet> {
        let player = self.players.get(player_id)?;

        self.bullet_counter += 1;
        let bullet = Bullet {
            id: format!("{}_{}", player_id, self.bullet_counter),
            x: player.x + player.angle.cos() * player.size,
            y: player.y + player.angle.sin() * player.size,
            vx: player.angle.cos() * BULLET_SPEED,
            vy: player.angle.sin() * BULLET_SPEED,
            owner_id: player_id.to_string(),
            created_at: now,
        };

        self.bullets.insert(bullet.id.clone(), bullet.clone());
        Some(bullet)
    }

    /// Integrate bullet positions and cull bullets that left the arena
    /// or outlived their maximum age.
    pub fn update_bullets(&mut self, now: f64) {
        self.bullets.retain(|_, bullet| {
            bullet.x += bullet.vx;
            bullet.y += bullet.vy;

            bullet.x >= 0.0
                && bullet.x <= CANVAS_WIDTH
                && bullet.y >= 0.0
                && bullet.y <= CANVAS_HEIGHT
                && now - bullet.created_at <= BULLET_MAX_AGE_SECS
        });
    }

    /// Grow every player by the wall-clock time elapsed since its last
    /// update, capped at the maximum size.
    pub fn grow_players(&mut self, now: f64) {
        for player in self.players.values_mut() {
            let elapsed = now - player.last_update;
            if elapsed > 0.0 {
                player.size =
                    (player.size + PLAYER_GROWTH_RATE * elapsed).min(PLAYER_MAX_SIZE);
                player.last_update = now;
            }
        }
    }

    /// Detect and resolve bullet/player collisions.
    ///
    /// All hit triples are collected first (bullets outer, players inner,
    /// both in ascending id order), then applied: each hit bullet is
    /// removed and each hit player resets to the initial size at a fresh
    /// edge position. A player hit by several bullets in one tick is
    /// reset once per hit; the last triple wins its final position.
    pub fn check_collisions(&mut self) -> Vec<HitRecord> {
        let mut hits = Vec::new();

        for bullet in self.bullets.values() {
            for player in self.players.values() {
                if bullet.owner_id == player.id {
                    continue;
                }

                let dx = bullet.x - player.x;
                let dy = bullet.y - player.y;
                if (dx * dx + dy * dy).sqrt() < player.size {
                    hits.push(HitRecord {
                        bullet_id: bullet.id.clone(),
                        player_id: player.id.clone(),
                        shooter_id: bullet.owner_id.clone(),
                    });
                }
            }
        }

        for hit in &hits {
            self.bullets.remove(&hit.bullet_id);

            if let Some(player) = self.players.get_mut(&hit.player_id) {
                player.size = PLAYER_INITIAL_SIZE;
                let (x, y) = random_edge_position(&mut self.rng);
                player.x = x;
                player.y = y;
            }
        }

        hits
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::RESPAWN_EDGE_MARGIN;
    use tokio::sync::mpsc;

    fn conn() -> ConnectionHandle {
        mpsc::channel(8).0
    }

    fn state_with_player(id: &str) -> GameState {
        let mut state = GameState::new();
        state.add_player(id, conn(), 0.0).unwrap();
        state
    }

    fn place(state: &mut GameState, id: &str, x: f64, y: f64, angle: f64, size: f64) {
        let player = state.players.get_mut(id).unwrap();
        player.x = x;
        player.y = y;
        player.angle = angle;
        player.size = size;
    }

    #[test]
    fn test_add_player_defaults() {
        let mut state = GameState::new();
        let p1 = state.add_player("a", conn(), 10.0).unwrap();
        let p2 = state.add_player("b", conn(), 10.0).unwrap();

        assert_eq!(p1.name, "player1");
        assert_eq!(p2.name, "player2");
        assert_eq!(p1.size, PLAYER_INITIAL_SIZE);
        assert!((100.0..=700.0).contains(&p1.x));
        assert!((100.0..=500.0).contains(&p1.y));
        assert!(p1.color.starts_with('#'));
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.connections.len(), 2);
    }

    #[test]
    fn test_capacity_bound() {
        let mut state = GameState::new();
        for i in 0..MAX_SESSIONS {
            state.add_player(&format!("p{i}"), conn(), 0.0).unwrap();
        }

        let result = state.add_player("overflow", conn(), 0.0);
        assert!(matches!(result, Err(GameError::CapacityExceeded)));
        assert_eq!(state.players.len(), MAX_SESSIONS);
        assert!(!state.players.contains_key("overflow"));
    }

    #[test]
    fn test_remove_player_is_idempotent() {
        let mut state = state_with_player("a");
        state.remove_player("a");
        state.remove_player("a");
        state.remove_player("never-existed");

        assert!(state.players.is_empty());
        assert!(state.connections.is_empty());
    }

    #[test]
    fn test_update_player_clamps_position() {
        let mut state = state_with_player("a");
        let data = UpdateData {
            x: Some(-50.0),
            y: Some(10_000.0),
            angle: Some(7.5),
        };
        state.update_player("a", &data, 5.0);

        let player = &state.players["a"];
        assert_eq!(player.x, 0.0);
        assert_eq!(player.y, CANVAS_HEIGHT);
        assert_eq!(player.angle, 7.5);
        assert_eq!(player.last_update, 5.0);
    }

    #[test]
    fn test_update_player_partial_fields() {
        let mut state = state_with_player("a");
        place(&mut state, "a", 400.0, 300.0, 1.0, 20.0);

        let data = UpdateData {
            x: Some(100.0),
            y: None,
            angle: None,
        };
        state.update_player("a", &data, 1.0);

        let player = &state.players["a"];
        assert_eq!(player.x, 100.0);
        assert_eq!(player.y, 300.0);
        assert_eq!(player.angle, 1.0);

        // Unknown id is a no-op
        state.update_player("ghost", &data, 1.0);
    }

    #[test]
    fn test_rename_validation() {
        let mut state = state_with_player("a");

        assert!(!state.rename_player("a", ""));
        assert!(!state.rename_player("a", "   "));
        assert!(!state.rename_player("a", "abcdefghijklmnopqrstuvwxy"));
        assert_eq!(state.players["a"].name, "player1");

        assert!(state.rename_player("a", "  Ace  "));
        assert_eq!(state.players["a"].name, "Ace");

        assert!(!state.rename_player("ghost", "Ace"));
    }

    #[test]
    fn test_shoot_spawns_at_circle_boundary() {
        let mut state = state_with_player("a");
        place(&mut state, "a", 400.0, 300.0, 0.0, 20.0);

        let bullet = state.create_bullet("a", 1.0).unwrap();
        assert_eq!(bullet.x, 420.0);
        assert_eq!(bullet.y, 300.0);
        assert_eq!(bullet.vx, 10.0);
        assert_eq!(bullet.vy, 0.0);
        assert_eq!(bullet.owner_id, "a");
        assert_eq!(bullet.created_at, 1.0);

        assert!(state.create_bullet("ghost", 1.0).is_none());
    }

    #[test]
    fn test_bullet_ids_are_unique() {
        let mut state = GameState::new();
        state.add_player("a", conn(), 0.0).unwrap();
        state.add_player("b", conn(), 0.0).unwrap();

        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(state.create_bullet("a", 0.0).unwrap().id));
            assert!(ids.insert(state.create_bullet("b", 0.0).unwrap().id));
        }
        assert_eq!(state.bullets.len(), 200);
    }

    #[test]
    fn test_bullet_integration_and_expiry() {
        let mut state = state_with_player("a");
        place(&mut state, "a", 400.0, 300.0, 0.0, 20.0);

        let bullet = state.create_bullet("a", 100.0).unwrap();
        state.update_bullets(100.0);
        let moved = &state.bullets[&bullet.id];
        assert_eq!(moved.x, 430.0);
        assert_eq!(moved.y, 300.0);

        // Too old
        state.bullets.get_mut(&bullet.id).unwrap().created_at = 94.0;
        state.update_bullets(100.0);
        assert!(state.bullets.is_empty());

        // Out of bounds
        place(&mut state, "a", 795.0, 300.0, 0.0, 20.0);
        let bullet = state.create_bullet("a", 100.0).unwrap();
        state.update_bullets(100.0);
        assert!(!state.bullets.contains_key(&bullet.id));
    }

    #[test]
    fn test_growth_is_monotonic_and_capped() {
        let mut state = GameState::new();
        state.add_player("a", conn(), 100.0).unwrap();

        state.grow_players(110.0);
        let size = state.players["a"].size;
        assert_eq!(size, PLAYER_INITIAL_SIZE + 1.0);
        assert_eq!(state.players["a"].last_update, 110.0);

        state.grow_players(120.0);
        assert!(state.players["a"].size > size);

        state.grow_players(110_000.0);
        assert_eq!(state.players["a"].size, PLAYER_MAX_SIZE);

        // Clock going backwards must not shrink anyone
        state.grow_players(0.0);
        assert_eq!(state.players["a"].size, PLAYER_MAX_SIZE);
    }

    #[test]
    fn test_hit_registers_inside_radius_only() {
        let mut state = GameState::new();
        state.add_player("shooter", conn(), 0.0).unwrap();
        state.add_player("target", conn(), 0.0).unwrap();
        place(&mut state, "shooter", 700.0, 500.0, 0.0, 20.0);
        place(&mut state, "target", 300.0, 300.0, 0.0, 90.0);

        // 95 units away: no hit
        state.bullets.insert(
            "shooter_1".into(),
            Bullet {
                id: "shooter_1".into(),
                x: 395.0,
                y: 300.0,
                vx: -10.0,
                vy: 0.0,
                owner_id: "shooter".into(),
                created_at: 0.0,
            },
        );
        assert!(state.check_collisions().is_empty());
        state.bullets.clear();

        // 85 units away: hit
        state.bullets.insert(
            "shooter_2".into(),
            Bullet {
                id: "shooter_2".into(),
                x: 385.0,
                y: 300.0,
                vx: -10.0,
                vy: 0.0,
                owner_id: "shooter".into(),
                created_at: 0.0,
            },
        );
        let hits = state.check_collisions();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].bullet_id, "shooter_2");
        assert_eq!(hits[0].player_id, "target");
        assert_eq!(hits[0].shooter_id, "shooter");
        assert!(state.bullets.is_empty());
    }

    #[test]
    fn test_hit_resets_size_and_respawns_on_edge() {
        let mut state = GameState::new();
        state.add_player("shooter", conn(), 0.0).unwrap();
        state.add_player("target", conn(), 0.0).unwrap();
        place(&mut state, "shooter", 700.0, 500.0, 0.0, 20.0);
        place(&mut state, "target", 300.0, 300.0, 0.0, 90.0);

        state.bullets.insert(
            "shooter_1".into(),
            Bullet {
                id: "shooter_1".into(),
                x: 300.0,
                y: 300.0,
                vx: 10.0,
                vy: 0.0,
                owner_id: "shooter".into(),
                created_at: 0.0,
            },
        );
        let hits = state.check_collisions();
        assert_eq!(hits.len(), 1);

        let target = &state.players["target"];
        assert_eq!(target.size, PLAYER_INITIAL_SIZE);

        let m = RESPAWN_EDGE_MARGIN;
        let on_horizontal = (target.y == m || target.y == CANVAS_HEIGHT - m)
            && (m..=CANVAS_WIDTH - m).contains(&target.x);
        let on_vertical = (target.x == m || target.x == CANVAS_WIDTH - m)
            && (m..=CANVAS_HEIGHT - m).contains(&target.y);
        assert!(on_horizontal || on_vertical);
    }

    #[test]
    fn test_no_self_hit() {
        let mut state = state_with_player("a");
        place(&mut state, "a", 400.0, 300.0, 0.0, 90.0);

        // Bullet sitting on its owner's center
        state.bullets.insert(
            "a_1".into(),
            Bullet {
                id: "a_1".into(),
                x: 400.0,
                y: 300.0,
                vx: 10.0,
                vy: 0.0,
                owner_id: "a".into(),
                created_at: 0.0,
            },
        );
        assert!(state.check_collisions().is_empty());
        assert_eq!(state.bullets.len(), 1);
    }

    #[test]
    fn test_multiple_hits_in_one_tick() {
        let mut state = GameState::new();
        state.add_player("shooter", conn(), 0.0).unwrap();
        state.add_player("target", conn(), 0.0).unwrap();
        place(&mut state, "shooter", 700.0, 500.0, 0.0, 20.0);
        place(&mut state, "target", 300.0, 300.0, 0.0, 90.0);

        for i in 1..=2 {
            state.bullets.insert(
                format!("shooter_{i}"),
                Bullet {
                    id: format!("shooter_{i}"),
                    x: 300.0 + i as f64,
                    y: 300.0,
                    vx: 10.0,
                    vy: 0.0,
                    owner_id: "shooter".into(),
                    created_at: 0.0,
                },
            );
        }

        let hits = state.check_collisions();
        assert_eq!(hits.len(), 2);
        assert!(state.bullets.is_empty());
        assert_eq!(state.players["target"].size, PLAYER_INITIAL_SIZE);
    }
}

//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::{Bullet, Player};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Partial position/angle update
    Update {
        #[serde(default)]
        data: UpdateData,
    },

    /// Fire a bullet along the current facing angle
    Shoot,

    /// Change display name
    ChangeName { name: String },
}

/// Payload of an `update` message. Absent fields leave the
/// corresponding player attribute unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateData {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub angle: Option<f64>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after a successful join
    Init {
        player_id: String,
        player: Player,
        config: ClientConfig,
    },

    /// Full state snapshot, sent every tick
    State {
        data: StateData,
        hits: Vec<HitRecord>,
    },

    /// A bullet was fired
    BulletCreated { bullet: Bullet },

    /// A player joined the arena
    PlayerJoined { player_id: String, player: Player },

    /// A player left the arena
    PlayerLeft { player_id: String },

    /// A player changed its display name
    PlayerNameChanged { player_id: String, name: String },

    /// Error surfaced to a single client
    Error { message: String },
}

/// Static arena parameters sent to a client on join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub player_speed: f64,
}

/// Entity maps of a state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    pub players: BTreeMap<String, Player>,
    pub bullets: BTreeMap<String, Bullet>,
}

/// One resolved bullet/player collision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitRecord {
    pub bullet_id: String,
    pub player_id: String,
    pub shooter_id: String,
}

//! Spawn position and color generation

use rand::Rng;

use super::{CANVAS_HEIGHT, CANVAS_WIDTH, RESPAWN_EDGE_MARGIN, SPAWN_INTERIOR_MARGIN};

/// The four arena edges a player can respawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Pick a respawn point on a random arena edge.
///
/// The returned point lies exactly on one of the four margin lines,
/// with the free coordinate drawn uniformly between the margins.
pub fn random_edge_position<R: Rng>(rng: &mut R) -> (f64, f64) {
    let edge = match rng.gen_range(0..4u8) {
        0 => Edge::Top,
        1 => Edge::Bottom,
        2 => Edge::Left,
        _ => Edge::Right,
    };
    edge_position(edge, rng)
}

/// Respawn point on a specific edge
pub fn edge_position<R: Rng>(edge: Edge, rng: &mut R) -> (f64, f64) {
    match edge {
        Edge::Top => (
            rng.gen_range(RESPAWN_EDGE_MARGIN..CANVAS_WIDTH - RESPAWN_EDGE_MARGIN),
            RESPAWN_EDGE_MARGIN,
        ),
        Edge::Bottom => (
            rng.gen_range(RESPAWN_EDGE_MARGIN..CANVAS_WIDTH - RESPAWN_EDGE_MARGIN),
            CANVAS_HEIGHT - RESPAWN_EDGE_MARGIN,
        ),
        Edge::Left => (
            RESPAWN_EDGE_MARGIN,
            rng.gen_range(RESPAWN_EDGE_MARGIN..CANVAS_HEIGHT - RESPAWN_EDGE_MARGIN),
        ),
        Edge::Right => (
            CANVAS_WIDTH - RESPAWN_EDGE_MARGIN,
            rng.gen_range(RESPAWN_EDGE_MARGIN..CANVAS_HEIGHT - RESPAWN_EDGE_MARGIN),
        ),
    }
}

/// Initial spawn point, kept away from the edges so new players
/// don't appear inside the respawn band.
pub fn random_interior_position<R: Rng>(rng: &mut R) -> (f64, f64) {
    (
        rng.gen_range(SPAWN_INTERIOR_MARGIN..CANVAS_WIDTH - SPAWN_INTERIOR_MARGIN),
        rng.gen_range(SPAWN_INTERIOR_MARGIN..CANVAS_HEIGHT - SPAWN_INTERIOR_MARGIN),
    )
}

/// Random 24-bit RGB color as a `#rrggbb` hex string
pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0..=0xFFFFFFu32))
}

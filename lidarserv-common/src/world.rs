use serde::{Deserialize, Serialize};

/// A foreground return, transformed into the world frame.
///
/// Stored as `f64` internally (clustering needs the precision for the spatial
/// index's cell keys), emitted to downstream consumers as `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u8,
    pub ts_ns: i64,
    pub sensor_id: u32,
}

impl WorldPoint {
    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

use serde::{Deserialize, Serialize};

/// One LiDAR return, as produced by the (out-of-scope) packet assembler.
///
/// Immutable once constructed; the pipeline never mutates a `PolarPoint`, it
/// only reads it to derive `WorldPoint`s and background-cell updates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarPoint {
    /// Ring index, `0..rings`.
    pub channel: u16,
    /// Azimuth in degrees, `[0, 360)`. 360 is accepted on input and wraps to bin 0.
    pub azimuth_deg: f64,
    /// Range in metres. `0.0` means "no return" and the point is dropped.
    pub distance_m: f64,
    /// Per-ring calibrated elevation, in degrees.
    pub elevation_deg: f64,
    /// Return strength, `0..=255`.
    pub intensity: u8,
    /// Acquisition time of this single return.
    pub ts_ns: i64,
}

impl PolarPoint {
    /// Cheap structural validity check: finite fields, azimuth in range, non-negative distance.
    pub fn is_valid(&self) -> bool {
        self.distance_m.is_finite()
            && self.distance_m >= 0.0
            && self.azimuth_deg.is_finite()
            && (0.0..=360.0).contains(&self.azimuth_deg)
            && self.elevation_deg.is_finite()
    }

    /// Whether this is a "no return" sample that should be dropped before classification.
    pub fn is_empty_return(&self) -> bool {
        self.distance_m == 0.0
    }
}

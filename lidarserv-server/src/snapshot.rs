use lidarserv_common::background::BackgroundParams;
use serde::{Deserialize, Serialize};

/// Why a `BgSnapshot` was taken, per the background-grid persistence
/// schedule (spec 4.1, 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotReason {
    /// Every cell has cleared warmup for the first time this session.
    SettlingComplete,
    /// The configured snapshot interval, or changed-cell threshold, elapsed.
    PeriodicUpdate,
    /// Requested explicitly via `PerceptionPipeline::request_snapshot`.
    Manual,
}

/// The wire format handed to the (out-of-scope) persistence collaborator.
/// `grid_blob` is the gzipped, row-major `BackgroundCell` encoding produced
/// by `BackgroundManager::snapshot()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgSnapshot {
    pub sensor_id: u32,
    pub taken_unix_nanos: i64,
    pub rings: usize,
    pub azimuth_bins: usize,
    pub params_json: String,
    pub grid_blob: Vec<u8>,
    pub changed_cells_count: u64,
    pub snapshot_reason: SnapshotReason,
    pub ring_elevations_json: Option<String>,
}

impl BgSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        sensor_id: u32,
        taken_unix_nanos: i64,
        rings: usize,
        azimuth_bins: usize,
        params: &BackgroundParams,
        grid_blob: Vec<u8>,
        changed_cells_count: u64,
        snapshot_reason: SnapshotReason,
        ring_elevations_deg: Option<&[f64]>,
    ) -> serde_json::Result<Self> {
        let params_json = serde_json::to_string(params)?;
        let ring_elevations_json = ring_elevations_deg.map(serde_json::to_string).transpose()?;
        Ok(BgSnapshot {
            sensor_id,
            taken_unix_nanos,
            rings,
            azimuth_bins,
            params_json,
            grid_blob,
            changed_cells_count,
            snapshot_reason,
            ring_elevations_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_serializes_params_as_json() {
        let snap = BgSnapshot::build(
            1,
            0,
            2,
            4,
            &BackgroundParams::default(),
            vec![1, 2, 3],
            0,
            SnapshotReason::Manual,
            Some(&[1.0, -1.0]),
        )
        .unwrap();
        assert!(snap.params_json.contains("update_fraction"));
        assert_eq!(snap.ring_elevations_json.unwrap(), "[1.0,-1.0]");
    }
}

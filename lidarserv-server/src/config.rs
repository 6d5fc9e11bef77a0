use std::fs::File;
use std::path::Path;

use lidarserv_common::background::BackgroundParams;
use lidarserv_common::clustering::ClusteringParams;
use lidarserv_common::tracking::TrackerParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether this sensor's consumers additionally require training-grade pose
/// quality, or accept the default tracking-grade bar the pipeline applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseQualityPolicy {
    pub require_training_grade: bool,
}

impl Default for PoseQualityPolicy {
    fn default() -> Self {
        PoseQualityPolicy {
            require_training_grade: false,
        }
    }
}

/// Everything needed to stand up one sensor's worker: grid shape, per-ring
/// elevation calibration, and the four tunable parameter bundles. Loaded from
/// JSON, swapped wholesale at a frame boundary by `reconfigure()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorParams {
    pub rings: usize,
    pub azimuth_bins: usize,
    pub ring_elevations_deg: Vec<f64>,
    pub background: BackgroundParams,
    pub tracker: TrackerParams,
    pub clustering: ClusteringParams,
    pub pose_quality: PoseQualityPolicy,
}

impl Default for SensorParams {
    fn default() -> Self {
        let rings = 16;
        SensorParams {
            rings,
            azimuth_bins: 360,
            ring_elevations_deg: vec![0.0; rings],
            background: BackgroundParams::default(),
            tracker: TrackerParams::default(),
            clustering: ClusteringParams::default(),
            pose_quality: PoseQualityPolicy::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerDe(#[from] serde_json::Error),
}

impl SensorParams {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigIoError> {
        let file = File::open(path)?;
        let settings = serde_json::from_reader(file)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigIoError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

use lidarserv_common::pose::Pose;
use lidarserv_common::world::WorldPoint;

/// The seam the out-of-scope pose-calibration collaborator plugs into.
/// `PerceptionPipeline` calls this at most once per frame, per sensor
/// (spec 6).
pub trait PoseSource: Send + Sync {
    fn get_current_pose(&self, sensor_id: u32) -> Option<Pose>;
}

/// A fixed pose for every sensor, for smoke-testing without a live
/// calibration collaborator.
pub struct StaticPoseSource {
    pose: Option<Pose>,
}

impl StaticPoseSource {
    pub fn identity() -> Self {
        StaticPoseSource {
            pose: Some(Pose::identity()),
        }
    }

    pub fn none() -> Self {
        StaticPoseSource { pose: None }
    }

    pub fn fixed(pose: Pose) -> Self {
        StaticPoseSource { pose: Some(pose) }
    }
}

impl PoseSource for StaticPoseSource {
    fn get_current_pose(&self, _sensor_id: u32) -> Option<Pose> {
        self.pose.clone()
    }
}

/// The seam the out-of-scope ground/overhead-filter collaborator plugs into
/// (step 3 of the per-frame pipeline, spec 4.5). Ground-plane estimation
/// itself is a non-goal; this trait exists so `PerceptionPipeline` compiles
/// and is independently testable without that collaborator.
pub trait VerticalBandFilter: Send + Sync {
    fn filter(&self, points: Vec<WorldPoint>) -> Vec<WorldPoint>;
}

/// Passes every point through unchanged.
pub struct NoopVerticalBandFilter;

impl VerticalBandFilter for NoopVerticalBandFilter {
    fn filter(&self, points: Vec<WorldPoint>) -> Vec<WorldPoint> {
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_pose_source_returns_fixed_pose() {
        let source = StaticPoseSource::identity();
        assert!(source.get_current_pose(1).is_some());
        assert!(StaticPoseSource::none().get_current_pose(1).is_none());
    }

    #[test]
    fn noop_filter_is_identity() {
        let points = vec![WorldPoint {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            intensity: 10,
            ts_ns: 0,
            sensor_id: 1,
        }];
        let filtered = NoopVerticalBandFilter.filter(points.clone());
        assert_eq!(filtered, points);
    }
}

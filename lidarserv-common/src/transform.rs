use nalgebra::Vector3;

use crate::error::PipelineError;
use crate::polar::PolarPoint;
use crate::pose::Pose;
use crate::world::WorldPoint;

/// Converts one polar return to sensor-frame Cartesian coordinates using the
/// ring's calibrated elevation (standard spherical conversion: azimuth sweeps
/// the horizontal plane, elevation tilts out of it).
fn to_sensor_cartesian(point: &PolarPoint) -> Vector3<f64> {
    let az = point.azimuth_deg.to_radians();
    let el = point.elevation_deg.to_radians();
    let horizontal = point.distance_m * el.cos();
    Vector3::new(horizontal * az.cos(), horizontal * az.sin(), point.distance_m * el.sin())
}

/// Converts a set of (already foreground-filtered) polar points to world
/// points. If `pose` is `None`, the identity pose is used (sensor frame
/// equals world frame).
pub fn transform(points: &[PolarPoint], pose: Option<&Pose>, sensor_id: u32) -> Vec<WorldPoint> {
    let identity = Pose::identity();
    let pose = pose.unwrap_or(&identity);
    points
        .iter()
        .map(|p| {
            let sensor_xyz = to_sensor_cartesian(p);
            let world_xyz = pose.apply(sensor_xyz);
            WorldPoint {
                x: world_xyz.x,
                y: world_xyz.y,
                z: world_xyz.z,
                intensity: p.intensity,
                ts_ns: p.ts_ns,
                sensor_id,
            }
        })
        .collect()
}

/// Training-grade variant: rejects the whole batch up front if `pose` does
/// not meet `excellent`/`good` quality, rather than silently degrading as the
/// normal pipeline does.
pub fn transform_training_grade(
    points: &[PolarPoint],
    pose: Option<&Pose>,
    sensor_id: u32,
) -> Result<Vec<WorldPoint>, PipelineError> {
    if let Some(pose) = pose {
        let quality = pose.quality();
        if !quality.accepts_training() {
            return Err(PipelineError::PoseQualityInsufficient { quality });
        }
    }
    Ok(transform(points, pose, sensor_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseQuality;
    use approx::assert_relative_eq;

    fn point(azimuth_deg: f64, elevation_deg: f64, distance_m: f64) -> PolarPoint {
        PolarPoint {
            channel: 0,
            azimuth_deg,
            distance_m,
            elevation_deg,
            intensity: 50,
            ts_ns: 0,
        }
    }

    #[test]
    fn identity_pose_is_noop_for_forward_ray() {
        let p = point(0.0, 0.0, 10.0);
        let out = transform(&[p], None, 1);
        assert_relative_eq!(out[0].x, 10.0, epsilon = 1e-6);
        assert_relative_eq!(out[0].y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[0].z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn training_grade_rejects_fair_pose() {
        let pose = Pose {
            t: nalgebra::Matrix4::identity(),
            rmse_m: 0.20,
        };
        let result = transform_training_grade(&[point(0.0, 0.0, 1.0)], Some(&pose), 1);
        assert_eq!(
            result.unwrap_err(),
            PipelineError::PoseQualityInsufficient {
                quality: PoseQuality::Fair
            }
        );
    }

    #[test]
    fn training_grade_accepts_good_pose() {
        let pose = Pose {
            t: nalgebra::Matrix4::identity(),
            rmse_m: 0.10,
        };
        assert!(transform_training_grade(&[point(0.0, 0.0, 1.0)], Some(&pose), 1).is_ok());
    }
}

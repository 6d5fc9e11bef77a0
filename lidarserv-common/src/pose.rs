use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Quality band derived from a `Pose`'s calibration RMSE.
///
/// Tracking accepts up to `Fair` (or `Unknown`); training-grade consumers
/// accept only `Excellent`/`Good`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    /// `rmse_m == 0.0`, i.e. calibration RMSE was never recorded.
    Unknown,
}

impl PoseQuality {
    pub fn accepts_tracking(self) -> bool {
        !matches!(self, PoseQuality::Poor)
    }

    pub fn accepts_training(self) -> bool {
        matches!(self, PoseQuality::Excellent | PoseQuality::Good)
    }
}

/// A sensor→world rigid transform, supplied by the (out-of-scope) calibration
/// collaborator. Read-only from the core's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Row-major 4x4 rigid transform; last row is `[0, 0, 0, 1]`, upper-left
    /// 3x3 is orthonormal with determinant approximately `+1`.
    pub t: Matrix4<f64>,
    /// Calibration RMSE in metres. `0.0` means unknown.
    pub rmse_m: f64,
}

impl Pose {
    pub fn identity() -> Self {
        Pose {
            t: Matrix4::identity(),
            rmse_m: 0.0,
        }
    }

    pub fn quality(&self) -> PoseQuality {
        if self.rmse_m == 0.0 {
            PoseQuality::Unknown
        } else if self.rmse_m < 0.05 {
            PoseQuality::Excellent
        } else if self.rmse_m < 0.15 {
            PoseQuality::Good
        } else if self.rmse_m < 0.30 {
            PoseQuality::Fair
        } else {
            PoseQuality::Poor
        }
    }

    /// Applies `self.t` to a sensor-frame point, returning the world-frame point.
    pub fn apply(&self, sensor_point: Vector3<f64>) -> Vector3<f64> {
        let h = self.t * sensor_point.to_homogeneous();
        Vector3::new(h.x, h.y, h.z)
    }

    /// Whether the upper-left 3x3 block is orthonormal with `det ≈ +1`, within `tolerance`.
    pub fn is_rigid(&self, tolerance: f64) -> bool {
        let r = self.t.fixed_view::<3, 3>(0, 0).clone_owned();
        let should_be_identity = r * r.transpose();
        let identity_err = (should_be_identity - nalgebra::Matrix3::identity())
            .abs()
            .max();
        let det_err = (r.determinant() - 1.0).abs();
        let bottom_row_ok = self.t.row(3)
            == nalgebra::Matrix1x4::new(0.0, 0.0, 0.0, 1.0);
        bottom_row_ok && identity_err <= tolerance && det_err <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_is_rigid_and_unknown_quality() {
        let p = Pose::identity();
        assert!(p.is_rigid(0.01));
        assert_eq!(p.quality(), PoseQuality::Unknown);
    }

    #[test]
    fn quality_bands() {
        assert_eq!(
            Pose {
                t: Matrix4::identity(),
                rmse_m: 0.04
            }
            .quality(),
            PoseQuality::Excellent
        );
        assert_eq!(
            Pose {
                t: Matrix4::identity(),
                rmse_m: 0.10
            }
            .quality(),
            PoseQuality::Good
        );
        assert_eq!(
            Pose {
                t: Matrix4::identity(),
                rmse_m: 0.20
            }
            .quality(),
            PoseQuality::Fair
        );
        assert_eq!(
            Pose {
                t: Matrix4::identity(),
                rmse_m: 0.31
            }
            .quality(),
            PoseQuality::Poor
        );
    }

    #[test]
    fn identity_apply_is_noop() {
        let p = Pose::identity();
        let v = Vector3::new(1.0, 2.0, 3.0);
        let out = p.apply(v);
        assert_relative_eq!(out, v, epsilon = 1e-6);
    }
}

use adskalman::{ObservationModel, TransitionModelLinearNoControl};
use nalgebra::{Matrix2, Matrix4, Matrix4x2, OMatrix, OVector, U2, U4};

/// Constant-velocity motion model for the state `[x, y, vx, vy]`,
/// parameterised by `dt`. `calc_for_dt` produces the concrete transition
/// model for one frame's elapsed time; process noise is
/// `diag(q_pos, q_pos, q_vel, q_vel)`, added after propagation.
#[derive(Debug, Clone, Copy)]
pub struct ConstantVelocityModel {
    q_pos: f64,
    q_vel: f64,
}

impl ConstantVelocityModel {
    pub fn new(q_pos: f64, q_vel: f64) -> Self {
        ConstantVelocityModel { q_pos, q_vel }
    }

    pub fn calc_for_dt(&self, dt: f64) -> ConstantVelocityTransition {
        #[rustfmt::skip]
        let f = Matrix4::new(
            1.0, 0.0,  dt, 0.0,
            0.0, 1.0, 0.0,  dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        let ft = f.transpose();
        let q = Matrix4::from_diagonal(&nalgebra::Vector4::new(
            self.q_pos, self.q_pos, self.q_vel, self.q_vel,
        ));
        ConstantVelocityTransition { f, ft, q }
    }
}

/// The transition model for one specific `dt`.
#[derive(Debug, Clone)]
pub struct ConstantVelocityTransition {
    f: Matrix4<f64>,
    ft: Matrix4<f64>,
    q: Matrix4<f64>,
}

impl TransitionModelLinearNoControl<f64, U4> for ConstantVelocityTransition {
    fn F(&self) -> &OMatrix<f64, U4, U4> {
        &self.f
    }
    fn FT(&self) -> &OMatrix<f64, U4, U4> {
        &self.ft
    }
    fn Q(&self) -> &OMatrix<f64, U4, U4> {
        &self.q
    }
}

/// Measurement model that observes position only; `R = r * I2`.
#[derive(Debug, Clone, Copy)]
pub struct PositionObservationModel {
    h: nalgebra::Matrix2x4<f64>,
    ht: Matrix4x2<f64>,
    r: Matrix2<f64>,
}

impl PositionObservationModel {
    pub fn new(r: f64) -> Self {
        #[rustfmt::skip]
        let h = nalgebra::Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );
        let ht = h.transpose();
        PositionObservationModel {
            h,
            ht,
            r: Matrix2::identity() * r,
        }
    }

    /// `H * P * H^T + R`, the innovation covariance used for gating before a
    /// Kalman update is attempted.
    pub fn innovation_covariance(&self, p: &Matrix4<f64>) -> Matrix2<f64> {
        self.h * p * self.ht + self.r
    }
}

impl ObservationModel<f64, U4, U2> for PositionObservationModel {
    fn H(&self) -> &OMatrix<f64, U2, U4> {
        &self.h
    }
    fn HT(&self) -> &OMatrix<f64, U4, U2> {
        &self.ht
    }
    fn R(&self) -> &OMatrix<f64, U2, U2> {
        &self.r
    }
    fn predict_observation(&self, state: &OVector<f64, U4>) -> OVector<f64, U2> {
        self.h * state
    }
}

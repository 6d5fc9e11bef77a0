//! Multi-object tracker: constant-velocity Kalman filter per track, gated
//! nearest-neighbour association, and the Tentative/Confirmed/Deleted
//! lifecycle.

mod kalman;
mod track;
mod tracker;

pub use kalman::{ConstantVelocityModel, PositionObservationModel};
pub use track::{Classification, Track, TrackEvent, TrackFeatures, TrackObservation, TrackState, TrackSummary};
pub use tracker::{Tracker, TrackerOutcome, TrackerParams};

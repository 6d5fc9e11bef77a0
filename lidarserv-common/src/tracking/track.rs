use std::collections::VecDeque;

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::clustering::WorldCluster;

/// Tracker lifecycle state. A track never moves backward in this chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// An external classification (label, confidence, source model), carried as
/// an aggregated feature on `Track` but never populated by this core — a
/// classifier is an explicit non-goal, this is just the seam it would plug
/// into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
    pub model: String,
}

/// Running feature averages folded in on every matched update.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackFeatures {
    pub bbox_l_avg: f64,
    pub bbox_w_avg: f64,
    pub bbox_h_avg: f64,
    pub height_p95_max: f64,
    pub intensity_mean_avg: f64,
    pub speed_avg: f64,
    pub speed_max: f64,
    samples: u64,
}

impl TrackFeatures {
    fn incremental_mean(mean: f64, n: u64, sample: f64) -> f64 {
        mean + (sample - mean) / (n as f64)
    }

    /// Folds one matched cluster's features into the running averages.
    fn fold(&mut self, cluster: &WorldCluster, speed: f64) {
        self.samples += 1;
        let n = self.samples;
        self.bbox_l_avg = Self::incremental_mean(self.bbox_l_avg, n, cluster.bbox_l);
        self.bbox_w_avg = Self::incremental_mean(self.bbox_w_avg, n, cluster.bbox_w);
        self.bbox_h_avg = Self::incremental_mean(self.bbox_h_avg, n, cluster.bbox_h);
        self.height_p95_max = self.height_p95_max.max(cluster.height_p95);
        self.intensity_mean_avg =
            Self::incremental_mean(self.intensity_mean_avg, n, cluster.intensity_mean as f64);
        self.speed_avg = Self::incremental_mean(self.speed_avg, n, speed);
        self.speed_max = self.speed_max.max(speed);
    }
}

/// A tracked object. Owned exclusively by the `Tracker`.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: String,
    pub sensor_id: u32,
    pub state: TrackState,
    pub hits: u32,
    pub misses: u32,
    pub first_ns: i64,
    pub last_ns: i64,
    /// `[x, y, vx, vy]`.
    pub x: Vector4<f64>,
    /// Row-major 4x4 state covariance.
    pub p: Matrix4<f64>,
    pub features: TrackFeatures,
    pub classification: Option<Classification>,
    history_capacity: usize,
    position_history: VecDeque<(f64, f64, f64)>,
    speed_history: VecDeque<f64>,
}

impl Track {
    pub fn new(
        track_id: String,
        sensor_id: u32,
        centroid: (f64, f64, f64),
        ts_ns: i64,
        initial_covariance: Matrix4<f64>,
        history_capacity: usize,
    ) -> Self {
        Track {
            track_id,
            sensor_id,
            state: TrackState::Tentative,
            // The spawning detection itself counts as the first hit; the
            // confirm check is only evaluated on a subsequent match, so a
            // freshly spawned track stays Tentative until then regardless.
            hits: 1,
            misses: 0,
            first_ns: ts_ns,
            last_ns: ts_ns,
            x: Vector4::new(centroid.0, centroid.1, 0.0, 0.0),
            p: initial_covariance,
            features: TrackFeatures::default(),
            classification: None,
            history_capacity,
            position_history: VecDeque::new(),
            speed_history: VecDeque::new(),
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x.x, self.x.y)
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.x.z, self.x.w)
    }

    pub fn speed(&self) -> f64 {
        (self.x.z * self.x.z + self.x.w * self.x.w).sqrt()
    }

    pub fn position_history(&self) -> &VecDeque<(f64, f64, f64)> {
        &self.position_history
    }

    pub fn speed_history(&self) -> &VecDeque<f64> {
        &self.speed_history
    }

    fn push_capped<T>(buf: &mut VecDeque<T>, capacity: usize, value: T) {
        if buf.len() >= capacity {
            buf.pop_front();
        }
        buf.push_back(value);
    }

    /// Applies a successful association: refreshes `last_ns`, increments
    /// `hits`, resets `misses`, folds cluster features into the running
    /// averages, and appends to the bounded history buffers.
    pub fn apply_match(&mut self, cluster: &WorldCluster, ts_ns: i64) {
        self.last_ns = ts_ns;
        self.hits += 1;
        self.misses = 0;
        let speed = self.speed();
        self.features.fold(cluster, speed);
        Self::push_capped(
            &mut self.position_history,
            self.history_capacity,
            (self.x.x, self.x.y, cluster.centroid_z),
        );
        Self::push_capped(&mut self.speed_history, self.history_capacity, speed);
    }

    /// Applies a miss: increments `misses`, resets `hits` to 0.
    pub fn apply_miss(&mut self) {
        self.misses += 1;
        self.hits = 0;
    }
}

/// The per-tick kinematic observation emitted by `on_track_obs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackObservation {
    pub track_id: String,
    pub sensor_id: u32,
    pub frame_ts_ns: i64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub state: TrackState,
}

/// Track lifecycle transitions, emitted via `on_track_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackEvent {
    Created { track_id: String },
    Confirmed { track_id: String },
    Deleted { track_id: String },
}

/// Lightweight read-only projection of `Track`, for `get_active_tracks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: String,
    pub sensor_id: u32,
    pub state: TrackState,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub hits: u32,
    pub misses: u32,
    pub first_ns: i64,
    pub last_ns: i64,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        TrackSummary {
            track_id: track.track_id.clone(),
            sensor_id: track.sensor_id,
            state: track.state,
            x: track.x.x,
            y: track.x.y,
            vx: track.x.z,
            vy: track.x.w,
            hits: track.hits,
            misses: track.misses,
            first_ns: track.first_ns,
            last_ns: track.last_ns,
        }
    }
}

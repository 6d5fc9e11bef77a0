use adskalman::{CovarianceUpdateMethod, ObservationModel, StateAndCovariance, TransitionModelLinearNoControl};
use log::{debug, info, trace};
use nalgebra::{Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::clustering::WorldCluster;
use crate::error::PipelineError;

use super::kalman::{ConstantVelocityModel, PositionObservationModel};
use super::track::{Track, TrackEvent, TrackObservation, TrackState};

/// Tuning knobs for the `Tracker`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerParams {
    pub hits_to_confirm: u32,
    pub max_misses: u32,
    pub gating_distance_squared: f64,
    pub max_tracks: usize,
    pub deleted_grace_period_ns: i64,
    /// Process noise on position, per motion-model tick.
    pub q_pos: f64,
    /// Process noise on velocity, per motion-model tick.
    pub q_vel: f64,
    /// Measurement noise; `R = r * I2`.
    pub r_measurement: f64,
    /// Length of each track's position/speed history ring buffers.
    pub history_capacity: usize,
}

impl Default for TrackerParams {
    fn default() -> Self {
        TrackerParams {
            hits_to_confirm: 3,
            max_misses: 5,
            gating_distance_squared: 9.0,
            max_tracks: 256,
            deleted_grace_period_ns: 2_000_000_000,
            q_pos: 0.05,
            q_vel: 0.5,
            r_measurement: 0.25,
            history_capacity: 100,
        }
    }
}

/// Initial covariance for a freshly spawned track: high position uncertainty,
/// lower velocity uncertainty, per spec.
fn initial_covariance() -> Matrix4<f64> {
    Matrix4::from_diagonal(&Vector4::new(10.0, 10.0, 1.0, 1.0))
}

/// Everything one `process_frame` call produces, besides the tracker's own
/// mutated state: per-tick observations, lifecycle events, and any
/// non-fatal errors encountered (e.g. `TrackCapacityExhausted`).
#[derive(Debug, Default)]
pub struct TrackerOutcome {
    pub observations: Vec<TrackObservation>,
    pub events: Vec<TrackEvent>,
    pub errors: Vec<PipelineError>,
}

/// Maintains the set of tracked objects for one sensor across frames.
#[derive(Debug)]
pub struct Tracker {
    params: TrackerParams,
    tracks: Vec<Track>,
    next_id: u64,
    last_ns: Option<i64>,
    motion_model: ConstantVelocityModel,
    obs_model: PositionObservationModel,
}

impl Tracker {
    pub fn new(params: TrackerParams) -> Self {
        let motion_model = ConstantVelocityModel::new(params.q_pos, params.q_vel);
        let obs_model = PositionObservationModel::new(params.r_measurement);
        Tracker {
            params,
            tracks: Vec::new(),
            next_id: 0,
            last_ns: None,
            motion_model,
            obs_model,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    pub fn reconfigure(&mut self, params: TrackerParams) {
        self.motion_model = ConstantVelocityModel::new(params.q_pos, params.q_vel);
        self.obs_model = PositionObservationModel::new(params.r_measurement);
        self.params = params;
    }

    fn next_track_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("track-{id}")
    }

    /// Greedy 1:1 cluster-to-track association: for each cluster in order,
    /// pick the nearest *unused* non-Deleted track whose squared Mahalanobis
    /// distance is below the gating threshold. A track with a singular
    /// innovation covariance is excluded from candidacy entirely (treated as
    /// an infinite-distance sentinel), not merely deprioritised.
    fn associate(&self, clusters: &[WorldCluster], num_existing: usize) -> Vec<Option<usize>> {
        let mut used = vec![false; num_existing];
        let mut matches = vec![None; clusters.len()];

        for (ci, cluster) in clusters.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for ti in 0..num_existing {
                if used[ti] || self.tracks[ti].state == TrackState::Deleted {
                    continue;
                }
                let s = self.obs_model.innovation_covariance(&self.tracks[ti].p);
                if s.determinant().abs() < 1e-6 {
                    continue;
                }
                let s_inv = match s.try_inverse() {
                    Some(inv) => inv,
                    None => continue,
                };
                let innovation = Vector2::new(
                    cluster.centroid_x - self.tracks[ti].x.x,
                    cluster.centroid_y - self.tracks[ti].x.y,
                );
                let d2 = (innovation.transpose() * s_inv * innovation)[(0, 0)];
                if d2 < self.params.gating_distance_squared && best.map_or(true, |(_, bd)| d2 < bd) {
                    best = Some((ti, d2));
                }
            }
            if let Some((ti, _)) = best {
                matches[ci] = Some(ti);
                used[ti] = true;
            }
        }
        matches
    }

    /// Applies a miss to `track` and deletes it if `max_misses` is reached.
    fn age(track: &mut Track, params: &TrackerParams, frame_ts_ns: i64, events: &mut Vec<TrackEvent>) {
        track.apply_miss();
        if track.misses >= params.max_misses && track.state != TrackState::Deleted {
            track.state = TrackState::Deleted;
            track.last_ns = frame_ts_ns;
            events.push(TrackEvent::Deleted {
                track_id: track.track_id.clone(),
            });
        }
    }

    /// Runs one full tracker tick: predict, associate, update, age, spawn, purge.
    pub fn process_frame(&mut self, clusters: &[WorldCluster], frame_ts_ns: i64) -> TrackerOutcome {
        trace!(
            "tracker tick: {} clusters, {} live tracks, ts={}",
            clusters.len(),
            self.tracks.len(),
            frame_ts_ns
        );
        let dt = match self.last_ns {
            Some(last) => ((frame_ts_ns - last) as f64 / 1e9).max(0.0),
            None => 0.1,
        };
        self.last_ns = Some(frame_ts_ns);

        let transition = self.motion_model.calc_for_dt(dt);
        for track in self.tracks.iter_mut() {
            if track.state == TrackState::Deleted {
                continue;
            }
            let estimate = StateAndCovariance::new(track.x, track.p);
            let predicted = transition.predict(&estimate);
            track.x = *predicted.state();
            track.p = *predicted.covariance();
        }

        let num_existing = self.tracks.len();
        let matches = self.associate(clusters, num_existing);

        let mut outcome = TrackerOutcome::default();
        let mut handled = vec![false; num_existing];

        for (ci, maybe_ti) in matches.iter().enumerate() {
            let Some(ti) = *maybe_ti else { continue };
            handled[ti] = true;
            let cluster = &clusters[ci];
            let observation = Vector2::new(cluster.centroid_x, cluster.centroid_y);
            let track = &mut self.tracks[ti];
            let estimate = StateAndCovariance::new(track.x, track.p);

            match self
                .obs_model
                .update(&estimate, &observation, CovarianceUpdateMethod::JosephForm)
            {
                Ok(posterior) => {
                    let p = posterior.covariance();
                    track.x = *posterior.state();
                    track.p = 0.5 * (p + p.transpose());

                    if !track.x.iter().all(|v| v.is_finite()) {
                        debug!("track {} diverged to non-finite state, forcing Deleted", track.track_id);
                        track.state = TrackState::Deleted;
                        track.last_ns = frame_ts_ns;
                        outcome.events.push(TrackEvent::Deleted {
                            track_id: track.track_id.clone(),
                        });
                        continue;
                    }

                    let was_tentative = track.state == TrackState::Tentative;
                    track.apply_match(cluster, frame_ts_ns);
                    if was_tentative && track.hits >= self.params.hits_to_confirm {
                        track.state = TrackState::Confirmed;
                        info!("track {} confirmed", track.track_id);
                        outcome.events.push(TrackEvent::Confirmed {
                            track_id: track.track_id.clone(),
                        });
                    }

                    let (vx, vy) = track.velocity();
                    outcome.observations.push(TrackObservation {
                        track_id: track.track_id.clone(),
                        sensor_id: track.sensor_id,
                        frame_ts_ns,
                        x: track.x.x,
                        y: track.x.y,
                        vx,
                        vy,
                        state: track.state,
                    });
                }
                Err(_) => {
                    outcome.errors.push(PipelineError::SingularInnovation {
                        track_id: track.track_id.clone(),
                    });
                    Self::age(track, &self.params, frame_ts_ns, &mut outcome.events);
                }
            }
        }

        for (ti, track) in self.tracks.iter_mut().enumerate().take(num_existing) {
            if handled[ti] || track.state == TrackState::Deleted {
                continue;
            }
            Self::age(track, &self.params, frame_ts_ns, &mut outcome.events);
        }

        for (ci, maybe_ti) in matches.iter().enumerate() {
            if maybe_ti.is_some() {
                continue;
            }
            // "current track count" includes Deleted tracks still awaiting purge.
            if self.tracks.len() >= self.params.max_tracks {
                outcome.errors.push(PipelineError::TrackCapacityExhausted {
                    max_tracks: self.params.max_tracks,
                });
                continue;
            }
            let cluster = &clusters[ci];
            let track_id = self.next_track_id();
            let track = Track::new(
                track_id.clone(),
                cluster.sensor_id,
                (cluster.centroid_x, cluster.centroid_y, cluster.centroid_z),
                frame_ts_ns,
                initial_covariance(),
                self.params.history_capacity,
            );
            self.tracks.push(track);
            outcome.events.push(TrackEvent::Created { track_id });
        }

        self.tracks.retain(|t| {
            t.state != TrackState::Deleted || frame_ts_ns - t.last_ns < self.params.deleted_grace_period_ns
        });

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_at(x: f64, y: f64, ts_ns: i64) -> WorldCluster {
        WorldCluster {
            cluster_id: 0,
            sensor_id: 1,
            ts_ns,
            centroid_x: x,
            centroid_y: y,
            centroid_z: 0.0,
            bbox_l: 1.0,
            bbox_w: 0.5,
            bbox_h: 1.5,
            heading_rad: Some(0.0),
            points_count: 10,
            height_p95: 1.4,
            intensity_mean: 100,
        }
    }

    #[test]
    fn track_lifecycle_confirms_after_enough_hits() {
        let params = TrackerParams {
            hits_to_confirm: 3,
            max_misses: 2,
            gating_distance_squared: 25.0,
            ..TrackerParams::default()
        };
        let mut tracker = Tracker::new(params);

        let o1 = tracker.process_frame(&[cluster_at(5.0, 0.0, 0)], 0);
        assert_eq!(o1.events, vec![TrackEvent::Created { track_id: "track-0".into() }]);
        assert_eq!(tracker.tracks()[0].state, TrackState::Tentative);

        tracker.process_frame(&[cluster_at(5.5, 0.0, 100_000_000)], 100_000_000);
        assert_eq!(tracker.tracks()[0].state, TrackState::Tentative);

        let o3 = tracker.process_frame(&[cluster_at(6.0, 0.0, 200_000_000)], 200_000_000);
        assert_eq!(tracker.tracks()[0].state, TrackState::Confirmed);
        assert!(o3
            .events
            .iter()
            .any(|e| matches!(e, TrackEvent::Confirmed { .. })));
        assert!(tracker.tracks()[0].x.z > 0.0, "velocity should trend positive");
    }

    #[test]
    fn miss_then_delete_then_purge() {
        let params = TrackerParams {
            hits_to_confirm: 1,
            max_misses: 2,
            gating_distance_squared: 25.0,
            deleted_grace_period_ns: 1_000_000_000,
            ..TrackerParams::default()
        };
        let mut tracker = Tracker::new(params);
        tracker.process_frame(&[cluster_at(0.0, 0.0, 0)], 0);
        assert_eq!(tracker.tracks()[0].state, TrackState::Tentative);

        // The confirm check runs on the next match, not at spawn time.
        tracker.process_frame(&[cluster_at(0.0, 0.0, 100_000_000)], 100_000_000);
        assert_eq!(tracker.tracks()[0].state, TrackState::Confirmed);

        tracker.process_frame(&[], 200_000_000);
        assert_eq!(tracker.tracks()[0].state, TrackState::Confirmed);
        tracker.process_frame(&[], 300_000_000);
        assert_eq!(tracker.tracks()[0].state, TrackState::Deleted);

        tracker.process_frame(&[], 2_000_000_000);
        assert!(tracker.tracks().is_empty(), "deleted track purged after grace period");
    }

    #[test]
    fn hits_resets_on_miss_and_misses_resets_on_hit() {
        let params = TrackerParams {
            hits_to_confirm: 10,
            max_misses: 10,
            gating_distance_squared: 25.0,
            ..TrackerParams::default()
        };
        let mut tracker = Tracker::new(params);
        tracker.process_frame(&[cluster_at(0.0, 0.0, 0)], 0);
        tracker.process_frame(&[cluster_at(0.0, 0.0, 100_000_000)], 100_000_000);
        assert_eq!(tracker.tracks()[0].hits, 2);

        tracker.process_frame(&[], 200_000_000);
        assert_eq!(tracker.tracks()[0].hits, 0);
        assert_eq!(tracker.tracks()[0].misses, 1);

        tracker.process_frame(&[cluster_at(0.0, 0.0, 300_000_000)], 300_000_000);
        assert_eq!(tracker.tracks()[0].misses, 0);
    }

    #[test]
    fn capacity_exhausted_still_emits_cluster_but_spawns_no_track() {
        let params = TrackerParams {
            max_tracks: 1,
            gating_distance_squared: 0.01,
            ..TrackerParams::default()
        };
        let mut tracker = Tracker::new(params);
        tracker.process_frame(&[cluster_at(0.0, 0.0, 0)], 0);
        let outcome = tracker.process_frame(&[cluster_at(100.0, 100.0, 100_000_000)], 100_000_000);
        assert_eq!(tracker.tracks().len(), 1);
        assert!(outcome
            .errors
            .iter()
            .any(|e| matches!(e, PipelineError::TrackCapacityExhausted { .. })));
    }
}

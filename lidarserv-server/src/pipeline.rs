use log::{info, trace, warn};

use lidarserv_common::clustering::build_clusters;
use lidarserv_common::error::PipelineError;
use lidarserv_common::polar::PolarPoint;
use lidarserv_common::tracking::{Track, TrackSummary};
use lidarserv_common::transform::transform;

use crate::collaborators::{PoseSource, VerticalBandFilter};
use crate::config::SensorParams;
use crate::foreground::ForegroundSnapshot;
use crate::observers::Observers;
use crate::queue::DropOldestQueue;
use crate::registry::{PerceptionRegistry, SensorWorker, TrackCounts};
use crate::snapshot::{BgSnapshot, SnapshotReason};

/// How many pending snapshots the persistence hand-off queue holds before
/// dropping the oldest.
const SNAPSHOT_QUEUE_CAPACITY: usize = 16;

/// The orchestrator (spec 4.5): wires one `SensorWorker` per registered
/// sensor to a pose source, an optional vertical-band filter, and the
/// `Observers` emission callbacks. This is the external-interface surface
/// (spec 6) that a frame assembler and monitoring/persistence collaborators
/// drive; it owns the concurrency model's per-sensor exclusive ownership
/// (spec 5) but not the collaborators themselves.
pub struct PerceptionPipeline {
    registry: PerceptionRegistry,
    observers: Observers,
    pose_source: Box<dyn PoseSource>,
    vertical_band_filter: Box<dyn VerticalBandFilter>,
    snapshot_queue: DropOldestQueue<BgSnapshot>,
}

impl PerceptionPipeline {
    pub fn new(pose_source: Box<dyn PoseSource>, vertical_band_filter: Box<dyn VerticalBandFilter>) -> Self {
        PerceptionPipeline {
            registry: PerceptionRegistry::new(),
            observers: Observers::new(),
            pose_source,
            vertical_band_filter,
            snapshot_queue: DropOldestQueue::new(SNAPSHOT_QUEUE_CAPACITY),
        }
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn register_sensor(&mut self, sensor_id: u32, params: SensorParams) {
        self.registry.register(sensor_id, params);
    }

    /// Atomically swaps a sensor's parameter bundle. Applied at the next
    /// frame boundary; never mid-frame (spec 5, 6).
    pub fn reconfigure(&mut self, sensor_id: u32, params: SensorParams) -> Option<()> {
        let worker = self.registry.worker_mut(sensor_id)?;
        worker.background.reconfigure(params.background);
        worker.tracker.reconfigure(params.tracker);
        worker.params = params;
        Some(())
    }

    /// Runs one frame through background subtraction, world transform, the
    /// vertical-band filter, clustering and tracking; emits the three
    /// callback streams in order (cluster, track observation, track event)
    /// so consumers see clusters before the track updates they fed (spec
    /// 4.5's atomicity guarantee). Returns `None` if `sensor_id` was never
    /// registered, else the recoverable errors encountered this frame.
    pub fn process_frame(
        &mut self,
        sensor_id: u32,
        points: Vec<PolarPoint>,
        frame_ts_ns: i64,
    ) -> Option<Vec<PipelineError>> {
        let worker = self.registry.worker_mut(sensor_id)?;
        trace!(
            "pipeline frame: sensor={sensor_id}, {} points, ts={frame_ts_ns}",
            points.len()
        );

        let mask = worker.background.process_frame(&points, frame_ts_ns);
        let foreground: Vec<PolarPoint> = points
            .iter()
            .zip(mask.iter())
            .filter(|&(_, &is_fg)| is_fg)
            .map(|(p, _)| *p)
            .collect();
        worker.cells_changed_since_snapshot += foreground.len() as u64;
        worker.foreground = ForegroundSnapshot {
            frame_ts_ns,
            points: foreground.clone(),
        };

        let pose = self.pose_source.get_current_pose(sensor_id);
        let world_points = transform(&foreground, pose.as_ref(), sensor_id);
        let world_points = self.vertical_band_filter.filter(world_points);

        let clusters = build_clusters(&world_points, &worker.params.clustering, sensor_id, frame_ts_ns);

        let mut errors = Vec::new();
        for cluster in &clusters {
            errors.extend(self.observers.emit_cluster(cluster));
        }

        let outcome = worker.tracker.process_frame(&clusters, frame_ts_ns);
        for obs in &outcome.observations {
            errors.extend(self.observers.emit_track_obs(obs));
        }
        for event in &outcome.events {
            errors.extend(self.observers.emit_track_event(event));
        }
        errors.extend(outcome.errors);

        Self::maybe_emit_snapshot(worker, &self.observers, &mut self.snapshot_queue, sensor_id, frame_ts_ns);

        Some(errors)
    }

    /// Forces an out-of-schedule snapshot, e.g. in response to an operator
    /// request from monitoring.
    pub fn request_snapshot(&mut self, sensor_id: u32, frame_ts_ns: i64) -> Option<()> {
        let worker = self.registry.worker_mut(sensor_id)?;
        Self::emit_snapshot(
            worker,
            &self.observers,
            &mut self.snapshot_queue,
            sensor_id,
            frame_ts_ns,
            SnapshotReason::Manual,
        );
        Some(())
    }

    pub fn get_active_tracks(&self, sensor_id: u32) -> Option<Vec<TrackSummary>> {
        let worker = self.registry.worker(sensor_id)?;
        Some(worker.tracker.tracks().iter().map(TrackSummary::from).collect())
    }

    pub fn get_track(&self, sensor_id: u32, track_id: &str) -> Option<Track> {
        self.registry.worker(sensor_id)?.tracker.track(track_id).cloned()
    }

    pub fn get_track_counts(&self, sensor_id: u32) -> Option<TrackCounts> {
        Some(self.registry.worker(sensor_id)?.track_counts())
    }

    pub fn get_recent_foreground(&self, sensor_id: u32) -> Option<ForegroundSnapshot> {
        Some(self.registry.worker(sensor_id)?.foreground.clone())
    }

    /// Drains whatever snapshots are sitting in the persistence hand-off
    /// queue, oldest first. A real persistence collaborator would do this
    /// continuously; callers that just want the latest can take the last
    /// element.
    pub fn take_pending_snapshots(&mut self) -> Vec<BgSnapshot> {
        self.snapshot_queue.drain().collect()
    }

    /// Checks the settling/periodic/change-threshold schedule (spec 4.1,
    /// `BackgroundParams::{settling_period_ns,snapshot_interval_ns,
    /// change_threshold_for_snapshot}`) and emits a snapshot if due.
    fn maybe_emit_snapshot(
        worker: &mut SensorWorker,
        observers: &Observers,
        queue: &mut DropOldestQueue<BgSnapshot>,
        sensor_id: u32,
        frame_ts_ns: i64,
    ) {
        let params = worker.params.background;
        let total_cells = worker.background.grid().cells().len().max(1) as f64;
        let settled_fraction = worker
            .background
            .grid()
            .cells()
            .iter()
            .filter(|c| c.times_seen >= params.warmup_count)
            .count() as f64
            / total_cells;
        let changed_fraction = worker.cells_changed_since_snapshot as f64 / total_cells;
        let time_due = worker
            .last_snapshot_ns
            .map_or(true, |last| frame_ts_ns - last >= params.snapshot_interval_ns);

        let reason = if !worker.settled_once && settled_fraction >= 1.0 {
            worker.settled_once = true;
            Some(SnapshotReason::SettlingComplete)
        } else if time_due || changed_fraction >= params.change_threshold_for_snapshot {
            Some(SnapshotReason::PeriodicUpdate)
        } else {
            None
        };

        if let Some(reason) = reason {
            Self::emit_snapshot(worker, observers, queue, sensor_id, frame_ts_ns, reason);
        }
    }

    fn emit_snapshot(
        worker: &mut SensorWorker,
        observers: &Observers,
        queue: &mut DropOldestQueue<BgSnapshot>,
        sensor_id: u32,
        frame_ts_ns: i64,
        reason: SnapshotReason,
    ) {
        let grid = worker.background.grid();
        let blob = worker.background.snapshot();
        let changed = worker.cells_changed_since_snapshot;
        let ring_elevations: Vec<f64> = (0..grid.rings()).map(|r| grid.ring_elevation_deg(r)).collect();
        match BgSnapshot::build(
            sensor_id,
            frame_ts_ns,
            grid.rings(),
            grid.azimuth_bins(),
            grid.params(),
            blob,
            changed,
            reason,
            Some(&ring_elevations),
        ) {
            Ok(snap) => {
                info!("background snapshot taken for sensor {sensor_id}: {reason:?}");
                queue.push(snap.clone());
                observers.emit_snapshot(&snap);
            }
            Err(e) => warn!("failed to serialize background snapshot for sensor {sensor_id}: {e}"),
        }
        worker.cells_changed_since_snapshot = 0;
        worker.last_snapshot_ns = Some(frame_ts_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NoopVerticalBandFilter, StaticPoseSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn point(channel: u16, azimuth_deg: f64, distance_m: f64) -> PolarPoint {
        PolarPoint {
            channel,
            azimuth_deg,
            distance_m,
            elevation_deg: 0.0,
            intensity: 100,
            ts_ns: 0,
        }
    }

    fn pipeline() -> PerceptionPipeline {
        PerceptionPipeline::new(Box::new(StaticPoseSource::identity()), Box::new(NoopVerticalBandFilter))
    }

    #[test]
    fn unregistered_sensor_yields_none() {
        let mut pipeline = pipeline();
        assert!(pipeline.process_frame(1, vec![], 0).is_none());
        assert!(pipeline.get_track_counts(1).is_none());
    }

    #[test]
    fn a_foreground_cluster_spawns_a_track_and_notifies_observers() {
        let seen_clusters = Arc::new(AtomicUsize::new(0));
        let seen_clusters2 = seen_clusters.clone();
        let observers = Observers::new().with_on_cluster(move |_| {
            seen_clusters2.fetch_add(1, Ordering::SeqCst);
        });
        let mut pipeline = pipeline().with_observers(observers);
        // One ring, one-degree azimuth bins: five adjacent bins (0..=4) learn a
        // 20m background, then the same five bins see a much closer return.
        // Only the three interior bins (1, 2, 3) have a tentatively-foreground
        // neighbour on *both* sides this frame, so only they clear
        // `neighbor_confirm_count` (default 2) and become confirmed foreground
        // — enough points for one cluster (`min_pts` default 3), spanning two
        // bins (~0.17m at this range) to clear `min_cluster_diameter_m` (0.1m).
        pipeline.register_sensor(1, SensorParams {
            rings: 1,
            azimuth_bins: 360,
            ring_elevations_deg: vec![0.0],
            ..SensorParams::default()
        });

        let warmup_points: Vec<PolarPoint> = (0..5).map(|i| point(0, i as f64, 20.0)).collect();
        for t in 0..10 {
            pipeline.process_frame(1, warmup_points.clone(), t * 100_000_000);
        }

        let cluster_points: Vec<PolarPoint> = (0..5).map(|i| point(0, i as f64, 5.0)).collect();
        let errors = pipeline
            .process_frame(1, cluster_points, 1_100_000_000)
            .unwrap();
        assert!(errors.is_empty());
        assert!(seen_clusters.load(Ordering::SeqCst) > 0);
        assert!(pipeline.get_track_counts(1).unwrap().total > 0);
    }

    #[test]
    fn manual_snapshot_request_invokes_observer() {
        let snapshot_seen = Arc::new(AtomicUsize::new(0));
        let snapshot_seen2 = snapshot_seen.clone();
        let observers = Observers::new().with_on_snapshot(move |_| {
            snapshot_seen2.fetch_add(1, Ordering::SeqCst);
        });
        let mut pipeline = pipeline().with_observers(observers);
        pipeline.register_sensor(2, SensorParams::default());
        pipeline.request_snapshot(2, 0).unwrap();
        assert_eq!(snapshot_seen.load(Ordering::SeqCst), 1);
    }
}

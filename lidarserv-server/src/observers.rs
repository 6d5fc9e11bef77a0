use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use lidarserv_common::clustering::WorldCluster;
use lidarserv_common::error::PipelineError;
use lidarserv_common::tracking::{TrackEvent, TrackObservation};
use log::warn;

use crate::snapshot::BgSnapshot;

type ClusterCallback = Box<dyn Fn(&WorldCluster) + Send + Sync>;
type TrackObsCallback = Box<dyn Fn(&TrackObservation) + Send + Sync>;
type TrackEventCallback = Box<dyn Fn(&TrackEvent) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&BgSnapshot) + Send + Sync>;

/// The optional, non-blocking emission callbacks downstream collaborators
/// (persistence, HTTP, fusion) attach to, replacing the "dynamic map of
/// interfaces" design note with a concrete struct of boxed closures.
///
/// A callback is expected to enqueue and return promptly; if one panics, the
/// emission is dropped and counted rather than aborting the frame
/// (`CallbackError`, spec 7).
#[derive(Default)]
pub struct Observers {
    on_cluster: Option<ClusterCallback>,
    on_track_obs: Option<TrackObsCallback>,
    on_track_event: Option<TrackEventCallback>,
    on_snapshot: Option<SnapshotCallback>,
    callback_errors: AtomicU64,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_cluster(mut self, f: impl Fn(&WorldCluster) + Send + Sync + 'static) -> Self {
        self.on_cluster = Some(Box::new(f));
        self
    }

    pub fn with_on_track_obs(mut self, f: impl Fn(&TrackObservation) + Send + Sync + 'static) -> Self {
        self.on_track_obs = Some(Box::new(f));
        self
    }

    pub fn with_on_track_event(mut self, f: impl Fn(&TrackEvent) + Send + Sync + 'static) -> Self {
        self.on_track_event = Some(Box::new(f));
        self
    }

    pub fn with_on_snapshot(mut self, f: impl Fn(&BgSnapshot) + Send + Sync + 'static) -> Self {
        self.on_snapshot = Some(Box::new(f));
        self
    }

    pub fn callback_error_count(&self) -> u64 {
        self.callback_errors.load(Ordering::Relaxed)
    }

    fn guarded(&self, label: &'static str, f: impl FnOnce()) -> Option<PipelineError> {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            let total = self.callback_errors.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("{label} callback panicked ({total} total); dropping this emission");
            Some(PipelineError::CallbackError {
                reason: format!("{label} callback panicked"),
            })
        } else {
            None
        }
    }

    pub(crate) fn emit_cluster(&self, cluster: &WorldCluster) -> Option<PipelineError> {
        let f = self.on_cluster.as_ref()?;
        self.guarded("on_cluster", || f(cluster))
    }

    pub(crate) fn emit_track_obs(&self, obs: &TrackObservation) -> Option<PipelineError> {
        let f = self.on_track_obs.as_ref()?;
        self.guarded("on_track_obs", || f(obs))
    }

    pub(crate) fn emit_track_event(&self, event: &TrackEvent) -> Option<PipelineError> {
        let f = self.on_track_event.as_ref()?;
        self.guarded("on_track_event", || f(event))
    }

    pub(crate) fn emit_snapshot(&self, snapshot: &BgSnapshot) -> Option<PipelineError> {
        let f = self.on_snapshot.as_ref()?;
        self.guarded("on_snapshot", || f(snapshot))
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("on_cluster", &self.on_cluster.is_some())
            .field("on_track_obs", &self.on_track_obs.is_some())
            .field("on_track_event", &self.on_track_event.is_some())
            .field("on_snapshot", &self.on_snapshot.is_some())
            .field("callback_errors", &self.callback_error_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn cluster(id: u32) -> WorldCluster {
        WorldCluster {
            cluster_id: id,
            sensor_id: 1,
            ts_ns: 0,
            centroid_x: 0.0,
            centroid_y: 0.0,
            centroid_z: 0.0,
            bbox_l: 1.0,
            bbox_w: 1.0,
            bbox_h: 1.0,
            heading_rad: None,
            points_count: 1,
            height_p95: 0.0,
            intensity_mean: 0,
        }
    }

    #[test]
    fn emits_to_registered_callback() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        let observers = Observers::new().with_on_cluster(move |_| seen2.store(true, Ordering::SeqCst));
        let err = observers.emit_cluster(&cluster(0));
        assert!(err.is_none());
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn missing_callback_is_a_no_op() {
        let observers = Observers::new();
        assert!(observers.emit_cluster(&cluster(0)).is_none());
        assert_eq!(observers.callback_error_count(), 0);
    }

    #[test]
    fn panicking_callback_is_counted_not_propagated() {
        let observers = Observers::new().with_on_cluster(|_| panic!("boom"));
        let err = observers.emit_cluster(&cluster(0));
        assert!(matches!(err, Some(PipelineError::CallbackError { .. })));
        assert_eq!(observers.callback_error_count(), 1);
    }
}
